use grove::util::path::FieldPath;
use serde_json::json;

#[test]
fn parse_drops_empty_segments() {
    assert_eq!(FieldPath::parse("events..parameters"), FieldPath::parse("events.parameters"));
    assert_eq!(FieldPath::parse("events.parameters").to_string(), "events.parameters");
}

#[test]
fn resolve_walks_object_members_only() {
    let record = json!({
        "id": "00001",
        "events": {"parameters": [{"name": "ip", "value": "192.0.2.1"}]}
    });

    assert_eq!(
        FieldPath::parse("id").resolve(&record),
        Some(&json!("00001"))
    );
    assert!(
        FieldPath::parse("events.parameters")
            .resolve(&record)
            .unwrap()
            .is_array()
    );
    assert_eq!(FieldPath::parse("events.missing").resolve(&record), None);
    // Sequence elements are values, not containers a path can enter.
    assert_eq!(FieldPath::parse("events.parameters.0").resolve(&record), None);
    assert_eq!(
        FieldPath::parse("events.parameters.name").resolve(&record),
        None
    );
}

#[test]
fn empty_path_addresses_the_record_itself() {
    let record = json!({"id": 1});
    assert_eq!(FieldPath::parse("").resolve(&record), Some(&record));

    let mut record = record;
    FieldPath::parse("").replace(&mut record, json!(42)).unwrap();
    assert_eq!(record, json!(42));
}

#[test]
fn replace_swaps_existing_members_and_nothing_else() {
    let mut record = json!({"events": {"parameters": [1, 2]}});
    FieldPath::parse("events.parameters")
        .replace(&mut record, json!({"zipped": true}))
        .unwrap();
    assert_eq!(record, json!({"events": {"parameters": {"zipped": true}}}));

    // Replacement never invents members the record did not carry.
    let err = FieldPath::parse("events.other")
        .replace(&mut record, json!(1))
        .unwrap_err();
    assert_eq!(err.segment(), "other");
    let err = FieldPath::parse("missing.deep")
        .replace(&mut record, json!(1))
        .unwrap_err();
    assert_eq!(err.segment(), "missing");
    assert_eq!(record, json!({"events": {"parameters": {"zipped": true}}}));
}
