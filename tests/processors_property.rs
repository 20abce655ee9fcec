//! Property tests for processor purity and ordering.

use grove::processors::{Processor, Split, Zip};
use proptest::prelude::*;
use serde_json::{Value, json};

fn split_record() -> impl Strategy<Value = Value> {
    (
        any::<u32>(),
        prop::option::of(prop::collection::vec(any::<i32>(), 0..5)),
    )
        .prop_map(|(id, items)| match items {
            Some(items) => json!({"id": id, "items": items}),
            None => json!({"id": id}),
        })
}

fn zip_record() -> impl Strategy<Value = Value> {
    prop::collection::vec(("[a-e]", any::<i32>()), 0..6).prop_map(|pairs| {
        let params: Vec<Value> = pairs
            .iter()
            .map(|(name, value)| json!({"name": name, "value": value}))
            .collect();
        json!({"params": params})
    })
}

proptest! {
    #[test]
    fn split_output_count_matches_expansion(
        batch in prop::collection::vec(split_record(), 0..8)
    ) {
        let split = Split::new("items");
        let out = split.apply(batch.clone()).unwrap();
        let expected: usize = batch
            .iter()
            .map(|record| match record.get("items") {
                Some(Value::Array(items)) => items.len(),
                _ => 1,
            })
            .sum();
        prop_assert_eq!(out.len(), expected);
    }

    #[test]
    fn split_preserves_record_order(
        batch in prop::collection::vec(split_record(), 0..8)
    ) {
        let split = Split::new("items");
        let out = split.apply(batch.clone()).unwrap();

        // Output ids are the input ids expanded in place.
        let expected: Vec<Value> = batch
            .iter()
            .flat_map(|record| {
                let repeats = match record.get("items") {
                    Some(Value::Array(items)) => items.len(),
                    _ => 1,
                };
                std::iter::repeat_n(record["id"].clone(), repeats)
            })
            .collect();
        let actual: Vec<Value> = out.iter().map(|record| record["id"].clone()).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn split_is_stable_once_expanded(
        batch in prop::collection::vec(split_record(), 0..8)
    ) {
        let split = Split::new("items");
        let once = split.apply(batch).unwrap();
        let twice = split.apply(once.clone()).unwrap();
        prop_assert_eq!(twice, once);
    }

    #[test]
    fn zip_is_deterministic_and_stable(
        batch in prop::collection::vec(zip_record(), 0..8)
    ) {
        let zip = Zip::new("params", "name", vec!["value".to_string()]);
        let first = zip.apply(batch.clone()).unwrap();
        let second = zip.apply(batch).unwrap();
        prop_assert_eq!(&first, &second);

        // Once zipped, the source is a mapping and passes through untouched.
        let third = zip.apply(first.clone()).unwrap();
        prop_assert_eq!(third, first);
    }

    #[test]
    fn zip_keys_come_from_the_key_field(
        batch in prop::collection::vec(zip_record(), 1..4)
    ) {
        let zip = Zip::new("params", "name", vec!["value".to_string()]);
        let out = zip.apply(batch.clone()).unwrap();
        for (record, zipped) in batch.iter().zip(&out) {
            let names: std::collections::HashSet<&str> = record["params"]
                .as_array()
                .unwrap()
                .iter()
                .map(|element| element["name"].as_str().unwrap())
                .collect();
            let keys: std::collections::HashSet<&str> = zipped["params"]
                .as_object()
                .unwrap()
                .keys()
                .map(String::as_str)
                .collect();
            prop_assert_eq!(keys, names);
        }
    }
}
