//! The `_grove` provenance stamp.
//!
//! Every emitted record carries a reserved top-level `_grove` object naming
//! the connector, identity, and operation that produced it, the pointer the
//! batch certifies, the pointer as it stood at run start, and enough runtime
//! detail to reconstruct where and when collection happened. Stamping runs
//! after the processor chain so processors may restructure records without
//! worrying about the reserved field.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved top-level field name.
pub const FIELD: &str = "_grove";

/// Provenance attached to each record before emit.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Provenance {
    /// Connector body name.
    pub connector: String,
    /// Instance identity (tenant/account handle).
    pub identity: String,
    /// Sub-API selector.
    pub operation: String,
    /// Pointer certified by the batch this record belongs to.
    pub pointer: String,
    /// Pointer at run start; absent on a first run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_pointer: Option<String>,
    /// Run start, ISO-8601 UTC.
    pub collection_time: DateTime<Utc>,
    /// Free-form runtime identifiers supplied by the entrypoint.
    pub runtime: FxHashMap<String, String>,
    /// Software version that performed the collection.
    pub version: String,
}

/// Set the reserved field on a record.
///
/// Non-object records are wrapped as `{"value": <record>, "_grove": ...}` so
/// that provider APIs returning bare scalars still carry provenance.
pub fn stamp(record: &mut Value, provenance: &Provenance) -> Result<(), serde_json::Error> {
    let stamped = serde_json::to_value(provenance)?;
    match record {
        Value::Object(fields) => {
            fields.insert(FIELD.to_string(), stamped);
        }
        _ => {
            let taken = std::mem::take(record);
            let mut wrapped = Map::new();
            wrapped.insert("value".to_string(), taken);
            wrapped.insert(FIELD.to_string(), stamped);
            *record = Value::Object(wrapped);
        }
    }
    Ok(())
}
