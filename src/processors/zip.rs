//! The built-in `zip` processor.

use serde_json::{Map, Value};

use crate::util::path::FieldPath;

use super::{Processor, ProcessorError, ProcessorSpec};

/// Collapse a sequence of key/value objects into a single mapping.
///
/// Given a `source` path resolving to a sequence of objects that each carry
/// a key field and one or more value fields (listed in priority order), the
/// sequence is replaced with a mapping from each element's key to its first
/// non-absent value field. A present-but-null value field counts as absent.
/// On duplicate keys the later entry wins. Records where the source path is
/// absent or not a sequence pass through unchanged; non-object elements are
/// dropped from the mapping.
///
/// This is the shape several audit APIs use for free-form event parameters,
/// e.g. `[{"name": "ip", "value": "192.0.2.1"}, ...]`.
pub struct Zip {
    source: FieldPath,
    key: String,
    values: Vec<String>,
}

impl Zip {
    pub fn new(source: &str, key: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            source: FieldPath::parse(source),
            key: key.into(),
            values,
        }
    }

    pub fn from_spec(spec: &ProcessorSpec) -> Result<Self, ProcessorError> {
        let paths = spec
            .param("zip_paths")
            .and_then(Value::as_object)
            .ok_or_else(|| ProcessorError::InvalidSpec {
                processor: "zip",
                reason: "`zip_paths` must be an object".to_string(),
            })?;
        let source = paths
            .get("source")
            .and_then(Value::as_str)
            .ok_or_else(|| ProcessorError::InvalidSpec {
                processor: "zip",
                reason: "`zip_paths.source` must be a string".to_string(),
            })?;
        let key = paths
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or("key");
        let values = match paths.get("values") {
            Some(Value::Array(values)) => values
                .iter()
                .map(|value| {
                    value
                        .as_str()
                        .map(str::to_string)
                        .ok_or_else(|| ProcessorError::InvalidSpec {
                            processor: "zip",
                            reason: "`zip_paths.values` entries must be strings".to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => vec!["value".to_string()],
            Some(_) => {
                return Err(ProcessorError::InvalidSpec {
                    processor: "zip",
                    reason: "`zip_paths.values` must be a list of strings".to_string(),
                });
            }
        };
        Ok(Self::new(source, key, values))
    }

    fn zip_elements(&self, elements: &[Value]) -> Map<String, Value> {
        let mut mapping = Map::new();
        for element in elements {
            let Some(object) = element.as_object() else {
                continue;
            };
            let Some(key) = object.get(&self.key) else {
                continue;
            };
            let key = match key {
                Value::String(key) => key.clone(),
                other => other.to_string(),
            };
            let value = self
                .values
                .iter()
                .find_map(|field| object.get(field).filter(|value| !value.is_null()))
                .cloned()
                .unwrap_or(Value::Null);
            mapping.insert(key, value);
        }
        mapping
    }
}

impl Processor for Zip {
    fn name(&self) -> &str {
        "zip"
    }

    fn apply(&self, batch: Vec<Value>) -> Result<Vec<Value>, ProcessorError> {
        let mut out = Vec::with_capacity(batch.len());
        for mut record in batch {
            let mapping = match self.source.resolve(&record) {
                Some(Value::Array(elements)) => self.zip_elements(elements),
                _ => {
                    out.push(record);
                    continue;
                }
            };
            self.source
                .replace(&mut record, Value::Object(mapping))
                .map_err(|err| ProcessorError::Apply {
                    processor: "zip".to_string(),
                    message: err.to_string(),
                })?;
            out.push(record);
        }
        Ok(out)
    }
}
