//! The built-in `split` processor.

use serde_json::Value;

use crate::util::path::FieldPath;

use super::{Processor, ProcessorError, ProcessorSpec};

/// Fan one record out into one record per element of a nested sequence.
///
/// Given a dotted `split_path` resolving to a sequence inside a record,
/// `split` produces one output record per element: all sibling fields are
/// cloned and the path's value is replaced with the single element. Records
/// where the path is absent or not a sequence pass through unchanged.
///
/// Ordering: original record order is preserved, and the elements of a split
/// record are emitted in sequence order, ahead of the next original record.
pub struct Split {
    path: FieldPath,
}

impl Split {
    pub fn new(path: &str) -> Self {
        Self {
            path: FieldPath::parse(path),
        }
    }

    pub fn from_spec(spec: &ProcessorSpec) -> Result<Self, ProcessorError> {
        let path = spec
            .param("split_path")
            .and_then(Value::as_str)
            .ok_or_else(|| ProcessorError::InvalidSpec {
                processor: "split",
                reason: "`split_path` must be a string".to_string(),
            })?;
        Ok(Self::new(path))
    }
}

impl Processor for Split {
    fn name(&self) -> &str {
        "split"
    }

    fn apply(&self, batch: Vec<Value>) -> Result<Vec<Value>, ProcessorError> {
        let mut out = Vec::with_capacity(batch.len());
        for record in batch {
            let elements = match self.path.resolve(&record) {
                Some(Value::Array(elements)) => elements.clone(),
                _ => {
                    out.push(record);
                    continue;
                }
            };
            for element in elements {
                let mut clone = record.clone();
                self.path.replace(&mut clone, element).map_err(|err| {
                    ProcessorError::Apply {
                        processor: "split".to_string(),
                        message: err.to_string(),
                    }
                })?;
                out.push(clone);
            }
        }
        Ok(out)
    }
}
