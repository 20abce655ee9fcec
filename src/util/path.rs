//! Dotted field paths into provider-shaped records.
//!
//! Processor specs and pointer derivation name fields inside records with
//! dotted paths ("events.parameters"). A [`FieldPath`] is parsed once, when
//! the processor or run context is built, and walked per record. Segments
//! address object members only: a sequence is always a value at the end of
//! a path, never a container the path reaches into, and replacement never
//! invents structure a record did not already carry.

use std::fmt;

use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

/// A replacement failed because the path does not lead to an existing
/// object member of the record.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
#[error("path `{path}` has no member at `{segment}`")]
#[diagnostic(code(grove::path::unreachable))]
pub struct PathError {
    path: String,
    segment: String,
}

impl PathError {
    fn stopped_at(path: &FieldPath, segment: &str) -> Self {
        Self {
            path: path.to_string(),
            segment: segment.to_string(),
        }
    }

    /// The segment where traversal stopped.
    pub fn segment(&self) -> &str {
        &self.segment
    }
}

/// A dotted record path, parsed once and walked per record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dotted path. Empty segments are dropped, so `"a..b"` walks
    /// the same members as `"a.b"`; a path with no segments addresses the
    /// record itself.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self {
            segments: raw
                .split('.')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Follow the path through nested objects.
    ///
    /// `None` when a segment is missing or the walk lands in anything that
    /// is not an object. Sequence elements are deliberately unreachable;
    /// the processors that use paths treat sequences as whole values.
    ///
    /// ```rust
    /// use grove::util::path::FieldPath;
    /// use serde_json::json;
    ///
    /// let record = json!({"events": {"parameters": [{"name": "ip"}]}});
    /// let path = FieldPath::parse("events.parameters");
    /// assert!(path.resolve(&record).unwrap().is_array());
    /// assert_eq!(FieldPath::parse("events.missing").resolve(&record), None);
    /// assert_eq!(FieldPath::parse("events.parameters.0").resolve(&record), None);
    /// ```
    #[must_use]
    pub fn resolve<'v>(&self, record: &'v Value) -> Option<&'v Value> {
        self.segments
            .iter()
            .try_fold(record, |node, segment| node.as_object()?.get(segment))
    }

    /// Swap the value at this path for a new one.
    ///
    /// The member must already exist. Callers only rewrite fields they just
    /// resolved on the same record, so an unreachable path is a logic error
    /// and the failure names the offending segment.
    pub fn replace(&self, record: &mut Value, value: Value) -> Result<(), PathError> {
        let Some((leaf, parents)) = self.segments.split_last() else {
            *record = value;
            return Ok(());
        };

        let mut node = record;
        for segment in parents {
            node = node
                .as_object_mut()
                .and_then(|fields| fields.get_mut(segment))
                .ok_or_else(|| PathError::stopped_at(self, segment))?;
        }
        match node.as_object_mut().and_then(|fields| fields.get_mut(leaf)) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(PathError::stopped_at(self, leaf)),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}
