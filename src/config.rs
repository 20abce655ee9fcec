//! Connector configuration documents and instance identity.
//!
//! A configuration document is an immutable description of one collection
//! instance: which connector body runs, which tenant it collects for, how it
//! authenticates, and how often it runs. Documents are value-like; the
//! scheduler replaces an instance wholesale when its document changes.

use std::fmt;

use md5::{Digest, Md5};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::processors::ProcessorSpec;

/// Default sort key for connectors that expose a single sub-API.
pub const DEFAULT_OPERATION: &str = "all";

/// Errors raised while loading or validating configuration documents.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to parse configuration document: {0}")]
    #[diagnostic(code(grove::config::parse))]
    Parse(#[from] serde_json::Error),

    #[error("configuration field `{field}` must not be empty")]
    #[diagnostic(
        code(grove::config::empty_field),
        help("Every document needs a non-empty `name`, `identity`, and `connector`.")
    )]
    EmptyField { field: &'static str },

    #[error("unknown connector: {name}")]
    #[diagnostic(
        code(grove::config::unknown_connector),
        help("Register the connector before loading documents that reference it.")
    )]
    UnknownConnector { name: String },

    #[error("duplicate instance: {instance}")]
    #[diagnostic(
        code(grove::config::duplicate_instance),
        help("The (connector, identity, operation) triple must be unique across documents.")
    )]
    DuplicateInstance { instance: InstanceId },
}

/// Output framing for emitted artifacts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    /// Gzip-compressed newline-delimited JSON (the default).
    #[default]
    GzipNdjson,
    /// Plain newline-delimited JSON.
    Ndjson,
}

impl Encoding {
    pub fn extension(self) -> &'static str {
        match self {
            Encoding::GzipNdjson => "json.gz",
            Encoding::Ndjson => "json",
        }
    }
}

/// One connector configuration document.
///
/// Required fields are `name`, `identity`, and `connector`. Credentials come
/// either inline via `key` or through the `secrets` mapping (logical field
/// name to backend lookup path); resolved secrets overwrite inline values.
/// Unknown fields are preserved in `extra` and forwarded to the connector
/// body unchanged, which is how per-connector parameters ride in.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConnectorConfig {
    /// Operator-chosen name, unique within the document set.
    pub name: String,
    /// Tenant or account handle; scopes pointers and provenance.
    pub identity: String,
    /// Name of the connector body that implements this instance.
    pub connector: String,
    /// Inline credential literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Logical field name to secret-backend lookup path.
    #[serde(default, skip_serializing_if = "FxHashMap::is_empty")]
    pub secrets: FxHashMap<String, String>,
    /// Sub-API selector when a connector serves several.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Seconds between runs in daemon mode; connector default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u64>,
    /// Output framing hint.
    #[serde(default)]
    pub encoding: Encoding,
    /// Excluded from scheduling when set.
    #[serde(default)]
    pub disabled: bool,
    /// Ordered processor chain applied to each batch before emit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processors: Vec<ProcessorSpec>,
    /// Per-connector parameters, forwarded untouched.
    #[serde(flatten)]
    pub extra: FxHashMap<String, Value>,
}

impl ConnectorConfig {
    /// Parse and validate a raw document.
    pub fn parse(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: ConnectorConfig = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyField { field: "name" });
        }
        if self.identity.trim().is_empty() {
            return Err(ConfigError::EmptyField { field: "identity" });
        }
        if self.connector.trim().is_empty() {
            return Err(ConfigError::EmptyField { field: "connector" });
        }
        Ok(())
    }

    /// The `operation` value, or the single-sub-API constant.
    pub fn operation(&self) -> &str {
        self.operation.as_deref().unwrap_or(DEFAULT_OPERATION)
    }

    /// The (connector, identity, operation) triple identifying this stream.
    pub fn instance_id(&self) -> InstanceId {
        InstanceId {
            connector: self.connector.clone(),
            identity: self.identity.clone(),
            operation: self.operation().to_string(),
        }
    }
}

/// Identity of one collection stream.
///
/// Two documents naming the same triple would collect the same upstream
/// window twice; the scheduler rejects the second at load time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct InstanceId {
    pub connector: String,
    pub identity: String,
    pub operation: String,
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.connector, self.identity, self.operation)
    }
}

/// Hash of a raw configuration document.
///
/// The refresh diff identifies replaced documents by this value; any byte
/// change counts as a change.
#[must_use]
pub fn document_hash(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
