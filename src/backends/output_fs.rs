//! Local-directory output backend.

use std::path::PathBuf;

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use super::{OutputBackend, Result};

pub const DIR_VAR: &str = "GROVE_OUTPUT_LOCAL_FILE_DIR";
const DEFAULT_DIR: &str = "./output";

/// Writes each artifact to `<dir>/<key>`, creating parent directories.
///
/// The artifact key contains `/` separators by construction, so artifacts
/// land in a browsable connector/identity/operation/date tree. Metadata is
/// dropped; the filesystem has nowhere best-effort to put it.
pub struct FsOutputBackend {
    dir: PathBuf,
}

impl FsOutputBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_env() -> Self {
        let dir = std::env::var(DIR_VAR).unwrap_or_else(|_| DEFAULT_DIR.to_string());
        Self::new(dir)
    }
}

#[async_trait]
impl OutputBackend for FsOutputBackend {
    async fn write(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _metadata: &FxHashMap<String, String>,
    ) -> Result<()> {
        let path = self.dir.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }
}
