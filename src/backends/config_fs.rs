//! Local-directory config backend, the default config handler.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{ConfigBackend, Result};

pub const DIR_VAR: &str = "GROVE_CONFIG_LOCAL_FILE_DIR";
const DEFAULT_DIR: &str = "./config";

/// Reads one JSON configuration document per `*.json` file in a directory.
///
/// The document identifier is the file name, so repeated listings return the
/// same set modulo genuine file changes. Listing is sorted for stability.
pub struct FsConfigBackend {
    dir: PathBuf,
}

impl FsConfigBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_env() -> Self {
        let dir = std::env::var(DIR_VAR).unwrap_or_else(|_| DEFAULT_DIR.to_string());
        Self::new(dir)
    }
}

#[async_trait]
impl ConfigBackend for FsConfigBackend {
    async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                ids.push(name.to_string());
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.dir.join(id)).await?)
    }
}
