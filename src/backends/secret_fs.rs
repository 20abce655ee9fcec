//! Local-file secret backend.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{BackendError, Result, SecretBackend};

pub const DIR_VAR: &str = "GROVE_SECRET_LOCAL_FILE_DIR";

/// Resolves secret lookup paths to files on disk.
///
/// A configured base directory prefixes relative lookup paths; absolute
/// paths are used verbatim. Trailing whitespace is trimmed so secrets saved
/// with a final newline round-trip cleanly.
#[derive(Default)]
pub struct FsSecretBackend {
    dir: Option<PathBuf>,
}

impl FsSecretBackend {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var(DIR_VAR).ok().map(PathBuf::from))
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let candidate = PathBuf::from(path);
        match (&self.dir, candidate.is_absolute()) {
            (Some(dir), false) => dir.join(candidate),
            _ => candidate,
        }
    }
}

#[async_trait]
impl SecretBackend for FsSecretBackend {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let resolved = self.resolve(path);
        let mut bytes = tokio::fs::read(&resolved)
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => BackendError::NotFound {
                    what: format!("secret `{path}`"),
                },
                _ => BackendError::Io(err),
            })?;
        while bytes.last().is_some_and(|b| b.is_ascii_whitespace()) {
            bytes.pop();
        }
        Ok(bytes)
    }
}
