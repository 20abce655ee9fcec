//! Stdout output backend, the default output handler.

use std::io::Write;

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use super::{OutputBackend, Result};

/// Writes artifacts to standard output.
///
/// Plain NDJSON payloads are printed as-is under a key header; compressed
/// payloads are summarised so a terminal never receives raw gzip bytes.
/// Useful for smoke-testing a new connector before wiring real storage.
#[derive(Default)]
pub struct StdOutOutputBackend;

impl StdOutOutputBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OutputBackend for StdOutOutputBackend {
    async fn write(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _metadata: &FxHashMap<String, String>,
    ) -> Result<()> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        if key.ends_with(".gz") {
            writeln!(handle, "--- {key} ({} compressed bytes)", bytes.len())?;
        } else {
            writeln!(handle, "--- {key}")?;
            handle.write_all(&bytes)?;
        }
        handle.flush()?;
        Ok(())
    }
}
