//! Cooperative stop signal
//!
//! A long batch run checks for a sentinel file between items. An operator
//! creates the file (`touch stop`) to request a graceful shutdown; the
//! pipeline finishes the item in flight, flushes its state, removes the
//! sentinel and exits. Removing the sentinel means a later restart is not
//! immediately stopped by a stale request.

use crate::Result;
use std::path::{Path, PathBuf};

/// Filesystem-based stop request
pub struct StopSignal {
    path: PathBuf,
}

impl StopSignal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Whether a stop has been requested
    pub fn requested(&self) -> bool {
        self.path.exists()
    }

    /// Consumes the stop request by removing the sentinel file
    pub fn acknowledge(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_requested_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let signal = StopSignal::new(dir.path().join("stop"));
        assert!(!signal.requested());
    }

    #[test]
    fn test_requested_and_acknowledged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stop");
        std::fs::write(&path, "").unwrap();

        let signal = StopSignal::new(path.clone());
        assert!(signal.requested());

        signal.acknowledge().unwrap();
        assert!(!signal.requested());
        assert!(!path.exists());
    }

    #[test]
    fn test_acknowledge_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let signal = StopSignal::new(dir.path().join("stop"));
        signal.acknowledge().unwrap();
    }
}
