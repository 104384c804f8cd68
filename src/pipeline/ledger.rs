//! Succeeded / failed ledgers
//!
//! Two plain-text files record the outcome of every key the pipeline has
//! finished with: `succeeded` holds one key per line, `failed` holds
//! `key<TAB>reason` lines. The reason string starts with a stable failure
//! kind label ("validation: ...", "transient: ..."), so both the pipeline
//! and an operator with a text editor can tell retryable failures from
//! permanent ones.

use crate::pipeline::write_atomic;
use crate::{FailureKind, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

const SUCCEEDED_FILE: &str = "succeeded";
const FAILED_FILE: &str = "failed";

/// Durable per-key outcome ledgers for a batch run
///
/// A key is in at most one ledger: recording a success removes any earlier
/// failure entry, and recording a failure for a previously succeeded key
/// leaves the success in place only until the new outcome is written.
/// Mutations are buffered in memory; `flush` persists both files atomically.
pub struct BatchProgress {
    state_dir: PathBuf,
    succeeded: BTreeSet<String>,
    failed: BTreeMap<String, String>,
}

impl BatchProgress {
    /// Loads the ledgers from `state_dir`, treating absent files as empty
    pub fn load(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)?;

        let mut succeeded = BTreeSet::new();
        if let Some(text) = read_optional(&state_dir.join(SUCCEEDED_FILE))? {
            for line in text.lines() {
                let key = line.trim();
                if !key.is_empty() {
                    succeeded.insert(key.to_string());
                }
            }
        }

        let mut failed = BTreeMap::new();
        if let Some(text) = read_optional(&state_dir.join(FAILED_FILE))? {
            for line in text.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match line.split_once('\t') {
                    Some((key, reason)) => {
                        failed.insert(key.to_string(), reason.to_string());
                    }
                    // A hand-edited line without a reason still counts
                    None => {
                        failed.insert(line.trim().to_string(), String::new());
                    }
                }
            }
        }

        Ok(Self {
            state_dir: state_dir.to_path_buf(),
            succeeded,
            failed,
        })
    }

    /// Records `key` as succeeded, clearing any earlier failure
    pub fn record_success(&mut self, key: &str) {
        self.failed.remove(key);
        self.succeeded.insert(key.to_string());
    }

    /// Records `key` as failed with the given reason, clearing any earlier
    /// success
    pub fn record_failure(&mut self, key: &str, reason: &str) {
        self.succeeded.remove(key);
        self.failed.insert(key.to_string(), reason.to_string());
    }

    pub fn is_succeeded(&self, key: &str) -> bool {
        self.succeeded.contains(key)
    }

    /// The recorded failure reason for `key`, if it failed
    pub fn failed_reason(&self, key: &str) -> Option<&str> {
        self.failed.get(key).map(String::as_str)
    }

    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Iterates the failed ledger in key order
    pub fn failed_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.failed.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Drops failure entries so their keys get re-attempted, returning how
    /// many were cleared
    ///
    /// With `validation_only`, only entries whose reason carries the
    /// validation label are cleared; otherwise every retryable entry is.
    /// Entries with an unrecognized reason prefix are never cleared
    /// automatically.
    pub fn clear_failed(&mut self, validation_only: bool) -> usize {
        let before = self.failed.len();
        self.failed.retain(|_, reason| {
            match FailureKind::from_reason(reason) {
                Some(kind) if validation_only => kind != FailureKind::Validation,
                Some(kind) => !kind.is_retryable(),
                None => true,
            }
        });
        before - self.failed.len()
    }

    /// Persists both ledgers atomically
    pub fn flush(&self) -> Result<()> {
        let mut succeeded_text = String::new();
        for key in &self.succeeded {
            succeeded_text.push_str(key);
            succeeded_text.push('\n');
        }
        write_atomic(&self.state_dir.join(SUCCEEDED_FILE), &succeeded_text)?;

        let mut failed_text = String::new();
        for (key, reason) in &self.failed {
            failed_text.push_str(key);
            failed_text.push('\t');
            failed_text.push_str(reason);
            failed_text.push('\n');
        }
        write_atomic(&self.state_dir.join(FAILED_FILE), &failed_text)?;

        Ok(())
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_state_dir_loads_empty_ledgers() {
        let dir = tempfile::tempdir().unwrap();
        let progress = BatchProgress::load(dir.path()).unwrap();
        assert_eq!(progress.succeeded_count(), 0);
        assert_eq!(progress.failed_count(), 0);
    }

    #[test]
    fn test_ledgers_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut progress = BatchProgress::load(dir.path()).unwrap();
            progress.record_success("item/1");
            progress.record_failure("item/2", "validation: no license determined");
            progress.flush().unwrap();
        }

        let progress = BatchProgress::load(dir.path()).unwrap();
        assert!(progress.is_succeeded("item/1"));
        assert_eq!(
            progress.failed_reason("item/2"),
            Some("validation: no license determined")
        );
    }

    #[test]
    fn test_success_clears_earlier_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut progress = BatchProgress::load(dir.path()).unwrap();

        progress.record_failure("item/1", "transient: status 503");
        progress.record_success("item/1");

        assert!(progress.is_succeeded("item/1"));
        assert_eq!(progress.failed_reason("item/1"), None);
    }

    #[test]
    fn test_failure_clears_earlier_success() {
        let dir = tempfile::tempdir().unwrap();
        let mut progress = BatchProgress::load(dir.path()).unwrap();

        progress.record_success("item/1");
        progress.record_failure("item/1", "parse: empty body");

        assert!(!progress.is_succeeded("item/1"));
        assert_eq!(progress.failed_reason("item/1"), Some("parse: empty body"));
    }

    #[test]
    fn test_clear_failed_retryable_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut progress = BatchProgress::load(dir.path()).unwrap();

        progress.record_failure("a", "validation: no creator");
        progress.record_failure("b", "transient: status 502");
        progress.record_failure("c", "parse: truncated page");
        progress.record_failure("d", "policy: robots disallow");

        let cleared = progress.clear_failed(false);
        assert_eq!(cleared, 2);
        assert!(progress.failed_reason("a").is_none());
        assert!(progress.failed_reason("b").is_none());
        assert!(progress.failed_reason("c").is_some());
        assert!(progress.failed_reason("d").is_some());
    }

    #[test]
    fn test_clear_failed_validation_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut progress = BatchProgress::load(dir.path()).unwrap();

        progress.record_failure("a", "validation: no creator");
        progress.record_failure("b", "transient: status 502");

        let cleared = progress.clear_failed(true);
        assert_eq!(cleared, 1);
        assert!(progress.failed_reason("a").is_none());
        assert!(progress.failed_reason("b").is_some());
    }

    #[test]
    fn test_unrecognized_reason_is_never_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let mut progress = BatchProgress::load(dir.path()).unwrap();

        progress.record_failure("a", "operator note, keep out of rotation");
        assert_eq!(progress.clear_failed(false), 0);
        assert!(progress.failed_reason("a").is_some());
    }

    #[test]
    fn test_hand_edited_failed_line_without_reason() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("failed"), "item/9\n").unwrap();

        let progress = BatchProgress::load(dir.path()).unwrap();
        assert_eq!(progress.failed_reason("item/9"), Some(""));
    }
}
