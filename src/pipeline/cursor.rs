//! Resumable key enumeration with a durable checkpoint

use crate::pipeline::write_atomic;
use crate::Result;
use std::path::PathBuf;

/// An ordered, resumable key enumerator
///
/// Wraps a lazy key sequence and a single-value checkpoint file holding the
/// last key fully processed. On resume, keys are skipped until the
/// checkpointed key itself has been consumed; everything after it is
/// produced in source order. Key sources are contractually deterministic
/// across restarts, which is what makes the equality scan sound.
///
/// `advance` persists the new checkpoint durably (temp file + rename)
/// *before* returning, so the checkpoint never points past a key whose
/// processing result was not recorded.
pub struct BatchCursor {
    keys: Box<dyn Iterator<Item = String> + Send>,
    checkpoint_path: PathBuf,
    checkpoint: Option<String>,
    skipping: bool,
}

impl BatchCursor {
    /// Creates a cursor over a key sequence, resuming from the checkpoint
    /// file if one exists
    pub fn new(
        keys: Box<dyn Iterator<Item = String> + Send>,
        checkpoint_path: PathBuf,
    ) -> Result<Self> {
        let checkpoint = match std::fs::read_to_string(&checkpoint_path) {
            Ok(contents) => {
                let value = contents.trim().to_string();
                if value.is_empty() {
                    None
                } else {
                    Some(value)
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let skipping = checkpoint.is_some();
        Ok(Self {
            keys,
            checkpoint_path,
            checkpoint,
            skipping,
        })
    }

    /// The last key fully processed, if any
    pub fn checkpoint(&self) -> Option<&str> {
        self.checkpoint.as_deref()
    }

    /// Produces the next key at or after the resume point
    pub fn next_key(&mut self) -> Option<String> {
        if self.skipping {
            let target = self.checkpoint.clone()?;
            // Consume keys up to and including the checkpointed one
            loop {
                match self.keys.next() {
                    Some(key) if key == target => {
                        self.skipping = false;
                        break;
                    }
                    Some(_) => continue,
                    None => {
                        // Checkpoint not found in the sequence; nothing left
                        // to produce. Deterministic sources only reach this
                        // when the job already ran to completion.
                        self.skipping = false;
                        return None;
                    }
                }
            }
        }

        self.keys.next()
    }

    /// Records `key` as fully processed, durably, before returning
    pub fn advance(&mut self, key: &str) -> Result<()> {
        write_atomic(&self.checkpoint_path, key)?;
        self.checkpoint = Some(key.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(values: &[&str]) -> Box<dyn Iterator<Item = String> + Send> {
        Box::new(
            values
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .into_iter(),
        )
    }

    #[test]
    fn test_fresh_cursor_yields_all_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut cursor = BatchCursor::new(keys(&["1", "2", "3"]), dir.path().join("ckpt")).unwrap();

        assert_eq!(cursor.checkpoint(), None);
        assert_eq!(cursor.next_key().as_deref(), Some("1"));
        assert_eq!(cursor.next_key().as_deref(), Some("2"));
        assert_eq!(cursor.next_key().as_deref(), Some("3"));
        assert_eq!(cursor.next_key(), None);
    }

    #[test]
    fn test_advance_persists_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt");
        let mut cursor = BatchCursor::new(keys(&["1", "2", "3"]), path.clone()).unwrap();

        cursor.next_key();
        cursor.advance("1").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1");
        assert_eq!(cursor.checkpoint(), Some("1"));
    }

    #[test]
    fn test_resume_skips_completed_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt");

        {
            let mut cursor = BatchCursor::new(keys(&["1", "2", "3"]), path.clone()).unwrap();
            cursor.next_key();
            cursor.advance("1").unwrap();
            cursor.next_key();
            cursor.advance("2").unwrap();
        }

        // Restart: only key 3 remains
        let mut cursor = BatchCursor::new(keys(&["1", "2", "3"]), path).unwrap();
        assert_eq!(cursor.checkpoint(), Some("2"));
        assert_eq!(cursor.next_key().as_deref(), Some("3"));
        assert_eq!(cursor.next_key(), None);
    }

    #[test]
    fn test_resume_after_last_key_is_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt");
        std::fs::write(&path, "3").unwrap();

        let mut cursor = BatchCursor::new(keys(&["1", "2", "3"]), path).unwrap();
        assert_eq!(cursor.next_key(), None);
    }

    #[test]
    fn test_checkpoint_absent_from_sequence_exhausts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt");
        std::fs::write(&path, "99").unwrap();

        let mut cursor = BatchCursor::new(keys(&["1", "2", "3"]), path).unwrap();
        assert_eq!(cursor.next_key(), None);
    }

    #[test]
    fn test_empty_checkpoint_file_is_fresh_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt");
        std::fs::write(&path, "\n").unwrap();

        let mut cursor = BatchCursor::new(keys(&["1", "2"]), path).unwrap();
        assert_eq!(cursor.next_key().as_deref(), Some("1"));
    }
}
