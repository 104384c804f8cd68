//! Resumable batch pipeline
//!
//! Two phases share the same machinery: the download phase turns an ordered,
//! possibly unbounded key space into cached metadata, and the upload phase
//! turns cached metadata into published artifacts. Both drive a
//! [`BatchCursor`] with a durable checkpoint, isolate per-item failures into
//! the ledgers, and honor an external stop signal between items, so a
//! multi-day job survives crashes and restarts without redoing completed work
//! or losing failure context.

mod cache;
mod cursor;
mod downloader;
mod ledger;
mod stop;
mod uploader;

pub use cache::{ItemCache, Metadata};
pub use cursor::BatchCursor;
pub use downloader::{BatchDownloader, ParseOutcome, Parser, RunOutcome};
pub use ledger::BatchProgress;
pub use stop::StopSignal;
pub use uploader::{
    ArtifactBuilder, BatchUploader, DuplicateTarget, Publisher, UploadAsset, UploadOutcome,
};

use crate::Result;
use std::path::Path;

/// Writes a state file atomically: temp file in the same directory, then
/// rename. Readers and a crashed writer never observe a half-written file.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
