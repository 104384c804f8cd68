//! Upload phase: cached metadata to published artifacts

use crate::pipeline::{BatchCursor, BatchProgress, ItemCache, Metadata, StopSignal};
use crate::transport::ResilientTransport;
use crate::{FailureKind, ItemFailure, RelayError, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use url::Url;

use super::downloader::RunOutcome;

/// An existing published page that matches an item's content fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateTarget {
    pub title: String,
}

/// A staged binary asset ready for submission
pub struct UploadAsset {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// How one item's upload resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Ledger said this key needs no work
    Skipped,
    /// The fingerprint matched this job's own prior upload
    AlreadyPublished,
    /// The fingerprint matched a foreign page; a cross-reference was
    /// recorded instead of re-uploading
    DuplicateLinked,
    /// Fresh publish succeeded
    Published,
    /// Recorded into the failed ledger; the run continues
    Failed,
}

/// The publishing service the uploader talks to
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Existing pages whose content matches the given fingerprint
    async fn find_duplicates(&self, fingerprint: &str) -> Result<Vec<DuplicateTarget>>;

    /// Publishes a new page with its asset
    async fn submit(&self, title: &str, body: &str, asset: UploadAsset) -> Result<()>;

    /// Records that `key` duplicates an existing page; returns false when
    /// the cross-reference could not be recorded
    async fn try_add_duplicate(
        &self,
        existing_title: &str,
        key: &str,
        metadata: &Metadata,
    ) -> Result<bool>;
}

/// Per-source artifact construction hooks
///
/// One implementation per data source; domain problems (no license
/// determined, missing creator, ...) come back as tagged [`ItemFailure`]
/// values rather than aborting the run.
#[async_trait]
pub trait ArtifactBuilder: Send {
    /// Where the item's binary asset lives
    fn asset_url(&self, key: &str, metadata: &Metadata)
        -> std::result::Result<Url, ItemFailure>;

    /// Upload file name and MIME type for the asset
    fn asset_details(
        &self,
        key: &str,
        metadata: &Metadata,
    ) -> std::result::Result<(String, String), ItemFailure>;

    /// The artifact page text
    fn build_page(
        &mut self,
        key: &str,
        metadata: &Metadata,
    ) -> std::result::Result<String, ItemFailure>;

    /// The artifact title
    fn build_title(
        &self,
        key: &str,
        metadata: &Metadata,
    ) -> std::result::Result<String, ItemFailure>;

    /// Whether an existing match is this job's own prior upload
    fn is_own_upload(&self, target: &DuplicateTarget) -> bool;

    /// Runs after a successful fresh publish (derivative uploads, ...)
    async fn post_upload(
        &mut self,
        _key: &str,
        _metadata: &Metadata,
    ) -> std::result::Result<(), ItemFailure> {
        Ok(())
    }
}

/// Sequential, resumable upload job
pub struct BatchUploader<'a> {
    transport: &'a ResilientTransport,
    cache: &'a ItemCache,
    progress: &'a mut BatchProgress,
    cursor: BatchCursor,
    stop: &'a StopSignal,
    builder: &'a mut dyn ArtifactBuilder,
    publisher: &'a dyn Publisher,
    checkpoint_interval: u32,
    force_refresh: bool,
}

impl<'a> BatchUploader<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: &'a ResilientTransport,
        cache: &'a ItemCache,
        progress: &'a mut BatchProgress,
        cursor: BatchCursor,
        stop: &'a StopSignal,
        builder: &'a mut dyn ArtifactBuilder,
        publisher: &'a dyn Publisher,
        checkpoint_interval: u32,
        force_refresh: bool,
    ) -> Self {
        Self {
            transport,
            cache,
            progress,
            cursor,
            stop,
            builder,
            publisher,
            checkpoint_interval: checkpoint_interval.max(1),
            force_refresh,
        }
    }

    /// Runs the job to completion, stop or fatal error, flushing ledgers on
    /// every exit path
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let outcome = self.drive().await;
        let flush = self.progress.flush();
        match (outcome, flush) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
        }
    }

    async fn drive(&mut self) -> Result<RunOutcome> {
        let mut since_checkpoint = 0u32;

        while let Some(key) = self.cursor.next_key() {
            if self.stop.requested() {
                tracing::info!("Stop requested, shutting down after current item");
                self.stop.acknowledge()?;
                return Ok(RunOutcome::Stopped);
            }

            let outcome = self.process_key(&key).await?;
            match outcome {
                UploadOutcome::Skipped => tracing::debug!("Skipping {}", key),
                UploadOutcome::AlreadyPublished => {
                    tracing::info!("Already published: {}", key)
                }
                UploadOutcome::DuplicateLinked => {
                    tracing::info!("Linked {} to existing page", key)
                }
                UploadOutcome::Published => tracing::info!("Published {}", key),
                UploadOutcome::Failed => {}
            }

            self.cursor.advance(&key)?;

            since_checkpoint += 1;
            if since_checkpoint >= self.checkpoint_interval {
                self.progress.flush()?;
                since_checkpoint = 0;
            }
        }

        Ok(RunOutcome::Finished)
    }

    /// Resolves one key; per-item problems become ledger entries, only
    /// infrastructure errors (state dir unwritable, ...) propagate
    async fn process_key(&mut self, key: &str) -> Result<UploadOutcome> {
        if self.progress.is_succeeded(key) && !self.force_refresh {
            return Ok(UploadOutcome::Skipped);
        }
        if let Some(reason) = self.progress.failed_reason(key) {
            let retryable = FailureKind::from_reason(reason)
                .map(FailureKind::is_retryable)
                .unwrap_or(false);
            if !retryable && !self.force_refresh {
                return Ok(UploadOutcome::Skipped);
            }
        }

        let metadata = match self.cache.get(key)? {
            Some(metadata) => metadata,
            None => {
                let failure = ItemFailure::validation("no cached metadata for key");
                self.progress.record_failure(key, &failure.reason());
                return Ok(UploadOutcome::Failed);
            }
        };

        match self.resolve(key, &metadata).await {
            Ok(outcome) => {
                self.progress.record_success(key);
                Ok(outcome)
            }
            Err(failure) if failure.kind == FailureKind::Fatal => {
                self.progress.record_failure(key, &failure.reason());
                Err(RelayError::Fatal(failure.reason()))
            }
            Err(failure) => {
                tracing::warn!("Upload failed for {}: {}", key, failure);
                self.progress.record_failure(key, &failure.reason());
                Ok(UploadOutcome::Failed)
            }
        }
    }

    async fn resolve(
        &mut self,
        key: &str,
        metadata: &Metadata,
    ) -> std::result::Result<UploadOutcome, ItemFailure> {
        let bytes = self.stage_asset(key, metadata).await?;
        let fingerprint = hex::encode(Sha256::digest(&bytes));

        let matches = self
            .publisher
            .find_duplicates(&fingerprint)
            .await
            .map_err(transport_failure)?;

        if matches.iter().any(|t| self.builder.is_own_upload(t)) {
            return Ok(UploadOutcome::AlreadyPublished);
        }

        if let Some(existing) = matches.first() {
            let linked = self
                .publisher
                .try_add_duplicate(&existing.title, key, metadata)
                .await
                .map_err(transport_failure)?;
            if linked {
                return Ok(UploadOutcome::DuplicateLinked);
            }
            return Err(ItemFailure::validation(format!(
                "duplicate of '{}' but cross-reference was not recorded",
                existing.title
            )));
        }

        let body = self.builder.build_page(key, metadata)?;
        let title = self.builder.build_title(key, metadata)?;
        let (file_name, content_type) = self.builder.asset_details(key, metadata)?;

        self.publisher
            .submit(
                &title,
                &body,
                UploadAsset {
                    file_name,
                    content_type,
                    bytes,
                },
            )
            .await
            .map_err(transport_failure)?;

        self.builder.post_upload(key, metadata).await?;

        Ok(UploadOutcome::Published)
    }

    /// Returns the item's asset bytes, fetching and staging them on first
    /// use so a restart does not re-download
    async fn stage_asset(
        &mut self,
        key: &str,
        metadata: &Metadata,
    ) -> std::result::Result<Vec<u8>, ItemFailure> {
        if let Some(bytes) = self.cache.get_asset(key).map_err(infra_failure)? {
            return Ok(bytes);
        }

        let url = self.builder.asset_url(key, metadata)?;
        let bytes = self
            .transport
            .fetch(&url)
            .await
            .map_err(transport_failure)?;
        self.cache.put_asset(key, &bytes).map_err(infra_failure)?;
        Ok(bytes)
    }
}

fn transport_failure(error: RelayError) -> ItemFailure {
    match error {
        RelayError::PolicyViolation { url } => ItemFailure::new(
            FailureKind::Policy,
            format!("robots policy forbids {}", url),
        ),
        other => ItemFailure::transient(other.to_string()),
    }
}

fn infra_failure(error: RelayError) -> ItemFailure {
    ItemFailure::fatal(error.to_string())
}
