//! Download phase: keys to cached metadata

use crate::pipeline::{BatchCursor, BatchProgress, ItemCache, Metadata, StopSignal};
use crate::transport::ResilientTransport;
use crate::{ItemFailure, RelayError, Result};
use url::Url;

/// What a parser made of one fetched item
pub enum ParseOutcome {
    /// The item's metadata fields
    Item(Metadata),
    /// The parser recognized content it has already ingested (e.g. in a
    /// reverse-chronological feed); the job is complete, not exhausted
    Finished,
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Key source exhausted, or the parser declared the job complete
    Finished,
    /// External stop signal honored; restart to continue
    Stopped,
}

/// Per-source content parser
///
/// Implemented as a plain struct per data source; the pipeline itself stays
/// generic. A parser may carry mutable aggregate state across items (e.g. an
/// accumulated index) and persist it in `save_out`.
pub trait Parser: Send {
    /// Turns raw fetched bytes into metadata, declares the job finished, or
    /// fails this item
    fn parse(&mut self, key: &str, raw: &[u8]) -> std::result::Result<ParseOutcome, ItemFailure>;

    /// Persists auxiliary aggregate state; called at checkpoint cadence and
    /// at the end of a run
    fn save_out(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sequential, resumable download job
///
/// Drives keys from a cursor through the transport and the parser into the
/// item cache. Per-item failures land in the ledgers and the run continues;
/// only fatal failures abort, and every exit path flushes durable state
/// first.
pub struct BatchDownloader<'a> {
    transport: &'a ResilientTransport,
    cache: &'a ItemCache,
    progress: &'a mut BatchProgress,
    cursor: BatchCursor,
    stop: &'a StopSignal,
    parser: &'a mut dyn Parser,
    url_for: Box<dyn Fn(&str) -> Result<Url> + Send + 'a>,
    checkpoint_interval: u32,
    force_refresh: bool,
}

impl<'a> BatchDownloader<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transport: &'a ResilientTransport,
        cache: &'a ItemCache,
        progress: &'a mut BatchProgress,
        cursor: BatchCursor,
        stop: &'a StopSignal,
        parser: &'a mut dyn Parser,
        url_for: Box<dyn Fn(&str) -> Result<Url> + Send + 'a>,
        checkpoint_interval: u32,
        force_refresh: bool,
    ) -> Self {
        Self {
            transport,
            cache,
            progress,
            cursor,
            stop,
            parser,
            url_for,
            checkpoint_interval: checkpoint_interval.max(1),
            force_refresh,
        }
    }

    /// Runs the job to completion, stop or fatal error
    ///
    /// Ledgers and auxiliary parser state are flushed on every exit path,
    /// including the error one.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let outcome = self.drive().await;
        let flush = self.progress.flush().and_then(|_| self.parser.save_out());
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

            if self.cache.has(&key) && !self.force_refresh {
                tracing::debug!("Already cached, skipping: {}", key);
                self.progress.record_success(&key);
                self.cursor.advance(&key)?;
                continue;
            }

            let url = (self.url_for)(&key)?;
            let raw = match self.transport.fetch(&url).await {
                Ok(raw) => raw,
                Err(e) => {
                    let failure = fetch_failure(&e);
                    tracing::warn!("Fetch failed for {}: {}", key, failure);
                    self.progress.record_failure(&key, &failure.reason());
                    self.cursor.advance(&key)?;
                    continue;
                }
            };

            match self.parser.parse(&key, &raw) {
                Ok(ParseOutcome::Item(metadata)) => {
                    self.cache.put(&key, &metadata)?;
                    self.progress.record_success(&key);
                    tracing::info!("Cached {} ({} fields)", key, metadata.len());
                }
                Ok(ParseOutcome::Finished) => {
                    tracing::info!("Parser declared the job complete at {}", key);
                    self.cursor.advance(&key)?;
                    return Ok(RunOutcome::Finished);
                }
                Err(failure) if failure.kind == crate::FailureKind::Fatal => {
                    self.progress.record_failure(&key, &failure.reason());
                    return Err(RelayError::Fatal(failure.reason()));
                }
                Err(failure) => {
                    tracing::warn!("Parse failed for {}: {}", key, failure);
                    self.progress.record_failure(&key, &failure.reason());
                }
            }

            self.cursor.advance(&key)?;

            since_checkpoint += 1;
            if since_checkpoint >= self.checkpoint_interval {
                self.progress.flush()?;
                self.parser.save_out()?;
                since_checkpoint = 0;
            }
        }

        Ok(RunOutcome::Finished)
    }
}

/// Classifies a transport error into a per-item ledger entry
fn fetch_failure(error: &RelayError) -> ItemFailure {
    match error {
        RelayError::PolicyViolation { url } => ItemFailure::new(
            crate::FailureKind::Policy,
            format!("robots policy forbids {}", url),
        ),
        other => ItemFailure::transient(other.to_string()),
    }
}
