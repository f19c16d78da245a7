//! Job scheduler: stage, upload, verify, cleanup and download
//!
//! A [`Pipeline`] owns the provider pool and the ledger and drives a job
//! through `staged -> uploading -> uploaded -> verifying -> verified`.
//! Every phase reads its work from the ledger, so a phase interrupted by
//! a crash or a cancellation picks up where it stopped when run again.
//!
//! Work fans out over a bounded number of concurrent workers (the sum of
//! provider caps unless overridden). Each worker handles one segment at
//! a time and commits its result to the ledger before taking the next.

mod cleanup;
mod download;
mod manifest;
mod report;
mod stage;
mod upload;
mod verify;

use crate::config::PipelineConfig;
use crate::error::{NntpError, Result};
use crate::ledger::{JobRecord, Ledger, SegmentKey};
use crate::pool::{PooledSession, ProviderPool};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use crate::ledger::JobState;
pub use download::DownloadedFile;
pub use report::{DownloadReport, FailedDownload, PhaseReport};

/// Drives jobs through their phases against one pool and one ledger
#[derive(Clone)]
pub struct Pipeline {
    pool: ProviderPool,
    ledger: Ledger,
    config: PipelineConfig,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Create a pipeline
    ///
    /// # Errors
    ///
    /// Returns [`NntpError::Config`] if the pipeline settings are invalid.
    pub fn new(pool: ProviderPool, ledger: Ledger, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pool,
            ledger,
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that aborts the running phase
    ///
    /// Cancelling stops new segments from being dispatched. Segments
    /// already in flight finish or time out and their results are
    /// committed.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Abort the running phase; see [`cancellation_token`](Self::cancellation_token)
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn pool(&self) -> &ProviderPool {
        &self.pool
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Concurrent workers per phase
    pub fn workers(&self) -> usize {
        self.config
            .workers
            .unwrap_or_else(|| self.pool.total_capacity())
            .max(1)
    }

    /// Stage, upload and verify a job in one go
    ///
    /// Verify only runs once upload has posted every segment.
    pub async fn run_all(
        &self,
        job_name: &str,
        source: &Path,
        groups: &[String],
    ) -> Result<Vec<PhaseReport>> {
        let mut reports = vec![self.stage(job_name, source, groups).await?];

        let upload = self.upload(job_name).await?;
        let uploaded = upload.stats.unfinished() == 0 && upload.stats.failed == 0;
        reports.push(upload);

        if uploaded && !self.cancel.is_cancelled() {
            reports.push(self.verify(job_name).await?);
        } else {
            info!("Job '{}' not fully uploaded; skipping verify", job_name);
        }
        Ok(reports)
    }

    async fn job(&self, name: &str) -> Result<JobRecord> {
        self.ledger
            .find_job_by_name(name)
            .await?
            .ok_or_else(|| NntpError::Other(format!("unknown job '{name}'")))
    }

    /// Staging directory of a job
    fn stage_dir(&self, job_name: &str) -> PathBuf {
        self.config.stage_root.join(job_name)
    }
}

/// Where the staged body of one segment lives
pub(crate) fn staged_body_path(stage_dir: &Path, file_name: &str, part: u32) -> PathBuf {
    stage_dir.join(format!("{file_name}.{part}.yenc"))
}

/// What a worker did with one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SegmentResult {
    /// Moved to the phase's target state
    Completed,
    /// Moved to `failed`
    Failed,
    /// Left eligible for a later pass
    Deferred,
    /// Not touched because the phase was cancelled
    Skipped,
}

/// Tally of worker results for one pass
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Tally {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub deferred: u64,
}

impl Tally {
    pub(crate) fn add(&mut self, result: SegmentResult) {
        match result {
            SegmentResult::Completed => self.succeeded += 1,
            SegmentResult::Failed => self.failed += 1,
            SegmentResult::Deferred => self.deferred += 1,
            SegmentResult::Skipped => return,
        }
        self.processed += 1;
    }
}

/// Return a session after an operation, closing it when the error says
/// the transport is no longer trustworthy
pub(crate) fn release_after(pool: &ProviderPool, session: PooledSession, error: Option<&NntpError>) {
    let healthy = error.is_none_or(|e| !e.is_provider_fault());
    pool.release(session, healthy);
}

/// Read `length` source bytes at `offset` into `buffer`, replacing its contents
pub(crate) async fn read_range(
    source: &mut tokio::fs::File,
    offset: u64,
    length: u64,
    buffer: &mut Vec<u8>,
) -> Result<()> {
    buffer.resize(length as usize, 0);
    source.seek(SeekFrom::Start(offset)).await?;
    source.read_exact(buffer).await?;
    Ok(())
}

/// Short key used in log lines
pub(crate) fn describe(file: &str, key: SegmentKey) -> String {
    format!("{file} part {}", key.part)
}
