use crate::error::NntpError;
use crate::ledger::{LedgerStats, Phase};
use std::fmt;

use super::{DownloadedFile, Tally};

/// Outcome of one phase run over a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    /// Rows a worker handled during this run
    pub processed: u64,
    /// Rows moved to the phase's target state
    pub succeeded: u64,
    /// Rows moved to `failed` during this run
    pub failed: u64,
    /// Rows left eligible after a transient failure
    pub deferred: u64,
    /// Rows still waiting for this phase; a re-run picks them up
    pub pending: u64,
    /// Ledger counts once the run ended
    pub stats: LedgerStats,
}

impl PhaseReport {
    pub(crate) fn new(phase: Phase, tally: Tally, pending: u64, stats: LedgerStats) -> Self {
        Self {
            phase,
            processed: tally.processed,
            succeeded: tally.succeeded,
            failed: tally.failed,
            deferred: tally.deferred,
            pending,
            stats,
        }
    }

    /// Process exit code: 1 when any segment of the job is `failed`
    ///
    /// Segments that are merely still pending do not make a run fail.
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 || self.stats.failed > 0 { 1 } else { 0 }
    }
}

impl fmt::Display for PhaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} processed, {} succeeded, {} failed, {} deferred this run; {} pending, {} failed in total",
            self.phase,
            self.processed,
            self.succeeded,
            self.failed,
            self.deferred,
            self.pending,
            self.stats.failed
        )
    }
}

/// A manifest file that could not be downloaded
#[derive(Debug)]
pub struct FailedDownload {
    pub name: String,
    pub error: NntpError,
}

/// Outcome of [`Pipeline::download`](super::Pipeline::download)
#[derive(Debug, Default)]
pub struct DownloadReport {
    pub completed: Vec<DownloadedFile>,
    pub failed: Vec<FailedDownload>,
}

impl DownloadReport {
    /// 1 when any file failed, else 0
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.failed.is_empty())
    }
}

impl fmt::Display for DownloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes: u64 = self.completed.iter().map(|d| d.size).sum();
        write!(
            f,
            "{} files written ({} bytes), {} failed",
            self.completed.len(),
            bytes,
            self.failed.len()
        )
    }
}
