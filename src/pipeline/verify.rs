use crate::error::{IsRetryable, NntpError, Result};
use crate::ledger::{JobState, Phase, SegmentKey, SegmentOutcome, SegmentRow};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use super::{Pipeline, PhaseReport, SegmentResult, Tally, release_after};

impl Pipeline {
    /// Confirm every `posted` segment is retrievable by its message-id
    ///
    /// A segment the server reports missing becomes `failed` and is not
    /// reposted. Transport failures leave it `posted` for a later run.
    pub async fn verify(&self, job_name: &str) -> Result<PhaseReport> {
        let job = self.job(job_name).await?;
        self.ledger.set_job_state(job.id, JobState::Verifying).await?;

        let workers = self.workers();
        let mut tally = Tally::default();
        let mut cursor: Option<SegmentKey> = None;
        while !self.cancel.is_cancelled() {
            let batch = self
                .ledger
                .next_pending_after(job.id, Phase::Verify, cursor, self.config.batch_size)
                .await?;
            let Some(last) = batch.last() else {
                break;
            };
            cursor = Some(last.key);

            let results: Vec<Result<SegmentResult>> = stream::iter(batch)
                .map(|row| self.verify_segment(row))
                .buffer_unordered(workers)
                .collect()
                .await;

            for result in results {
                tally.add(result?);
            }
        }

        let stats = self.ledger.stats(job.id).await?;
        if stats.unfinished() == 0 && stats.posted == 0 {
            let state = if stats.failed == 0 {
                JobState::Verified
            } else {
                JobState::Failed
            };
            self.ledger.set_job_state(job.id, state).await?;
        }

        let report = PhaseReport::new(Phase::Verify, tally, stats.posted, stats);
        info!("Verify '{}': {}", job.name, report);
        Ok(report)
    }

    async fn verify_segment(&self, row: SegmentRow) -> Result<SegmentResult> {
        if self.cancel.is_cancelled() {
            return Ok(SegmentResult::Skipped);
        }
        let Some(message_id) = row.message_id.as_deref() else {
            error!("Segment {} was posted without a message-id", row.key);
            self.ledger
                .mark_complete(row.key, Phase::Verify, SegmentOutcome::Failed("no message-id".to_string()))
                .await?;
            return Ok(SegmentResult::Failed);
        };

        let mut session = match self.pool.acquire_default().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Segment {}: no connection available: {}", row.key, e);
                self.ledger.record_attempt(row.key, &e.to_string()).await?;
                return Ok(SegmentResult::Deferred);
            }
        };

        let result = session.fetch_header(message_id).await;
        match result {
            Ok(_) => {
                release_after(&self.pool, session, None);
                self.ledger
                    .mark_complete(row.key, Phase::Verify, SegmentOutcome::done())
                    .await?;
                debug!("Verified {}", message_id);
                Ok(SegmentResult::Completed)
            }
            Err(NntpError::NoSuchArticle(_)) => {
                release_after(&self.pool, session, None);
                error!("Segment {}: {} missing on server", row.key, message_id);
                self.ledger
                    .mark_complete(
                        row.key,
                        Phase::Verify,
                        SegmentOutcome::Failed(format!("{message_id} not found")),
                    )
                    .await?;
                Ok(SegmentResult::Failed)
            }
            Err(e) => {
                warn!("Segment {}: verify failed on {}: {}", row.key, session.provider_name(), e);
                release_after(&self.pool, session, Some(&e));
                let reason = if e.is_retryable() { e.into_transient() } else { e };
                self.ledger.record_attempt(row.key, &reason.to_string()).await?;
                Ok(SegmentResult::Deferred)
            }
        }
    }
}
