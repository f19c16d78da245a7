use crate::article::{Article, generate_message_id};
use crate::error::{IsRetryable, NntpError, Result};
use crate::ledger::{FileRecord, JobRecord, JobState, Phase, SegmentKey, SegmentOutcome, SegmentRow};
use crate::pool::PooledSession;
use crate::yenc::{EncodedPart, PartSpec, decode_verified, encode_part};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use super::{
    Pipeline, PhaseReport, SegmentResult, Tally, describe, read_range, release_after, staged_body_path,
};

impl Pipeline {
    /// Post every `encoded` segment of a job
    ///
    /// One pass visits each eligible row once. Transient failures leave a
    /// row `encoded` for the next run; rejected posts mark it `failed`.
    /// Once no `pending` or `encoded` row remains the manifest is written
    /// and the job becomes `uploaded` (or `failed` when some rows failed).
    pub async fn upload(&self, job_name: &str) -> Result<PhaseReport> {
        let job = self.job(job_name).await?;
        let settled = matches!(
            job.state,
            JobState::Uploaded | JobState::Verifying | JobState::Verified
        );
        if !settled {
            self.ledger.set_job_state(job.id, JobState::Uploading).await?;
        }

        let files: HashMap<i64, FileRecord> = self
            .ledger
            .files(job.id)
            .await?
            .into_iter()
            .map(|f| (f.id, f))
            .collect();

        let workers = self.workers();
        info!("Uploading '{}' with {} workers", job.name, workers);

        let mut tally = Tally::default();
        let mut cursor: Option<SegmentKey> = None;
        while !self.cancel.is_cancelled() {
            let batch = self
                .ledger
                .next_pending_after(job.id, Phase::Upload, cursor, self.config.batch_size)
                .await?;
            let Some(last) = batch.last() else {
                break;
            };
            cursor = Some(last.key);

            let results: Vec<Result<SegmentResult>> = stream::iter(batch)
                .map(|row| {
                    let file = files.get(&row.key.file_id);
                    let job = &job;
                    async move {
                        match file {
                            Some(file) => self.upload_segment(job, file, row).await,
                            None => Err(NntpError::Other(format!("segment {} has no file record", row.key))),
                        }
                    }
                })
                .buffer_unordered(workers)
                .collect()
                .await;

            for result in results {
                tally.add(result?);
            }
        }

        if self.cancel.is_cancelled() {
            warn!("Upload of '{}' cancelled; remaining segments stay queued", job.name);
        }

        // Barrier: the manifest only reflects a job with no outstanding rows
        let stats = self.ledger.stats(job.id).await?;
        if stats.unfinished() == 0 && !(settled && tally.processed == 0) {
            if stats.failed == 0 {
                self.write_manifest(&job).await?;
                self.ledger.set_job_state(job.id, JobState::Uploaded).await?;
            } else {
                error!(
                    "Job '{}': {} segments failed; manifest withheld",
                    job.name, stats.failed
                );
                self.ledger.set_job_state(job.id, JobState::Failed).await?;
            }
        }

        let report = PhaseReport::new(Phase::Upload, tally, stats.unfinished(), stats);
        info!("Upload '{}': {}", job.name, report);
        Ok(report)
    }

    async fn upload_segment(&self, job: &JobRecord, file: &FileRecord, row: SegmentRow) -> Result<SegmentResult> {
        if self.cancel.is_cancelled() {
            return Ok(SegmentResult::Skipped);
        }
        let label = describe(&file.meta.name, row.key);

        // Never transmit bytes that disagree with the ledger
        let encoded = match self.load_encoded(job, file, &row).await {
            Ok(encoded) => encoded,
            Err(e @ (NntpError::ChecksumMismatch { .. } | NntpError::Codec(_) | NntpError::Io(_))) => {
                error!("{}: staged body rejected: {}", label, e);
                self.ledger
                    .mark_complete(row.key, Phase::Upload, SegmentOutcome::Failed(e.to_string()))
                    .await?;
                return Ok(SegmentResult::Failed);
            }
            Err(e) => return Err(e),
        };

        let mut message_id = match row.message_id.clone() {
            Some(id) => id,
            None => {
                let id = generate_message_id(&self.config.message_id_domain);
                self.ledger.reassign_message_id(row.key, &id).await?;
                id
            }
        };

        let mut tried: Vec<usize> = Vec::new();
        let mut last_error = None;
        for attempt in 1..=self.config.max_attempts {
            if attempt > 1 && self.cancel.is_cancelled() {
                break;
            }
            // Prefer a provider this segment has not failed on yet
            if tried.len() >= self.pool.provider_count() {
                tried.clear();
            }
            let mut session = match self.pool.acquire_excluding(self.pool.acquire_timeout(), &tried).await {
                Ok(session) => session,
                Err(e) => {
                    warn!("{}: no connection available: {}", label, e);
                    last_error = Some(e);
                    break;
                }
            };
            tried.push(session.provider_index());

            match self
                .post_segment(&mut session, job, file, &row, &encoded, &mut message_id)
                .await
            {
                Ok(assigned) => {
                    release_after(&self.pool, session, None);
                    self.ledger
                        .mark_complete(
                            row.key,
                            Phase::Upload,
                            SegmentOutcome::Completed {
                                crc32: None,
                                message_id: Some(assigned.clone()),
                            },
                        )
                        .await?;
                    debug!("{}: posted as {}", label, assigned);
                    return Ok(SegmentResult::Completed);
                }
                Err(e @ NntpError::Ledger(_)) => {
                    release_after(&self.pool, session, None);
                    return Err(e);
                }
                Err(e) if refused_by_provider(&e) => {
                    warn!(
                        "{}: {} cannot take this post: {}",
                        label,
                        session.provider_name(),
                        e
                    );
                    self.pool.release(session, false);
                    last_error = Some(e);
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        "{}: attempt {} on {} failed: {}",
                        label,
                        attempt,
                        session.provider_name(),
                        e
                    );
                    release_after(&self.pool, session, Some(&e));
                    last_error = Some(e.into_transient());
                }
                Err(e) => {
                    release_after(&self.pool, session, Some(&e));
                    error!("{}: {}", label, e);
                    self.ledger
                        .mark_complete(row.key, Phase::Upload, SegmentOutcome::Failed(e.to_string()))
                        .await?;
                    return Ok(SegmentResult::Failed);
                }
            }
        }

        let reason = last_error.map_or_else(|| "cancelled".to_string(), |e| e.to_string());
        self.ledger.record_attempt(row.key, &reason).await?;
        Ok(SegmentResult::Deferred)
    }

    async fn post_segment(
        &self,
        session: &mut PooledSession,
        job: &JobRecord,
        file: &FileRecord,
        row: &SegmentRow,
        encoded: &EncodedPart,
        message_id: &mut String,
    ) -> Result<String> {
        if session.provider_config().join_group
            && let Some(group) = row.groups.first()
        {
            session.join_group(group).await?;
        }

        if session.stat(message_id).await? {
            let fresh = generate_message_id(&self.config.message_id_domain);
            warn!(
                "{} already exists on {}; reposting as {}",
                message_id,
                session.provider_name(),
                fresh
            );
            self.ledger.reassign_message_id(row.key, &fresh).await?;
            *message_id = fresh;
        }

        let subject = Article::subject_for(&job.subject, &file.meta.name, row.key.part, file.meta.total_parts);
        let article = Article::for_segment(
            encoded,
            subject,
            job.poster.clone(),
            row.groups.clone(),
            message_id.clone(),
        )?;
        session.post(&article).await
    }

    /// Staged body of a row, checked against the ledger's CRC32
    ///
    /// A missing staged file is re-encoded from the source.
    async fn load_encoded(&self, job: &JobRecord, file: &FileRecord, row: &SegmentRow) -> Result<EncodedPart> {
        let path = staged_body_path(&job.stage_dir, &file.meta.name, row.key.part);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} missing; re-encoding from source", path.display());
                self.reencode(file, row).await?
            }
            Err(e) => return Err(e.into()),
        };

        let decoded = decode_verified(&body)?;
        if decoded.data.len() as u64 != row.length {
            return Err(NntpError::Codec(format!(
                "{}: staged {} bytes, ledger expects {}",
                path.display(),
                decoded.data.len(),
                row.length
            )));
        }
        if let Some(expected) = row.crc32
            && expected != decoded.calculated_crc32
        {
            return Err(NntpError::ChecksumMismatch {
                expected,
                actual: decoded.calculated_crc32,
            });
        }

        Ok(EncodedPart {
            part: row.key.part,
            total: file.meta.total_parts,
            offset: row.offset,
            length: row.length,
            crc32: decoded.calculated_crc32,
            body,
        })
    }

    async fn reencode(&self, file: &FileRecord, row: &SegmentRow) -> Result<Vec<u8>> {
        let mut source = tokio::fs::File::open(&file.meta.path).await?;
        let mut data = Vec::new();
        read_range(&mut source, row.offset, row.length, &mut data).await?;

        let spec = PartSpec {
            part: row.key.part,
            total: file.meta.total_parts,
            offset: row.offset,
            file_size: file.meta.size,
            file_crc32: Some(file.meta.crc32),
        };
        Ok(encode_part(&data, spec, self.config.line_length, &file.meta.name)?.body)
    }
}

/// Refusals that say more about the provider than about the segment: the
/// group is not carried there, or a command the post depends on is refused
fn refused_by_provider(error: &NntpError) -> bool {
    matches!(error, NntpError::NoSuchGroup(_))
        || matches!(error, NntpError::Protocol { code, .. } if (500..600).contains(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_refusals() {
        assert!(refused_by_provider(&NntpError::NoSuchGroup("alt.test".into())));
        assert!(refused_by_provider(&NntpError::Protocol {
            code: 500,
            message: "What?".into()
        }));
        assert!(refused_by_provider(&NntpError::Protocol {
            code: 502,
            message: "Access denied".into()
        }));
        assert!(!refused_by_provider(&NntpError::PostRejected("441".into())));
        assert!(!refused_by_provider(&NntpError::Protocol {
            code: 441,
            message: "duplicate".into()
        }));
    }
}
