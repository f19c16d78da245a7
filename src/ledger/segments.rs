//! File staging and per-segment state transitions.

use crate::error::Result;
use tracing::{debug, warn};

use super::{
    FileMetadata, FileRecord, FileRow, Ledger, LedgerStats, NewSegment, Phase, SegmentDbRow,
    SegmentKey, SegmentOutcome, SegmentRow, SegmentState, join_groups, now,
};

const SEGMENT_COLUMNS: &str = "s.file_id, s.part, s.byte_offset, s.length, s.crc32, s.state, s.message_id, s.newsgroups, s.attempts, s.last_error, s.posted_at, s.verified_at";

const FILE_COLUMNS: &str = "id, job_id, name, path, size, crc32, part_size, total_parts";

fn state_list(states: &[SegmentState]) -> String {
    states
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn into_rows(rows: Vec<SegmentDbRow>) -> Result<Vec<SegmentRow>> {
    rows.into_iter().map(SegmentRow::try_from).collect()
}

impl Ledger {
    /// Insert a file and all of its segments in `pending` state
    ///
    /// Idempotent: an existing file keeps its id and existing segment
    /// rows are left untouched, whatever state they are in. Everything
    /// happens in one transaction.
    pub async fn create_file(
        &self,
        job_id: i64,
        meta: &FileMetadata,
        segments: &[NewSegment],
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO files (job_id, name, path, size, crc32, part_size, total_parts)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job_id)
        .bind(&meta.name)
        .bind(meta.path.to_string_lossy().as_ref())
        .bind(meta.size as i64)
        .bind(i64::from(meta.crc32))
        .bind(meta.part_size as i64)
        .bind(i64::from(meta.total_parts))
        .execute(&mut *tx)
        .await?;

        let file_id: i64 = sqlx::query_scalar("SELECT id FROM files WHERE job_id = ? AND name = ?")
            .bind(job_id)
            .bind(&meta.name)
            .fetch_one(&mut *tx)
            .await?;

        let mut inserted = 0u64;
        for segment in segments {
            inserted += sqlx::query(
                r#"
                INSERT OR IGNORE INTO segments (
                    file_id, part, byte_offset, length, crc32, state, message_id, newsgroups
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(file_id)
            .bind(i64::from(segment.part))
            .bind(segment.offset as i64)
            .bind(segment.length as i64)
            .bind(segment.crc32.map(i64::from))
            .bind(SegmentState::Pending.as_str())
            .bind(segment.message_id.as_deref())
            .bind(join_groups(&segment.groups))
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        debug!(
            "Staged file '{}' as {} ({} of {} segment rows new)",
            meta.name,
            file_id,
            inserted,
            segments.len()
        );
        Ok(file_id)
    }

    /// Files of a job, in insertion order
    pub async fn files(&self, job_id: i64) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> = sqlx::query_as(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE job_id = ? ORDER BY id"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(FileRecord::from).collect())
    }

    /// Up to `limit` rows the phase should process, ordered by
    /// (file, part)
    pub async fn next_pending(&self, job_id: i64, phase: Phase, limit: u32) -> Result<Vec<SegmentRow>> {
        self.next_pending_after(job_id, phase, None, limit).await
    }

    /// Like [`next_pending`](Self::next_pending) but only rows strictly
    /// after `after`, so one pass visits every row once even when some
    /// stay eligible
    pub async fn next_pending_after(
        &self,
        job_id: i64,
        phase: Phase,
        after: Option<SegmentKey>,
        limit: u32,
    ) -> Result<Vec<SegmentRow>> {
        let (after_file, after_part) = after.map_or((i64::MIN, 0), |k| (k.file_id, i64::from(k.part)));
        let rows: Vec<SegmentDbRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SEGMENT_COLUMNS}
            FROM segments s JOIN files f ON f.id = s.file_id
            WHERE f.job_id = ?
              AND s.state IN ({})
              AND (s.file_id > ? OR (s.file_id = ? AND s.part > ?))
            ORDER BY s.file_id, s.part
            LIMIT ?
            "#,
            state_list(phase.eligible())
        ))
        .bind(job_id)
        .bind(after_file)
        .bind(after_file)
        .bind(after_part)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        into_rows(rows)
    }

    /// Apply a phase's result to one row, moving it forward only
    ///
    /// The update only matches rows still in a state the phase consumes,
    /// so a row is never moved backwards or completed twice. Returns
    /// whether a row changed.
    pub async fn mark_complete(
        &self,
        key: SegmentKey,
        phase: Phase,
        outcome: SegmentOutcome,
    ) -> Result<bool> {
        let eligible = state_list(phase.eligible());
        let now = now();

        let result = match &outcome {
            SegmentOutcome::Completed { crc32, message_id } => {
                let target = phase.completes_to();
                sqlx::query(&format!(
                    r#"
                    UPDATE segments
                    SET state = ?,
                        crc32 = COALESCE(?, crc32),
                        message_id = COALESCE(?, message_id),
                        posted_at = CASE WHEN ? = 'posted' THEN ? ELSE posted_at END,
                        verified_at = CASE WHEN ? = 'verified' THEN ? ELSE verified_at END,
                        last_error = NULL
                    WHERE file_id = ? AND part = ? AND state IN ({eligible})
                    "#
                ))
                .bind(target.as_str())
                .bind(crc32.map(i64::from))
                .bind(message_id.as_deref())
                .bind(target.as_str())
                .bind(now)
                .bind(target.as_str())
                .bind(now)
                .bind(key.file_id)
                .bind(i64::from(key.part))
                .execute(&self.pool)
                .await?
            }
            SegmentOutcome::Failed(reason) => {
                sqlx::query(&format!(
                    r#"
                    UPDATE segments
                    SET state = 'failed', last_error = ?
                    WHERE file_id = ? AND part = ? AND state IN ({eligible})
                    "#
                ))
                .bind(reason)
                .bind(key.file_id)
                .bind(i64::from(key.part))
                .execute(&self.pool)
                .await?
            }
        };

        let changed = result.rows_affected() > 0;
        if !changed {
            warn!("Segment {} not in a {} state; left unchanged", key, phase);
        }
        Ok(changed)
    }

    /// Count a failed attempt without changing state
    pub async fn record_attempt(&self, key: SegmentKey, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE segments SET attempts = attempts + 1, last_error = ? WHERE file_id = ? AND part = ?",
        )
        .bind(error)
        .bind(key.file_id)
        .bind(i64::from(key.part))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Replace the message-id of a row that has not been posted yet
    pub async fn reassign_message_id(&self, key: SegmentKey, message_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE segments SET message_id = ? WHERE file_id = ? AND part = ? AND state IN ('pending', 'encoded')",
        )
        .bind(message_id)
        .bind(key.file_id)
        .bind(i64::from(key.part))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// One row by key
    pub async fn segment(&self, key: SegmentKey) -> Result<Option<SegmentRow>> {
        let row: Option<SegmentDbRow> = sqlx::query_as(&format!(
            "SELECT {SEGMENT_COLUMNS} FROM segments s WHERE s.file_id = ? AND s.part = ?"
        ))
        .bind(key.file_id)
        .bind(i64::from(key.part))
        .fetch_optional(&self.pool)
        .await?;
        row.map(SegmentRow::try_from).transpose()
    }

    /// All rows of one file ordered by part
    pub async fn segments_for_file(&self, file_id: i64) -> Result<Vec<SegmentRow>> {
        let rows: Vec<SegmentDbRow> = sqlx::query_as(&format!(
            "SELECT {SEGMENT_COLUMNS} FROM segments s WHERE s.file_id = ? ORDER BY s.part"
        ))
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;
        into_rows(rows)
    }

    /// Counts by state for one job
    pub async fn stats(&self, job_id: i64) -> Result<LedgerStats> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT s.state, COUNT(*)
            FROM segments s JOIN files f ON f.id = s.file_id
            WHERE f.job_id = ?
            GROUP BY s.state
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = LedgerStats::default();
        for (state, count) in rows {
            stats.add(state.parse()?, count as u64);
        }
        Ok(stats)
    }

    /// Consistent snapshot of every posted or verified row, per file,
    /// in (file, part) order
    pub async fn segments_for_manifest(&self, job_id: i64) -> Result<Vec<(FileRecord, Vec<SegmentRow>)>> {
        let mut tx = self.pool.begin().await?;

        let files: Vec<FileRow> = sqlx::query_as(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE job_id = ? ORDER BY id"
        ))
        .bind(job_id)
        .fetch_all(&mut *tx)
        .await?;

        let mut out = Vec::with_capacity(files.len());
        for file in files {
            let rows: Vec<SegmentDbRow> = sqlx::query_as(&format!(
                r#"
                SELECT {SEGMENT_COLUMNS} FROM segments s
                WHERE s.file_id = ? AND s.state IN ('posted', 'verified')
                ORDER BY s.part
                "#
            ))
            .bind(file.id)
            .fetch_all(&mut *tx)
            .await?;
            out.push((FileRecord::from(file), into_rows(rows)?));
        }

        tx.commit().await?;
        Ok(out)
    }
}
