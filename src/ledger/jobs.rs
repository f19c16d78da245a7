//! Job records and cleanup.

use crate::error::{NntpError, Result};
use std::path::Path;
use tracing::{debug, info};

use super::{JobRecord, JobRow, JobState, Ledger, NewJob, join_groups, now};

const JOB_COLUMNS: &str = "id, name, source_path, stage_dir, newsgroups, poster, subject, state, created_at, updated_at, nzb_path";

impl Ledger {
    /// Insert a job, or return the existing one with the same name
    pub async fn create_job(&self, job: &NewJob) -> Result<JobRecord> {
        let now = now();
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO jobs (
                name, source_path, stage_dir, newsgroups, poster, subject, state, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.name)
        .bind(job.source_path.to_string_lossy().as_ref())
        .bind(job.stage_dir.to_string_lossy().as_ref())
        .bind(join_groups(&job.groups))
        .bind(&job.poster)
        .bind(&job.subject)
        .bind(JobState::Staged.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            info!("Created job '{}'", job.name);
        } else {
            debug!("Job '{}' already exists", job.name);
        }

        self.find_job_by_name(&job.name)
            .await?
            .ok_or_else(|| NntpError::Other(format!("job '{}' vanished after insert", job.name)))
    }

    /// Look up a job by name
    pub async fn find_job_by_name(&self, name: &str) -> Result<Option<JobRecord>> {
        let row: Option<JobRow> =
            sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE name = ?"))
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        row.map(JobRecord::try_from).transpose()
    }

    /// Fetch a job by id
    ///
    /// # Errors
    ///
    /// Returns [`NntpError::Ledger`] with `RowNotFound` for an unknown id.
    pub async fn job(&self, id: i64) -> Result<JobRecord> {
        let row: JobRow = sqlx::query_as(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        JobRecord::try_from(row)
    }

    /// Record a job lifecycle transition
    pub async fn set_job_state(&self, id: i64, state: JobState) -> Result<()> {
        sqlx::query("UPDATE jobs SET state = ?, updated_at = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        debug!("Job {} -> {}", id, state);
        Ok(())
    }

    /// Remember where the job's manifest was written
    pub async fn set_job_manifest(&self, id: i64, path: &Path) -> Result<()> {
        sqlx::query("UPDATE jobs SET nzb_path = ?, updated_at = ? WHERE id = ?")
            .bind(path.to_string_lossy().as_ref())
            .bind(now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete the job with all of its files and segments
    ///
    /// Returns the number of segment rows removed.
    pub async fn cleanup(&self, id: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let segments = sqlx::query(
            "DELETE FROM segments WHERE file_id IN (SELECT id FROM files WHERE job_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM files WHERE job_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Removed job {} ({} segment rows)", id, segments);
        Ok(segments)
    }
}
