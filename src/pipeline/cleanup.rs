use crate::error::Result;
use tracing::{info, warn};

use super::Pipeline;

impl Pipeline {
    /// Forget a job: its ledger rows and staged bodies go, the source and
    /// any written manifest stay
    ///
    /// Allowed in any job state. Returns the number of segment rows
    /// removed; an unknown job removes nothing.
    pub async fn cleanup(&self, job_name: &str) -> Result<u64> {
        let Some(job) = self.ledger.find_job_by_name(job_name).await? else {
            info!("No job '{}' to clean up", job_name);
            return Ok(0);
        };

        let removed = self.ledger.cleanup(job.id).await?;

        let stage_dir = &job.stage_dir;
        if job.source_path.starts_with(stage_dir)
            || job.nzb_path.as_ref().is_some_and(|p| p.starts_with(stage_dir))
        {
            warn!(
                "Staging directory {} holds the source or manifest; leaving it in place",
                stage_dir.display()
            );
        } else {
            match tokio::fs::remove_dir_all(stage_dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!("Cleaned up job '{}' ({} segment rows)", job_name, removed);
        Ok(removed)
    }
}
