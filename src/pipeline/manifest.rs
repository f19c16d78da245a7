use crate::article::Article;
use crate::error::Result;
use crate::ledger::JobRecord;
use crate::nzb::{Nzb, NzbFile, NzbSegment, bare_message_id};
use std::path::PathBuf;
use tracing::{info, warn};

use super::Pipeline;

impl Pipeline {
    /// Write the manifest from whatever the ledger has posted so far,
    /// ignoring the upload barrier
    ///
    /// Failed and unposted segments are left out.
    pub async fn force_manifest(&self, job_name: &str) -> Result<PathBuf> {
        let job = self.job(job_name).await?;
        let stats = self.ledger.stats(job.id).await?;
        if stats.unfinished() > 0 || stats.failed > 0 {
            warn!(
                "Forcing manifest for '{}' with {} pending and {} failed segments",
                job.name,
                stats.unfinished(),
                stats.failed
            );
        }
        self.write_manifest(&job).await
    }

    /// Manifest for a job built from one consistent ledger snapshot
    pub async fn build_manifest(&self, job: &JobRecord) -> Result<Nzb> {
        let mut nzb = Nzb::default();
        nzb.meta.insert("name".to_string(), job.name.clone());
        for (key, value) in &self.config.manifest_meta {
            nzb.meta.insert(key.clone(), value.clone());
        }

        for (file, rows) in self.ledger.segments_for_manifest(job.id).await? {
            let date = rows
                .iter()
                .filter_map(|r| r.posted_at)
                .max()
                .unwrap_or(job.created_at);
            let segments = rows
                .iter()
                .filter_map(|row| {
                    let id = row.message_id.as_deref()?;
                    Some(NzbSegment {
                        bytes: row.length,
                        number: row.key.part,
                        crc32: row.crc32,
                        message_id: bare_message_id(id).to_string(),
                    })
                })
                .collect();

            nzb.files.push(NzbFile {
                poster: job.poster.clone(),
                date,
                subject: Article::subject_for(&job.subject, &file.meta.name, 1, file.meta.total_parts),
                filename: Some(file.meta.name.clone()),
                crc32: Some(file.meta.crc32),
                groups: job.groups.clone(),
                segments,
            });
        }
        Ok(nzb)
    }

    pub(crate) async fn write_manifest(&self, job: &JobRecord) -> Result<PathBuf> {
        let nzb = self.build_manifest(job).await?;
        let path = self.manifest_path(job);
        nzb.write_to(&path).await?;
        self.ledger.set_job_manifest(job.id, &path).await?;
        info!(
            "Manifest for '{}' written to {} ({} segments)",
            job.name,
            path.display(),
            nzb.segment_count()
        );
        Ok(path)
    }

    /// `<job>.nzb` in the manifest directory, or next to the source
    fn manifest_path(&self, job: &JobRecord) -> PathBuf {
        let dir = match &self.config.manifest_dir {
            Some(dir) => dir.clone(),
            None => job
                .source_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_default(),
        };
        dir.join(format!("{}.nzb", job.name))
    }
}
