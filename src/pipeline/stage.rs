use crate::article::generate_message_id;
use crate::error::{NntpError, Result};
use crate::ledger::{
    FileMetadata, JobState, NewJob, NewSegment, Phase, SegmentOutcome, SegmentState,
};
use crate::yenc::{PartSpec, encode_part, part_count};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::{Pipeline, PhaseReport, SegmentResult, Tally, read_range, staged_body_path};

impl Pipeline {
    /// Split a file (or every regular file of a directory) into segments,
    /// record them in the ledger and write their encoded bodies to the
    /// job's staging directory
    ///
    /// Running it again for the same job only encodes rows still
    /// `pending`; rows that moved on are left alone.
    pub async fn stage(&self, job_name: &str, source: &Path, groups: &[String]) -> Result<PhaseReport> {
        if groups.is_empty() {
            return Err(NntpError::Config("at least one newsgroup is required".to_string()));
        }

        let stage_dir = self.stage_dir(job_name);
        let job = self
            .ledger
            .create_job(&NewJob {
                name: job_name.to_string(),
                source_path: source.to_path_buf(),
                stage_dir: stage_dir.clone(),
                groups: groups.to_vec(),
                poster: self.config.poster.clone(),
                subject: self.config.subject.clone(),
            })
            .await?;

        tokio::fs::create_dir_all(&stage_dir).await?;

        let files = source_files(source).await?;
        if files.is_empty() {
            warn!("Nothing to stage under {}", source.display());
        }

        let mut tally = Tally::default();
        for path in files {
            if self.cancel.is_cancelled() {
                info!("Staging of '{}' cancelled", job_name);
                break;
            }
            self.stage_file(job.id, &job.groups, &stage_dir, &path, &mut tally)
                .await?;
        }

        let stats = self.ledger.stats(job.id).await?;
        if stats.failed > 0 {
            self.ledger.set_job_state(job.id, JobState::Failed).await?;
        }
        let report = PhaseReport::new(Phase::Stage, tally, stats.pending, stats);
        info!("Stage '{}': {}", job_name, report);
        Ok(report)
    }

    async fn stage_file(
        &self,
        job_id: i64,
        groups: &[String],
        stage_dir: &Path,
        path: &Path,
        tally: &mut Tally,
    ) -> Result<()> {
        let name = file_name(path)?;
        let mut source = tokio::fs::File::open(path).await?;
        let size = source.metadata().await?.len();
        if size == 0 {
            warn!("Skipping empty file {}", path.display());
            return Ok(());
        }

        let part_size = self.config.part_size;
        let total = part_count(size, part_size);

        // One part in memory at a time, for the part CRCs and the file CRC
        let mut buffer = Vec::new();
        let mut file_hasher = crc32fast::Hasher::new();
        let mut segments = Vec::with_capacity(total as usize);
        for part in 1..=total {
            let offset = u64::from(part - 1) * part_size;
            let length = part_size.min(size - offset);
            read_range(&mut source, offset, length, &mut buffer).await?;
            file_hasher.update(&buffer);
            segments.push(NewSegment {
                part,
                offset,
                length,
                crc32: Some(crc32fast::hash(&buffer)),
                message_id: Some(generate_message_id(&self.config.message_id_domain)),
                groups: groups.to_vec(),
            });
        }
        let file_crc32 = file_hasher.finalize();

        let meta = FileMetadata {
            name: name.clone(),
            path: path.to_path_buf(),
            size,
            crc32: file_crc32,
            part_size,
            total_parts: total,
        };
        self.check_unchanged(job_id, &meta).await?;
        let file_id = self.ledger.create_file(job_id, &meta, &segments).await?;

        for row in self.ledger.segments_for_file(file_id).await? {
            if row.state != SegmentState::Pending {
                continue;
            }
            if self.cancel.is_cancelled() {
                break;
            }

            read_range(&mut source, row.offset, row.length, &mut buffer).await?;
            let spec = PartSpec {
                part: row.key.part,
                total,
                offset: row.offset,
                file_size: size,
                file_crc32: Some(file_crc32),
            };
            let encoded = encode_part(&buffer, spec, self.config.line_length, &name)?;

            // The source may be rewritten while we read it
            if let Some(expected) = row.crc32
                && expected != encoded.crc32
            {
                error!(
                    "{} part {}: source changed while staging ({:08x} != {:08x})",
                    name, row.key.part, encoded.crc32, expected
                );
                self.ledger
                    .mark_complete(
                        row.key,
                        Phase::Stage,
                        SegmentOutcome::Failed(
                            NntpError::ChecksumMismatch {
                                expected,
                                actual: encoded.crc32,
                            }
                            .to_string(),
                        ),
                    )
                    .await?;
                tally.add(SegmentResult::Failed);
                continue;
            }

            tokio::fs::write(staged_body_path(stage_dir, &name, row.key.part), &encoded.body).await?;
            self.ledger
                .mark_complete(
                    row.key,
                    Phase::Stage,
                    SegmentOutcome::Completed {
                        crc32: Some(encoded.crc32),
                        message_id: None,
                    },
                )
                .await?;
            tally.add(SegmentResult::Completed);
        }

        debug!("Staged {} ({} bytes, {} parts)", name, size, total);
        Ok(())
    }

    /// Refuse to extend a file already in the ledger with different bytes
    ///
    /// Rows posted earlier announce the recorded size, part count and file
    /// CRC in their yEnc headers; new rows must agree with them.
    async fn check_unchanged(&self, job_id: i64, meta: &FileMetadata) -> Result<()> {
        let Some(recorded) = self
            .ledger
            .files(job_id)
            .await?
            .into_iter()
            .find(|f| f.meta.name == meta.name)
        else {
            return Ok(());
        };

        if recorded.meta.size != meta.size || recorded.meta.part_size != meta.part_size {
            return Err(NntpError::Config(format!(
                "{} was staged as {} bytes in {}-byte parts but is now {} bytes in {}-byte parts",
                meta.name, recorded.meta.size, recorded.meta.part_size, meta.size, meta.part_size
            )));
        }
        if recorded.meta.crc32 != meta.crc32 {
            return Err(NntpError::ChecksumMismatch {
                expected: recorded.meta.crc32,
                actual: meta.crc32,
            });
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| NntpError::Config(format!("{} has no file name", path.display())))
}

/// The file itself, or the regular files directly inside a directory,
/// sorted by name
async fn source_files(source: &Path) -> Result<Vec<PathBuf>> {
    let meta = tokio::fs::metadata(source).await?;
    if meta.is_file() {
        return Ok(vec![source.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(source).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
