use crate::error::{IsRetryable, NntpError, Result};
use crate::nzb::{Nzb, NzbFile, NzbSegment};
use crate::yenc::{YencMultipartAssembler, decode_verified};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::{DownloadReport, FailedDownload, Pipeline, release_after};

/// A file written by [`Pipeline::download`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    /// File name as written
    pub name: String,
    /// Full path of the written file
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// CRC32 of the written bytes
    pub crc32: u32,
}

impl Pipeline {
    /// Fetch, verify and reassemble every file of a manifest into
    /// `dest_dir`
    ///
    /// Files that cannot be completed are reported individually; the
    /// others are still written.
    pub async fn download(&self, nzb: &Nzb, dest_dir: &Path) -> Result<DownloadReport> {
        tokio::fs::create_dir_all(dest_dir).await?;

        let mut report = DownloadReport::default();
        for (index, file) in nzb.files.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Download cancelled; {} files not started", nzb.files.len() - index);
                break;
            }
            match self.download_file(file, dest_dir).await {
                Ok(done) => report.completed.push(done),
                Err(e) => {
                    let name = file.file_name().unwrap_or_else(|| format!("file {}", index + 1));
                    error!("Download of {} failed: {}", name, e);
                    report.failed.push(FailedDownload { name, error: e });
                }
            }
        }

        info!("Download: {}", report);
        Ok(report)
    }

    /// Fetch and reassemble one manifest file
    ///
    /// # Errors
    /// - [`NntpError::ChecksumMismatch`] when a part or the whole file fails its CRC32
    /// - [`NntpError::IncompleteTransfer`] naming the parts no provider could supply
    pub async fn download_file(&self, file: &NzbFile, dest_dir: &Path) -> Result<DownloadedFile> {
        let segments = file.ordered_segments();
        let workers = self.workers();

        let results: Vec<(u32, Result<Vec<u8>>)> = stream::iter(segments)
            .map(|segment| async move { (segment.number, self.fetch_segment(segment).await) })
            .buffer_unordered(workers)
            .collect()
            .await;

        let mut assembler = YencMultipartAssembler::new();
        if let Some(crc32) = file.crc32 {
            assembler = assembler.with_file_crc32(crc32);
        }

        let mut missing = Vec::new();
        let mut corrupt = None;
        for (number, result) in results {
            let added = result.and_then(|body| assembler.add_part(decode_verified(&body)?));
            match added {
                Ok(()) => {}
                Err(e @ NntpError::ChecksumMismatch { .. }) => {
                    error!("Segment {} failed its CRC32 check: {}", number, e);
                    corrupt.get_or_insert(e);
                }
                Err(e) => {
                    warn!("Segment {} unavailable: {}", number, e);
                    missing.push(number);
                }
            }
        }

        if let Some(e) = corrupt {
            return Err(e);
        }
        if assembler.parts_received() == 0 {
            missing.sort_unstable();
            return Err(NntpError::IncompleteTransfer { missing });
        }
        let data = assembler.assemble()?;

        let name = output_name(assembler.filename(), file);
        let path = dest_dir.join(&name);
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &path).await?;

        let crc32 = crc32fast::hash(&data);
        info!("Downloaded {} ({} bytes, crc32 {:08x})", name, data.len(), crc32);
        Ok(DownloadedFile {
            name,
            path,
            size: data.len() as u64,
            crc32,
        })
    }

    /// Body of one segment, trying each provider at most once
    async fn fetch_segment(&self, segment: &NzbSegment) -> Result<Vec<u8>> {
        let id = segment.article_id();
        let mut tried: Vec<usize> = Vec::new();
        let mut last_error = NntpError::NoSuchArticle(id.clone());

        while tried.len() < self.pool.provider_count() {
            if self.cancel.is_cancelled() {
                return Err(NntpError::Cancelled);
            }
            let mut session = self.pool.acquire_excluding(self.pool.acquire_timeout(), &tried).await?;
            tried.push(session.provider_index());

            match session.fetch_body(&id).await {
                Ok(body) => {
                    release_after(&self.pool, session, None);
                    debug!("Fetched {} ({} bytes)", id, body.len());
                    return Ok(body);
                }
                Err(e @ NntpError::NoSuchArticle(_)) => {
                    debug!("{} not on {}; trying next provider", id, session.provider_name());
                    release_after(&self.pool, session, None);
                    last_error = e;
                }
                Err(e) if e.is_retryable() => {
                    warn!("Fetching {} from {} failed: {}", id, session.provider_name(), e);
                    release_after(&self.pool, session, Some(&e));
                    last_error = e.into_transient();
                }
                Err(e) => {
                    release_after(&self.pool, session, Some(&e));
                    return Err(e);
                }
            }
        }
        Err(last_error)
    }
}

/// Bare file name to write, never a path outside the destination
pub(crate) fn output_name(decoded: Option<&str>, file: &NzbFile) -> String {
    decoded
        .map(str::to_string)
        .or_else(|| file.file_name())
        .and_then(|name| {
            Path::new(&name)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| format!("download-{:08x}", file.crc32.unwrap_or(0)))
}
