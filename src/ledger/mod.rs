//! Persistent segment ledger
//!
//! One SQLite database records every job, its files and one row per
//! segment. Segment state only moves forward
//! (`pending → encoded → posted → verified`, or to `failed`), and every
//! transition is a single conditional `UPDATE`, so a crash at any point
//! leaves the ledger resumable.
//!
//! ## Submodules
//!
//! Methods on [`Ledger`] are organized by domain:
//! - [`migrations`]: Database lifecycle, schema migrations
//! - [`jobs`]: Job records and cleanup
//! - [`segments`]: File staging and per-segment state transitions

use crate::error::{NntpError, Result};
use sqlx::FromRow;
use sqlx::sqlite::SqlitePool;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

mod jobs;
mod migrations;
mod segments;


/// Handle to the ledger database
///
/// Cloning is cheap and shares the connection pool.
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

/// Lifecycle state of one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentState {
    /// Row exists, article body not yet written
    Pending,
    /// Article body staged on disk
    Encoded,
    /// Server accepted the article
    Posted,
    /// Article found on the server after posting
    Verified,
    /// Permanently failed; needs operator action
    Failed,
}

impl SegmentState {
    /// Every state, in lifecycle order
    pub const ALL: [SegmentState; 5] = [
        SegmentState::Pending,
        SegmentState::Encoded,
        SegmentState::Posted,
        SegmentState::Verified,
        SegmentState::Failed,
    ];

    /// Column value
    pub fn as_str(self) -> &'static str {
        match self {
            SegmentState::Pending => "pending",
            SegmentState::Encoded => "encoded",
            SegmentState::Posted => "posted",
            SegmentState::Verified => "verified",
            SegmentState::Failed => "failed",
        }
    }
}

impl fmt::Display for SegmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SegmentState {
    type Err = NntpError;

    fn from_str(s: &str) -> Result<Self> {
        SegmentState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| NntpError::Other(format!("unknown segment state '{s}'")))
    }
}

/// Pipeline phase that owns a segment transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Encode and stage article bodies
    Stage,
    /// Post staged articles
    Upload,
    /// Confirm posted articles exist
    Verify,
}

impl Phase {
    /// States this phase consumes
    pub fn eligible(self) -> &'static [SegmentState] {
        match self {
            Phase::Stage => &[SegmentState::Pending],
            Phase::Upload => &[SegmentState::Encoded],
            Phase::Verify => &[SegmentState::Posted],
        }
    }

    /// State a successful row moves to
    pub fn completes_to(self) -> SegmentState {
        match self {
            Phase::Stage => SegmentState::Encoded,
            Phase::Upload => SegmentState::Posted,
            Phase::Verify => SegmentState::Verified,
        }
    }

    /// Name used in logs and reports
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Stage => "stage",
            Phase::Upload => "upload",
            Phase::Verify => "verify",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Segments computed and staged
    Staged,
    /// Upload pass in progress or interrupted
    Uploading,
    /// Every segment posted or failed; manifest written
    Uploaded,
    /// Verify pass in progress or interrupted
    Verifying,
    /// Every posted segment confirmed
    Verified,
    /// Finished a phase with failed segments
    Failed,
}

impl JobState {
    /// Every state, in lifecycle order
    pub const ALL: [JobState; 6] = [
        JobState::Staged,
        JobState::Uploading,
        JobState::Uploaded,
        JobState::Verifying,
        JobState::Verified,
        JobState::Failed,
    ];

    /// Column value
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Staged => "staged",
            JobState::Uploading => "uploading",
            JobState::Uploaded => "uploaded",
            JobState::Verifying => "verifying",
            JobState::Verified => "verified",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = NntpError;

    fn from_str(s: &str) -> Result<Self> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| NntpError::Other(format!("unknown job state '{s}'")))
    }
}

/// Unique key of a segment row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentKey {
    /// Ledger id of the file
    pub file_id: i64,
    /// 1-based part number
    pub part: u32,
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.file_id, self.part)
    }
}

/// New job to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Unique job name
    pub name: String,
    /// Source file or directory
    pub source_path: PathBuf,
    /// Directory holding staged article bodies
    pub stage_dir: PathBuf,
    /// Target newsgroups
    pub groups: Vec<String>,
    /// From header used when posting
    pub poster: String,
    /// Subject template
    pub subject: String,
}

/// Job record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    /// Unique database ID
    pub id: i64,
    /// Unique job name
    pub name: String,
    /// Source file or directory
    pub source_path: PathBuf,
    /// Directory holding staged article bodies
    pub stage_dir: PathBuf,
    /// Target newsgroups
    pub groups: Vec<String>,
    /// From header used when posting
    pub poster: String,
    /// Subject template
    pub subject: String,
    /// Current lifecycle state
    pub state: JobState,
    /// Unix timestamp when the job was created
    pub created_at: i64,
    /// Unix timestamp of the last state change
    pub updated_at: i64,
    /// Manifest written for this job, if any
    pub nzb_path: Option<PathBuf>,
}

/// Job row (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
struct JobRow {
    id: i64,
    name: String,
    source_path: String,
    stage_dir: String,
    newsgroups: String,
    poster: String,
    subject: String,
    state: String,
    created_at: i64,
    updated_at: i64,
    nzb_path: Option<String>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = NntpError;

    fn try_from(row: JobRow) -> Result<Self> {
        Ok(JobRecord {
            id: row.id,
            name: row.name,
            source_path: PathBuf::from(row.source_path),
            stage_dir: PathBuf::from(row.stage_dir),
            groups: split_groups(&row.newsgroups),
            poster: row.poster,
            subject: row.subject,
            state: row.state.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
            nzb_path: row.nzb_path.map(PathBuf::from),
        })
    }
}

/// Description of one staged source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// File name as posted (unique within the job)
    pub name: String,
    /// Location of the source bytes
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// CRC32 of the whole file
    pub crc32: u32,
    /// Raw bytes per segment
    pub part_size: u64,
    /// Number of segments
    pub total_parts: u32,
}

/// File record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Unique database ID
    pub id: i64,
    /// Owning job
    pub job_id: i64,
    /// Staged file metadata
    pub meta: FileMetadata,
}

/// File row (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
struct FileRow {
    id: i64,
    job_id: i64,
    name: String,
    path: String,
    size: i64,
    crc32: i64,
    part_size: i64,
    total_parts: i64,
}

impl From<FileRow> for FileRecord {
    fn from(row: FileRow) -> Self {
        FileRecord {
            id: row.id,
            job_id: row.job_id,
            meta: FileMetadata {
                name: row.name,
                path: PathBuf::from(row.path),
                size: row.size as u64,
                crc32: row.crc32 as u32,
                part_size: row.part_size as u64,
                total_parts: row.total_parts as u32,
            },
        }
    }
}

/// New segment row, inserted in `pending` state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSegment {
    /// 1-based part number
    pub part: u32,
    /// Byte offset in the source file
    pub offset: u64,
    /// Raw byte count
    pub length: u64,
    /// CRC32 of the raw bytes, when already known
    pub crc32: Option<u32>,
    /// Message-ID assigned ahead of posting
    pub message_id: Option<String>,
    /// Target newsgroups
    pub groups: Vec<String>,
}

/// One segment of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRow {
    /// Unique key
    pub key: SegmentKey,
    /// Byte offset in the source file
    pub offset: u64,
    /// Raw byte count
    pub length: u64,
    /// CRC32 of the raw bytes, once known
    pub crc32: Option<u32>,
    /// Current state
    pub state: SegmentState,
    /// Message-ID, assigned at stage time and confirmed by the server
    pub message_id: Option<String>,
    /// Target newsgroups
    pub groups: Vec<String>,
    /// Failed attempts recorded so far
    pub attempts: u32,
    /// Most recent failure reason
    pub last_error: Option<String>,
    /// Unix timestamp when posted
    pub posted_at: Option<i64>,
    /// Unix timestamp when verified
    pub verified_at: Option<i64>,
}

/// Segment row (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
struct SegmentDbRow {
    file_id: i64,
    part: i64,
    byte_offset: i64,
    length: i64,
    crc32: Option<i64>,
    state: String,
    message_id: Option<String>,
    newsgroups: String,
    attempts: i64,
    last_error: Option<String>,
    posted_at: Option<i64>,
    verified_at: Option<i64>,
}

impl TryFrom<SegmentDbRow> for SegmentRow {
    type Error = NntpError;

    fn try_from(row: SegmentDbRow) -> Result<Self> {
        Ok(SegmentRow {
            key: SegmentKey {
                file_id: row.file_id,
                part: row.part as u32,
            },
            offset: row.byte_offset as u64,
            length: row.length as u64,
            crc32: row.crc32.map(|c| c as u32),
            state: row.state.parse()?,
            message_id: row.message_id,
            groups: split_groups(&row.newsgroups),
            attempts: row.attempts as u32,
            last_error: row.last_error,
            posted_at: row.posted_at,
            verified_at: row.verified_at,
        })
    }
}

/// Result a phase records for one segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// Advance to the phase's completion state
    Completed {
        /// CRC32 to record, if this phase computed it
        crc32: Option<u32>,
        /// Message-ID to record, if this phase learned it
        message_id: Option<String>,
    },
    /// Move to `failed` with a reason for the operator
    Failed(String),
}

impl SegmentOutcome {
    /// Completion without new data
    pub fn done() -> Self {
        SegmentOutcome::Completed {
            crc32: None,
            message_id: None,
        }
    }
}

/// Segment counts by state for one job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    /// Rows not yet staged
    pub pending: u64,
    /// Rows staged but not posted
    pub encoded: u64,
    /// Rows posted but not verified
    pub posted: u64,
    /// Rows confirmed on the server
    pub verified: u64,
    /// Rows needing operator action
    pub failed: u64,
}

impl LedgerStats {
    /// Total rows
    pub fn total(&self) -> u64 {
        self.pending + self.encoded + self.posted + self.verified + self.failed
    }

    /// Rows that still need staging or posting
    pub fn unfinished(&self) -> u64 {
        self.pending + self.encoded
    }

    /// Count for one state
    pub fn count(&self, state: SegmentState) -> u64 {
        match state {
            SegmentState::Pending => self.pending,
            SegmentState::Encoded => self.encoded,
            SegmentState::Posted => self.posted,
            SegmentState::Verified => self.verified,
            SegmentState::Failed => self.failed,
        }
    }

    fn add(&mut self, state: SegmentState, n: u64) {
        match state {
            SegmentState::Pending => self.pending += n,
            SegmentState::Encoded => self.encoded += n,
            SegmentState::Posted => self.posted += n,
            SegmentState::Verified => self.verified += n,
            SegmentState::Failed => self.failed += n,
        }
    }
}

impl fmt::Display for LedgerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pending={} encoded={} posted={} verified={} failed={}",
            self.pending, self.encoded, self.posted, self.verified, self.failed
        )
    }
}

fn join_groups(groups: &[String]) -> String {
    groups.join(",")
}

fn split_groups(groups: &str) -> Vec<String> {
    groups
        .split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
