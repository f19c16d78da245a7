//! Resumable Usenet binary posting and retrieval
//!
//! `nntp-courier` splits files into yEnc-encoded articles, posts them
//! through a pool of NNTP providers with priority failover and per-provider
//! connection caps, and records every segment in a SQLite ledger so an
//! interrupted job resumes where it stopped. Finished jobs produce an NZB
//! manifest, which the same engine can download back from.
//!
//! The moving parts:
//!
//! - [`NntpClient`]: one connection (plain or TLS, optional compression)
//! - [`ProviderPool`]: lends sessions from the highest-priority provider
//!   with spare capacity and cools down failing providers
//! - [`Ledger`]: durable per-segment state machine
//! - [`Pipeline`]: stage, upload, verify, cleanup and download phases
//!
//! # Example
//!
//! ```no_run
//! use nntp_courier::{
//!     Ledger, Pipeline, PipelineConfig, PoolConfig, ProviderConfig, ProviderPool, TcpConnector,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn example() -> nntp_courier::Result<()> {
//! let providers = vec![
//!     ProviderConfig::tls("news.example.com", "user", "pass").with_max_connections(20),
//!     ProviderConfig::tls("backup.example.net", "user", "pass").with_priority(1),
//! ];
//! let pool = ProviderPool::new(providers, PoolConfig::default(), Arc::new(TcpConnector))?;
//! let ledger = Ledger::open(Path::new("courier.db")).await?;
//! let pipeline = Pipeline::new(pool, ledger, PipelineConfig::default())?;
//!
//! let groups = vec!["alt.binaries.test".to_string()];
//! let reports = pipeline
//!     .run_all("holiday", Path::new("/data/holiday.mkv"), &groups)
//!     .await?;
//! for report in &reports {
//!     println!("{report}");
//! }
//! # Ok(())
//! # }
//! ```

/// Usenet article model
pub mod article;
mod client;
/// NNTP command builders and response parsers
pub mod commands;
mod config;
mod error;
/// Persistent segment ledger
pub mod ledger;
/// NZB manifest parser and generator
pub mod nzb;
/// Job phases over the pool and the ledger
pub mod pipeline;
mod pool;
mod provider;
mod response;
mod session;
/// yEnc binary encoding/decoding for Usenet
pub mod yenc;

pub use article::{Article, ArticleBuilder, generate_message_id, parse_article};
pub use client::{ConnectionState, NntpClient};
pub use commands::{GroupInfo, GroupList, XoverEntries, XoverEntry};
pub use config::{CooldownConfig, EngineConfig, PipelineConfig, PoolConfig, ProviderConfig};
pub use error::{IsRetryable, NntpError, Result};
pub use ledger::{
    FileMetadata, FileRecord, JobRecord, JobState, Ledger, LedgerStats, NewJob, NewSegment, Phase,
    SegmentKey, SegmentOutcome, SegmentRow, SegmentState,
};
pub use nzb::{Nzb, NzbFile, NzbSegment, parse_nzb};
pub use pipeline::{DownloadReport, DownloadedFile, FailedDownload, PhaseReport, Pipeline};
pub use pool::{PooledSession, ProviderPool, SessionManager};
pub use provider::{ProviderHealth, ProviderStats};
pub use response::{NntpBinaryResponse, NntpResponse, codes};
pub use session::{NntpSession, SessionConnector, TcpConnector};
pub use yenc::{
    EncodedPart, YencDecoded, YencMultipartAssembler, decode as yenc_decode,
    encode as yenc_encode, encode_parts,
};
