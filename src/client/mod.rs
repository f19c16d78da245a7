//! One live NNTP session over TCP or TLS
//!
//! Every read is bounded by the provider's command timeout. A transport
//! failure or timeout marks the session broken; the pool then discards
//! it rather than lending it again.

mod articles;
mod auth;
mod compression;
mod connection;
mod group_ops;
mod io;
mod posting;

use crate::commands::GroupInfo;
use crate::config::ProviderConfig;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub(crate) trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// Where a session stands in the RFC 4643 exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Ready,
    /// USER sent, PASS outstanding
    InProgress,
    Authenticated,
    /// After QUIT or a transport failure
    Closed,
}

/// A session with one provider
///
/// Normally owned by the provider pool and driven through
/// [`NntpSession`](crate::session::NntpSession); it can also be used
/// directly:
///
/// ```no_run
/// use nntp_courier::{NntpClient, ProviderConfig};
/// use std::sync::Arc;
///
/// # async fn example() -> nntp_courier::Result<()> {
/// let provider = ProviderConfig::tls("news.example.com", "user", "pass");
/// let mut client = NntpClient::connect(Arc::new(provider)).await?;
/// client.authenticate("user", "pass").await?;
/// let group = client.join_group("alt.binaries.test").await?;
/// println!("{} articles", group.count);
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct NntpClient {
    stream: BufReader<Box<dyn AsyncStream>>,
    state: ConnectionState,
    provider: Arc<ProviderConfig>,
    current_group: Option<GroupInfo>,
    /// XFEATURE COMPRESS GZIP accepted
    headers_compressed: bool,
    /// Cleared by a 201 greeting
    posting_allowed: bool,
    wire_bytes: u64,
    inflated_bytes: u64,
    broken: bool,
}

impl NntpClient {
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// Keep the pool from lending this session again
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn current_group(&self) -> Option<&str> {
        self.current_group.as_ref().map(|g| g.name.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn posting_allowed(&self) -> bool {
        self.posting_allowed
    }
}
