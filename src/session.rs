//! Capability interface between the pool and concrete transports
//!
//! The pool and pipeline only ever see `Box<dyn NntpSession>`. [`NntpClient`]
//! is the production implementation (plain or TLS, optionally compressed);
//! tests substitute in-memory sessions through a custom [`SessionConnector`].

use crate::article::Article;
use crate::client::NntpClient;
use crate::commands::{GroupInfo, GroupList, XoverEntries};
use crate::config::ProviderConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Operations a pooled connection offers to workers
///
/// One command at a time: every method takes `&mut self`, so a session
/// cannot be driven by two callers at once.
#[async_trait]
pub trait NntpSession: Send {
    /// Select a newsgroup; repeated calls for the current group are free
    async fn join_group(&mut self, newsgroup: &str) -> Result<GroupInfo>;

    /// HEAD by message-id or article number
    async fn fetch_header(&mut self, id: &str) -> Result<Vec<String>>;

    /// BODY by message-id or article number, dot-stuffing removed
    async fn fetch_body(&mut self, id: &str) -> Result<Vec<u8>>;

    /// ARTICLE by message-id or article number
    async fn fetch_article(&mut self, id: &str) -> Result<Article>;

    /// STAT; `Ok(false)` when the server does not have the article
    async fn stat(&mut self, id: &str) -> Result<bool>;

    /// POST, returning the message-id the article was accepted under
    async fn post(&mut self, article: &Article) -> Result<String>;

    /// LIST ACTIVE with an optional prefix/substring filter
    async fn list_groups(&mut self, filter: Option<&str>) -> Result<GroupList>;

    /// XOVER over an inclusive article-number range
    async fn xover(&mut self, start: u64, end: u64) -> Result<XoverEntries>;

    /// QUIT and close
    async fn quit(&mut self) -> Result<()>;

    /// Whether the session must not be reused
    fn is_broken(&self) -> bool;

    /// Force the session out of rotation
    fn mark_broken(&mut self);
}

#[async_trait]
impl NntpSession for NntpClient {
    async fn join_group(&mut self, newsgroup: &str) -> Result<GroupInfo> {
        NntpClient::join_group(self, newsgroup).await
    }

    async fn fetch_header(&mut self, id: &str) -> Result<Vec<String>> {
        NntpClient::fetch_header(self, id).await
    }

    async fn fetch_body(&mut self, id: &str) -> Result<Vec<u8>> {
        NntpClient::fetch_body(self, id).await
    }

    async fn fetch_article(&mut self, id: &str) -> Result<Article> {
        NntpClient::fetch_article(self, id).await
    }

    async fn stat(&mut self, id: &str) -> Result<bool> {
        NntpClient::stat(self, id).await
    }

    async fn post(&mut self, article: &Article) -> Result<String> {
        NntpClient::post(self, article).await
    }

    async fn list_groups(&mut self, filter: Option<&str>) -> Result<GroupList> {
        NntpClient::list_groups(self, filter).await
    }

    async fn xover(&mut self, start: u64, end: u64) -> Result<XoverEntries> {
        NntpClient::xover(self, start, end).await
    }

    async fn quit(&mut self) -> Result<()> {
        NntpClient::quit(self).await
    }

    fn is_broken(&self) -> bool {
        NntpClient::is_broken(self)
    }

    fn mark_broken(&mut self) {
        NntpClient::mark_broken(self)
    }
}

/// Opens ready-to-use sessions for one provider
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Connect, authenticate and negotiate optional features
    async fn connect(&self, provider: &Arc<ProviderConfig>) -> Result<Box<dyn NntpSession>>;
}

/// Connector producing real [`NntpClient`] sessions over TCP or TLS
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl SessionConnector for TcpConnector {
    async fn connect(&self, provider: &Arc<ProviderConfig>) -> Result<Box<dyn NntpSession>> {
        let mut client = NntpClient::connect(provider.clone()).await?;

        if let (Some(user), Some(pass)) = (&provider.username, &provider.password) {
            client.authenticate(user, pass).await?;
        }

        // A refusal is logged by the client; only a dead transport aborts
        if provider.compression
            && let Err(e) = client.enable_compression().await
        {
            if client.is_broken() {
                return Err(e);
            }
            debug!("{}: header compression not negotiated: {}", provider.label(), e);
        }

        Ok(Box::new(client))
    }
}
