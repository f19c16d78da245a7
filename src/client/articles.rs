//! Article retrieval commands (RFC 3977 §6.2)
//!
//! - ARTICLE - full article (headers + body)
//! - HEAD - headers only
//! - BODY - body only, kept as raw bytes
//! - STAT - existence check without transfer
//!
//! Every command accepts a message-id or, after [`join_group`](NntpClient::join_group),
//! an article number. 430/423 map to [`NntpError::NoSuchArticle`].

use crate::article::{Article, parse_article};
use crate::response::{NntpBinaryResponse, NntpResponse, codes};
use crate::{NntpError, Result, commands};
use tracing::trace;

use super::NntpClient;

fn check(id: &str, response: NntpBinaryResponse, expected: u16) -> Result<NntpBinaryResponse> {
    if response.code == expected {
        return Ok(response);
    }
    Err(commands::article_error(
        id,
        NntpResponse {
            code: response.code,
            message: response.message,
            lines: Vec::new(),
        },
    ))
}

impl NntpClient {
    /// Fetch article headers as unparsed lines
    ///
    /// # Errors
    ///
    /// - [`NntpError::NoSuchArticle`] - the article does not exist
    /// - [`NntpError::Protocol`] - any other refusal
    pub async fn fetch_header(&mut self, id: &str) -> Result<Vec<String>> {
        trace!("Fetching head: {}", id);
        self.send_command(&commands::head(id)).await?;
        let response = self.read_multiline_response().await?;

        if response.code != codes::HEAD_FOLLOWS {
            return Err(commands::article_error(id, response));
        }
        Ok(response.lines)
    }

    /// Fetch the raw article body, one `\n` after every line
    ///
    /// Dot-stuffing is removed; the bytes are otherwise untouched so a
    /// yEnc payload can be decoded directly.
    pub async fn fetch_body(&mut self, id: &str) -> Result<Vec<u8>> {
        trace!("Fetching body: {}", id);
        self.send_command(&commands::body(id)).await?;
        let response = self.read_multiline_binary().await?;
        Ok(check(id, response, codes::BODY_FOLLOWS)?.data)
    }

    /// Fetch and parse a complete article
    pub async fn fetch_article(&mut self, id: &str) -> Result<Article> {
        trace!("Fetching article: {}", id);
        self.send_command(&commands::article(id)).await?;
        let response = self.read_multiline_binary().await?;
        let response = check(id, response, codes::ARTICLE_FOLLOWS)?;

        let mut article = parse_article(&response.data)?;
        if article.message_id.is_empty() && id.starts_with('<') {
            article.message_id = id.to_string();
        }
        Ok(article)
    }

    /// Check whether an article exists (RFC 3977 §6.2.4)
    ///
    /// Returns `Ok(false)` for 430/423 rather than an error.
    pub async fn stat(&mut self, id: &str) -> Result<bool> {
        trace!("Stat: {}", id);
        self.send_command(&commands::stat(id)).await?;
        let response = self.read_response().await?;
        commands::parse_stat_response(id, response)
    }
}
