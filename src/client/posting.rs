use crate::article::Article;
use crate::commands;
use crate::response::codes;
use crate::{NntpError, Result};
use tracing::debug;

use super::NntpClient;

impl NntpClient {
    /// Post an article (RFC 3977 §6.3.1)
    ///
    /// 1. Client sends POST; the server answers 340 (send it) or 440
    /// 2. Client sends the dot-stuffed article and the terminating `.`
    /// 3. Server answers 240 (posted) or 441 (rejected)
    ///
    /// Returns the article's message-id.
    ///
    /// # Errors
    ///
    /// - [`NntpError::PostRejected`] - 440/441, or the greeting was 201
    /// - [`NntpError::InvalidArticle`] - required fields missing; nothing is sent
    /// - [`NntpError::TransientIo`] - connection dropped mid-transfer
    pub async fn post(&mut self, article: &Article) -> Result<String> {
        if !self.posting_allowed {
            return Err(NntpError::PostRejected(format!(
                "{} does not allow posting",
                self.provider.label()
            )));
        }
        article.validate_for_posting()?;
        debug!("Posting article {}", article.message_id);

        self.send_command(commands::post()).await?;
        let response = self.read_response().await?;
        match response.code {
            codes::SEND_ARTICLE => {}
            codes::POSTING_NOT_PERMITTED => {
                return Err(NntpError::PostRejected(format!(
                    "{} {}",
                    response.code, response.message
                )));
            }
            code => {
                return Err(NntpError::Protocol {
                    code,
                    message: response.message,
                });
            }
        }

        let mut text = article.serialize_for_posting();
        text.extend_from_slice(b".\r\n");
        self.send_bytes(&text).await?;

        let response = self.read_response().await?;
        match response.code {
            codes::ARTICLE_POSTED => {
                debug!("Article {} posted", article.message_id);
                Ok(article.message_id.clone())
            }
            codes::POSTING_FAILED => Err(NntpError::PostRejected(format!(
                "{} {}",
                response.code, response.message
            ))),
            code => Err(NntpError::Protocol {
                code,
                message: response.message,
            }),
        }
    }
}
