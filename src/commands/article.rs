//! ARTICLE, HEAD, BODY and STAT
//!
//! `id` is either a message-id in angle brackets or an article number in
//! the selected group.

use crate::error::{NntpError, Result};
use crate::response::{NntpResponse, codes};

fn request(verb: &str, id: &str) -> String {
    format!("{verb} {id}\r\n")
}

pub fn article(id: &str) -> String {
    request("ARTICLE", id)
}

pub fn head(id: &str) -> String {
    request("HEAD", id)
}

pub fn body(id: &str) -> String {
    request("BODY", id)
}

pub fn stat(id: &str) -> String {
    request("STAT", id)
}

fn is_absent(code: u16) -> bool {
    matches!(code, codes::NO_SUCH_ARTICLE_ID | codes::NO_SUCH_ARTICLE_NUMBER)
}

/// Error for a refused retrieval
///
/// 430 and 423 mean the article is not there and become
/// [`NntpError::NoSuchArticle`]; other codes are kept for the caller.
pub fn article_error(id: &str, reply: NntpResponse) -> NntpError {
    if is_absent(reply.code) {
        return NntpError::NoSuchArticle(id.to_string());
    }
    NntpError::Protocol {
        code: reply.code,
        message: reply.message,
    }
}

/// Whether a STAT reply says the article exists
pub fn parse_stat_response(id: &str, reply: NntpResponse) -> Result<bool> {
    match reply.code {
        codes::ARTICLE_STAT => Ok(true),
        code if is_absent(code) => Ok(false),
        _ => Err(article_error(id, reply)),
    }
}
