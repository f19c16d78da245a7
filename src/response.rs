//! Server replies as the client sees them

/// A status line plus, for multi-line replies, the decoded text block
#[derive(Debug, Clone)]
pub struct NntpResponse {
    pub code: u16,
    /// Status text after the code
    pub message: String,
    /// Text block with dot-stuffing removed; empty for one-line replies
    pub lines: Vec<String>,
}

impl NntpResponse {
    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// A multi-line reply whose block stays as bytes
///
/// yEnc bodies are not UTF-8. `data` holds every unstuffed line followed
/// by a single `\n`.
#[derive(Debug, Clone)]
pub struct NntpBinaryResponse {
    pub code: u16,
    pub message: String,
    pub data: Vec<u8>,
}

impl NntpBinaryResponse {
    /// Block lines without the trailing `\n`
    pub fn lines(&self) -> impl Iterator<Item = &[u8]> {
        let empty = self.data.is_empty();
        let data = self.data.strip_suffix(b"\n").unwrap_or(&self.data[..]);
        data.split(|&b| b == b'\n').filter(move |_| !empty)
    }
}

/// Status codes the engine acts on
pub mod codes {
    // Greeting and session
    pub const READY_POSTING_ALLOWED: u16 = 200;
    pub const READY_NO_POSTING: u16 = 201;
    pub const XFEATURE_ENABLED: u16 = 290;

    // AUTHINFO
    pub const AUTH_ACCEPTED: u16 = 281;
    pub const AUTH_CONTINUE: u16 = 381;
    pub const AUTH_REJECTED: u16 = 481;
    pub const AUTH_OUT_OF_SEQUENCE: u16 = 482;

    // Groups and listings
    pub const GROUP_SELECTED: u16 = 211;
    pub const LIST_INFORMATION_FOLLOWS: u16 = 215;
    pub const OVERVIEW_INFO_FOLLOWS: u16 = 224;
    pub const NO_SUCH_GROUP: u16 = 411;
    pub const NO_GROUP_SELECTED: u16 = 412;

    // Article retrieval
    pub const ARTICLE_FOLLOWS: u16 = 220;
    pub const HEAD_FOLLOWS: u16 = 221;
    pub const BODY_FOLLOWS: u16 = 222;
    pub const ARTICLE_STAT: u16 = 223;
    /// Article number not in the selected group
    pub const NO_SUCH_ARTICLE_NUMBER: u16 = 423;
    /// Message-id unknown to the server
    pub const NO_SUCH_ARTICLE_ID: u16 = 430;

    // POST
    pub const SEND_ARTICLE: u16 = 340;
    pub const ARTICLE_POSTED: u16 = 240;
    pub const POSTING_NOT_PERMITTED: u16 = 440;
    pub const POSTING_FAILED: u16 = 441;

    // Refusals of the command itself
    pub const COMMAND_NOT_RECOGNIZED: u16 = 500;
    pub const ACCESS_DENIED: u16 = 502;
}
