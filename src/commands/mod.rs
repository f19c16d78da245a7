//! Command lines sent by the client and parsers for the replies it reads
//!
//! Builders return the full line including CRLF so the client can write
//! them unchanged.

pub mod article;
pub mod group;
pub mod over;
pub mod response;

pub use article::*;
pub use group::*;
pub use over::*;
pub use response::*;

pub fn authinfo_user(username: &str) -> String {
    format!("AUTHINFO USER {username}\r\n")
}

pub fn authinfo_pass(password: &str) -> String {
    format!("AUTHINFO PASS {password}\r\n")
}

/// Ask for headers-only compression; replies flagged `[COMPRESS=GZIP]`
/// then carry their block as one zlib stream
pub fn xfeature_compress_gzip() -> &'static str {
    "XFEATURE COMPRESS GZIP\r\n"
}

pub fn quit() -> &'static str {
    "QUIT\r\n"
}

/// Opens a post; the article follows the 340 reply and ends with `.`
pub fn post() -> &'static str {
    "POST\r\n"
}

/// Command line as it may appear in logs, password masked
pub(crate) fn redact(command: &str) -> &str {
    match command.strip_prefix("AUTHINFO PASS") {
        Some(_) => "AUTHINFO PASS ****",
        None => command.trim_end(),
    }
}
