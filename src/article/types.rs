//! Article type definitions

use crate::yenc::EncodedPart;
use crate::{NntpError, Result};

/// User-Agent header written on posted articles
pub(crate) const USER_AGENT: &str = concat!("nntp-courier/", env!("CARGO_PKG_VERSION"));

/// One article, either prepared for posting or fetched from a server
///
/// # Invariants
///
/// - `1 <= part <= total_parts`
/// - `newsgroups` is non-empty for articles that will be posted
///
/// # Examples
///
/// ```
/// use nntp_courier::article::ArticleBuilder;
///
/// let article = ArticleBuilder::new()
///     .subject("\"a.bin\" yEnc (1/2)")
///     .poster("poster <p@example.com>")
///     .newsgroup("alt.binaries.test")
///     .message_id("<part1@example.com>")
///     .body_line(b"=ybegin part=1 total=2 line=128 size=10 name=a.bin".to_vec())
///     .part(1, 2)
///     .declared_size(5)
///     .build()
///     .unwrap();
///
/// assert_eq!(article.part, 1);
/// assert!(article.serialize_for_posting().starts_with(b"From: poster <p@example.com>\r\n"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    /// Subject header
    pub subject: String,
    /// From header
    pub poster: String,
    /// Target newsgroups
    pub newsgroups: Vec<String>,
    /// Message-ID including angle brackets
    pub message_id: String,
    /// Date header in RFC 5322 form
    pub date: String,
    /// Headers beyond the fixed fields, in order
    pub extra_headers: Vec<(String, String)>,
    /// Body lines without terminators and without dot-stuffing
    pub body: Vec<Vec<u8>>,
    /// Raw byte count of the segment carried by the body
    pub declared_size: u64,
    /// 1-based part index
    pub part: u32,
    /// Total parts of the file this article belongs to
    pub total_parts: u32,
}

impl Article {
    /// Create an article with an empty body, enforcing the part invariant
    pub fn new(
        subject: impl Into<String>,
        poster: impl Into<String>,
        newsgroups: Vec<String>,
        message_id: impl Into<String>,
        part: u32,
        total_parts: u32,
    ) -> Result<Self> {
        let article = Self {
            subject: subject.into(),
            poster: poster.into(),
            newsgroups,
            message_id: message_id.into(),
            date: current_date(),
            extra_headers: Vec::new(),
            body: Vec::new(),
            declared_size: 0,
            part,
            total_parts,
        };
        article.validate()?;
        Ok(article)
    }

    /// Wrap one encoded segment as a postable article
    pub fn for_segment(
        encoded: &EncodedPart,
        subject: impl Into<String>,
        poster: impl Into<String>,
        newsgroups: Vec<String>,
        message_id: impl Into<String>,
    ) -> Result<Self> {
        let mut article = Self::new(
            subject,
            poster,
            newsgroups,
            message_id,
            encoded.part,
            encoded.total,
        )?;
        article.body = encoded.lines().map(<[u8]>::to_vec).collect();
        article.declared_size = encoded.length;
        Ok(article)
    }

    /// Check the part numbering invariant
    pub fn validate(&self) -> Result<()> {
        if self.part == 0 || self.part > self.total_parts {
            return Err(NntpError::InvalidArticle(format!(
                "part {} outside 1..={}",
                self.part, self.total_parts
            )));
        }
        Ok(())
    }

    /// Check the fields a server requires before posting
    pub fn validate_for_posting(&self) -> Result<()> {
        self.validate()?;
        if self.newsgroups.is_empty() {
            return Err(NntpError::InvalidArticle(
                "at least one newsgroup is required".to_string(),
            ));
        }
        if self.subject.trim().is_empty() || self.poster.trim().is_empty() {
            return Err(NntpError::InvalidArticle(
                "subject and poster are required".to_string(),
            ));
        }
        if !is_message_id(&self.message_id) {
            return Err(NntpError::InvalidArticle(format!(
                "malformed message-id {:?}",
                self.message_id
            )));
        }
        Ok(())
    }

    /// Render the conventional binary subject, e.g. `"file.bin" yEnc (1/3)`
    ///
    /// `{name}`, `{part}` and `{total}` in `template` are substituted.
    pub fn subject_for(template: &str, filename: &str, part: u32, total: u32) -> String {
        template
            .replace("{name}", filename)
            .replace("{part}", &part.to_string())
            .replace("{total}", &total.to_string())
    }

    /// Case-insensitive lookup among the extra headers
    pub fn header(&self, name: &str) -> Option<&str> {
        self.extra_headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body lines joined with CRLF
    pub fn body_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.iter().map(|l| l.len() + 2).sum());
        for line in &self.body {
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
        out
    }

    /// Serialize for POST: CRLF headers, blank line, dot-stuffed body
    ///
    /// The terminating `.` line is not included; the connection adds it.
    pub fn serialize_for_posting(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1024 + self.body.iter().map(|l| l.len() + 3).sum::<usize>());

        let mut header = |name: &str, value: &str| {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        };
        header("From", &self.poster);
        header("Newsgroups", &self.newsgroups.join(","));
        header("Subject", &self.subject);
        header("Message-ID", &self.message_id);
        header("Date", &self.date);
        if !self
            .extra_headers
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case("User-Agent"))
        {
            header("User-Agent", USER_AGENT);
        }
        for (name, value) in &self.extra_headers {
            header(name, value);
        }

        out.extend_from_slice(b"\r\n");

        for line in &self.body {
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
        out
    }
}

/// Fresh `<uuid@domain>` message-id
pub fn generate_message_id(domain: &str) -> String {
    format!("<{}@{}>", uuid::Uuid::new_v4().simple(), domain)
}

pub(crate) fn current_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S +0000")
        .to_string()
}

fn is_message_id(id: &str) -> bool {
    id.len() > 2
        && id.starts_with('<')
        && id.ends_with('>')
        && id.contains('@')
        && !id.contains(|c: char| c.is_whitespace())
}
