//! Overview (XOVER) listings

use crate::error::{NntpError, Result};

pub fn xover(start: u64, end: u64) -> String {
    format!("XOVER {start}-{end}\r\n")
}

/// One overview line
///
/// Fields past `lines` (such as Xref) are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XoverEntry {
    pub article_number: u64,
    pub subject: String,
    /// The From header
    pub author: String,
    pub date: String,
    pub message_id: String,
    pub references: String,
    /// Zero when the server left it blank or garbled
    pub bytes: u64,
    pub lines: u64,
}

/// Split a tab-separated overview line
///
/// # Errors
///
/// [`NntpError::InvalidResponse`] for fewer than eight fields or a
/// non-numeric article number.
pub fn parse_xover_line(line: &str) -> Result<XoverEntry> {
    let invalid = || NntpError::InvalidResponse(line.to_string());
    let mut fields = line.split('\t');
    let mut text = || fields.next().map(str::to_string).ok_or_else(invalid);

    let article_number = text()?.parse().map_err(|_| invalid())?;
    let subject = text()?;
    let author = text()?;
    let date = text()?;
    let message_id = text()?;
    let references = text()?;
    let bytes = text()?.parse().unwrap_or_default();
    let lines = text()?.parse().unwrap_or_default();

    Ok(XoverEntry {
        article_number,
        subject,
        author,
        date,
        message_id,
        references,
        bytes,
        lines,
    })
}

/// XOVER reply lines, parsed one at a time as the caller iterates
#[derive(Debug)]
pub struct XoverEntries {
    lines: std::vec::IntoIter<String>,
}

impl XoverEntries {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines: lines.into_iter(),
        }
    }
}

impl Iterator for XoverEntries {
    type Item = Result<XoverEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.lines.next()?;
        Some(parse_xover_line(&line))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.lines.size_hint()
    }
}
