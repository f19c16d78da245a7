//! Article parsing functions
//!
//! Turns the text of a fetched article back into an [`Article`]. Header
//! values are decoded lossily; body lines stay raw bytes.

use super::types::Article;
use crate::yenc::params::{parse_ybegin, parse_yend, parse_ypart};
use crate::{NntpError, Result};

/// Split raw article bytes at the first blank line
///
/// Accepts CRLF or bare LF. Without a separator the whole input is headers.
pub fn split_article(raw: &[u8]) -> (&[u8], &[u8]) {
    if let Some(pos) = find(raw, b"\r\n\r\n") {
        return (&raw[..pos], &raw[pos + 4..]);
    }
    if let Some(pos) = find(raw, b"\n\n") {
        return (&raw[..pos], &raw[pos + 2..]);
    }
    if raw.starts_with(b"\r\n") {
        return (&raw[..0], &raw[2..]);
    }
    (raw, &raw[raw.len()..])
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parse header lines into ordered `(name, value)` pairs
///
/// Continuation lines (leading SPACE or TAB) are unfolded into the previous
/// value with a single space. Lines without a colon are skipped.
pub fn parse_headers(text: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = headers.last_mut() {
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    headers
}

/// Parse a fetched article
///
/// Subject, From, Newsgroups, Message-ID and Date populate the fixed
/// fields; everything else lands in `extra_headers`. When the body holds a
/// yEnc payload its part numbering and size fill `part`, `total_parts` and
/// `declared_size`; otherwise the article is part 1 of 1 and the declared
/// size is the body length.
pub fn parse_article(raw: &[u8]) -> Result<Article> {
    let (header_bytes, body_bytes) = split_article(raw);
    let header_text = String::from_utf8_lossy(header_bytes);
    let headers = parse_headers(&header_text);
    if headers.is_empty() && !header_bytes.is_empty() {
        return Err(NntpError::InvalidArticle(
            "article has no parseable headers".to_string(),
        ));
    }

    let body: Vec<Vec<u8>> = if body_bytes.is_empty() {
        Vec::new()
    } else {
        let trimmed = body_bytes.strip_suffix(b"\n").unwrap_or(body_bytes);
        trimmed
            .split(|&b| b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line).to_vec())
            .collect()
    };

    let mut article = Article {
        subject: String::new(),
        poster: String::new(),
        newsgroups: Vec::new(),
        message_id: String::new(),
        date: String::new(),
        extra_headers: Vec::new(),
        body,
        declared_size: 0,
        part: 1,
        total_parts: 1,
    };

    for (name, value) in headers {
        match name.to_ascii_lowercase().as_str() {
            "subject" => article.subject = value,
            "from" => article.poster = value,
            "message-id" => article.message_id = value,
            "date" => article.date = value,
            "newsgroups" => {
                article.newsgroups = value
                    .split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            _ => article.extra_headers.push((name, value)),
        }
    }

    let (part, total, size) = yenc_numbering(&article.body)?;
    article.part = part;
    article.total_parts = total;
    article.declared_size =
        size.unwrap_or_else(|| article.body.iter().map(|l| l.len() as u64).sum());

    article.validate()?;
    Ok(article)
}

/// Part, total and raw size declared by a yEnc payload in `body`
fn yenc_numbering(body: &[Vec<u8>]) -> Result<(u32, u32, Option<u64>)> {
    let mut numbering = (1, 1, None);
    let control = |line: &[u8]| -> Result<String> {
        String::from_utf8(line.to_vec())
            .map_err(|_| NntpError::InvalidArticle("non-ASCII yEnc control line".to_string()))
    };

    for line in body {
        if line.starts_with(b"=ybegin ") {
            let header = parse_ybegin(&control(line)?)?;
            numbering = (
                header.part.unwrap_or(1),
                header.total.unwrap_or(1),
                Some(header.size),
            );
        } else if line.starts_with(b"=ypart ") {
            let part = parse_ypart(&control(line)?)?;
            numbering.2 = Some(part.len());
        } else if line.starts_with(b"=yend") {
            let trailer = parse_yend(&control(line)?)?;
            numbering.2 = Some(trailer.size);
            break;
        }
    }
    Ok(numbering)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yenc::encode_parts;

    #[test]
    fn test_split_article() {
        let (h, b) = split_article(b"Subject: x\r\n\r\nbody\r\n");
        assert_eq!(h, b"Subject: x");
        assert_eq!(b, b"body\r\n");

        let (h, b) = split_article(b"Subject: x\n\nbody\n");
        assert_eq!(h, b"Subject: x");
        assert_eq!(b, b"body\n");

        let (h, b) = split_article(b"Subject: x");
        assert_eq!(h, b"Subject: x");
        assert!(b.is_empty());
    }

    #[test]
    fn test_parse_headers_unfolds() {
        let headers = parse_headers("Subject: long\r\n  continued\r\nX-Custom: v\r\n");
        assert_eq!(
            headers,
            vec![
                ("Subject".to_string(), "long continued".to_string()),
                ("X-Custom".to_string(), "v".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_text_article() {
        let raw = b"From: a@b\r\nNewsgroups: g.one, g.two\r\nSubject: hi\r\nMessage-ID: <1@b>\r\nPath: x!y\r\n\r\nline one\r\nline two\r\n";
        let article = parse_article(raw).unwrap();
        assert_eq!(article.poster, "a@b");
        assert_eq!(article.newsgroups, vec!["g.one", "g.two"]);
        assert_eq!(article.message_id, "<1@b>");
        assert_eq!(article.header("path"), Some("x!y"));
        assert_eq!(article.body, vec![b"line one".to_vec(), b"line two".to_vec()]);
        assert_eq!((article.part, article.total_parts), (1, 1));
        assert_eq!(article.declared_size, 16);
    }

    #[test]
    fn test_parse_yenc_article_numbering() {
        let data = vec![9u8; 1300];
        let parts = encode_parts(&data, 512, 128, "n.bin").unwrap();
        let mut raw = b"Subject: \"n.bin\" yEnc (3/3)\r\nMessage-ID: <p3@x>\r\n\r\n".to_vec();
        raw.extend_from_slice(&parts[2].body);

        let article = parse_article(&raw).unwrap();
        assert_eq!(article.part, 3);
        assert_eq!(article.total_parts, 3);
        assert_eq!(article.declared_size, 276);
        assert_eq!(article.body_bytes(), parts[2].body);
    }

    #[test]
    fn test_bad_yenc_numbering_rejected() {
        let raw = b"Subject: s\r\n\r\n=ybegin part=4 total=3 line=128 size=9 name=a\r\n=ypart begin=1 end=3\r\nklm\r\n=yend size=3\r\n";
        assert!(parse_article(raw).is_err());
    }

    #[test]
    fn test_garbage_headers_rejected() {
        assert!(matches!(
            parse_article(b"no colon anywhere\r\n\r\nbody"),
            Err(NntpError::InvalidArticle(_))
        ));
    }
}
