use super::types::{Article, current_date, generate_message_id};
use crate::Result;

/// Fluent construction of an [`Article`] to post
///
/// Unset fields default as follows: Date is now, the Message-ID is a fresh
/// one under the poster's mail domain, and the declared size is the body
/// length. `build` applies the same checks as posting.
#[must_use]
#[derive(Debug, Clone)]
pub struct ArticleBuilder {
    draft: Article,
    sized: bool,
}

impl Default for ArticleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArticleBuilder {
    pub fn new() -> Self {
        Self {
            draft: Article {
                subject: String::new(),
                poster: String::new(),
                newsgroups: Vec::new(),
                message_id: String::new(),
                date: current_date(),
                extra_headers: Vec::new(),
                body: Vec::new(),
                declared_size: 0,
                part: 1,
                total_parts: 1,
            },
            sized: false,
        }
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.draft.subject = subject.into();
        self
    }

    pub fn poster(mut self, poster: impl Into<String>) -> Self {
        self.draft.poster = poster.into();
        self
    }

    /// Replaces any groups added so far
    pub fn newsgroups<I, S>(mut self, newsgroups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.draft.newsgroups = newsgroups.into_iter().map(Into::into).collect();
        self
    }

    pub fn newsgroup(mut self, newsgroup: impl Into<String>) -> Self {
        self.draft.newsgroups.push(newsgroup.into());
        self
    }

    pub fn message_id(mut self, message_id: impl Into<String>) -> Self {
        self.draft.message_id = message_id.into();
        self
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.draft.date = date.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.draft.extra_headers.push((name.into(), value.into()));
        self
    }

    /// One body line, unstuffed and without its terminator
    pub fn body_line(mut self, line: Vec<u8>) -> Self {
        self.draft.body.push(line);
        self
    }

    /// Raw size of the segment the body encodes
    pub fn declared_size(mut self, size: u64) -> Self {
        self.draft.declared_size = size;
        self.sized = true;
        self
    }

    pub fn part(mut self, part: u32, total_parts: u32) -> Self {
        self.draft.part = part;
        self.draft.total_parts = total_parts;
        self
    }

    pub fn build(self) -> Result<Article> {
        let mut article = self.draft;
        if article.message_id.is_empty() {
            article.message_id = generate_message_id(mail_domain(&article.poster));
        }
        if !self.sized {
            article.declared_size = article.body.iter().map(|l| l.len() as u64).sum();
        }
        article.validate_for_posting()?;
        Ok(article)
    }
}

/// `example.org` out of `Name <user@example.org>`
fn mail_domain(poster: &str) -> &str {
    poster
        .rsplit_once('@')
        .map(|(_, rest)| rest.trim_end_matches('>').trim())
        .filter(|d| !d.is_empty())
        .unwrap_or("localhost")
}
