//! Usenet article model
//!
//! Reference: https://datatracker.ietf.org/doc/html/rfc5536
//!
//! An [`Article`] is one NNTP transport unit: a handful of header fields
//! and a body of raw lines. Binary payloads travel as yEnc, so body lines
//! are kept as bytes rather than text.
//!
//! Segments are wrapped with [`Article::for_segment`]; fetched text is read
//! back with [`parse_article`]. [`ArticleBuilder`] covers hand-made posts.

mod builder;
mod parsing;
mod types;

pub use self::builder::ArticleBuilder;
pub use self::parsing::{parse_article, parse_headers, split_article};
pub use self::types::{Article, generate_message_id};
