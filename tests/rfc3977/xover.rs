//! RFC 3977 Section 8.3 - OVER/XOVER Response Parsing Tests
//!
//! Tab-separated fields: article#, subject, from, date, message-id,
//! references, bytes, lines. Servers may append further fields.

use nntp_courier::XoverEntries;
use nntp_courier::commands::{parse_xover_line, xover};

#[test]
fn test_xover_command_range() {
    assert_eq!(xover(3000234, 3000240), "XOVER 3000234-3000240\r\n");
}

#[test]
fn test_xover_standard_8_fields() {
    let line = "3000234\tI am just a test article\t\"Demo User\" <nobody@example.com>\t6 Oct 1998 04:38:40 -0500\t<45223423@example.com>\t<45454@example.net>\t1234\t17";
    let entry = parse_xover_line(line).unwrap();

    assert_eq!(entry.article_number, 3_000_234);
    assert_eq!(entry.subject, "I am just a test article");
    assert_eq!(entry.author, "\"Demo User\" <nobody@example.com>");
    assert_eq!(entry.date, "6 Oct 1998 04:38:40 -0500");
    assert_eq!(entry.message_id, "<45223423@example.com>");
    assert_eq!(entry.references, "<45454@example.net>");
    assert_eq!(entry.bytes, 1234);
    assert_eq!(entry.lines, 17);
}

#[test]
fn test_xover_with_extra_fields() {
    let line = "12345\tSubject\tFrom\tDate\t<msgid>\t<refs>\t1000\t100\tXref: server group:12345";
    let entry = parse_xover_line(line).unwrap();
    assert_eq!(entry.article_number, 12345);
    assert_eq!(entry.lines, 100);
}

#[test]
fn test_xover_empty_references() {
    let entry = parse_xover_line("12345\tSubject\tFrom\tDate\t<msgid>\t\t1000\t100").unwrap();
    assert_eq!(entry.references, "");
}

#[test]
fn test_xover_unparsable_counts_default_to_zero() {
    let entry = parse_xover_line("7\tS\tF\tD\t<m>\t\t\t").unwrap();
    assert_eq!(entry.bytes, 0);
    assert_eq!(entry.lines, 0);
}

#[test]
fn test_xover_entries_skip_nothing() {
    let entries: Vec<_> = XoverEntries::new(vec![
        "1\ta\tb\tc\t<1@x>\t\t10\t1".into(),
        "2\ta\tb\tc\t<2@x>\t\t20\t2".into(),
    ])
    .collect();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(Result::is_ok));
}
