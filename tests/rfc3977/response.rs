//! RFC 3977 Section 3.2 - Response Codes
//!
//! Every reply starts with a three-digit status code; the first digit
//! classifies the outcome.

use nntp_courier::commands::parse_response_line;
use nntp_courier::{NntpResponse, codes};

fn reply(code: u16) -> NntpResponse {
    NntpResponse {
        code,
        message: String::new(),
        lines: vec![],
    }
}

#[test]
fn test_status_line_with_message() {
    let (code, message) = parse_response_line("211 1234 3000234 3002322 misc.test").unwrap();
    assert_eq!(code, codes::GROUP_SELECTED);
    assert_eq!(message, "1234 3000234 3002322 misc.test");
}

#[test]
fn test_status_line_keeps_inner_spacing() {
    let (_, message) = parse_response_line("200  welcome  to  news").unwrap();
    assert_eq!(message, " welcome  to  news");
}

#[test]
fn test_code_must_be_three_digits() {
    for line in ["", "2", "20 ok", "2000 ok", "abc ok", " 200 ok"] {
        assert!(parse_response_line(line).is_err(), "accepted {line:?}");
    }
}

#[test]
fn test_success_classes() {
    assert!(reply(codes::READY_POSTING_ALLOWED).is_success());
    assert!(reply(codes::ARTICLE_POSTED).is_success());
    assert!(!reply(codes::SEND_ARTICLE).is_success());
    assert!(!reply(codes::NO_SUCH_ARTICLE_ID).is_success());
    assert!(!reply(codes::COMMAND_NOT_RECOGNIZED).is_success());
}

#[test]
fn test_posting_codes() {
    // Section 6.3.1: 340 invites the article, 240 confirms, 440/441 refuse
    assert_eq!(codes::SEND_ARTICLE, 340);
    assert_eq!(codes::ARTICLE_POSTED, 240);
    assert_eq!(codes::POSTING_NOT_PERMITTED, 440);
    assert_eq!(codes::POSTING_FAILED, 441);
}
