//! RFC 3977 Section 6.2.4 - STAT Command Tests
//!
//! STAT checks article existence without transferring the article.

use nntp_courier::{NntpError, NntpResponse, codes, commands};

fn reply(code: u16, message: &str) -> NntpResponse {
    NntpResponse {
        code,
        message: message.to_string(),
        lines: vec![],
    }
}

#[test]
fn test_stat_command_format_with_message_id() {
    let cmd = commands::stat("<abc123@example.com>");
    assert_eq!(cmd, "STAT <abc123@example.com>\r\n");
    assert_eq!(cmd.matches("\r\n").count(), 1);
}

#[test]
fn test_stat_command_format_with_number() {
    assert_eq!(commands::stat("12345"), "STAT 12345\r\n");
}

#[test]
fn test_stat_223_means_present() {
    // Queried by message-id, the article number may be 0
    let present =
        commands::parse_stat_response("<xyz@test.com>", reply(codes::ARTICLE_STAT, "0 <xyz@test.com>"))
            .unwrap();
    assert!(present);
}

#[test]
fn test_stat_430_and_423_mean_absent() {
    assert!(
        !commands::parse_stat_response("<gone@test>", reply(codes::NO_SUCH_ARTICLE_ID, "No such article"))
            .unwrap()
    );
    assert!(
        !commands::parse_stat_response("42", reply(codes::NO_SUCH_ARTICLE_NUMBER, "No article with that number"))
            .unwrap()
    );
}

#[test]
fn test_stat_other_codes_are_errors() {
    let err = commands::parse_stat_response("<a@b>", reply(codes::NO_GROUP_SELECTED, "No group"))
        .unwrap_err();
    assert!(matches!(err, NntpError::Protocol { code: 412, .. }));
}

#[test]
fn test_body_and_head_builders() {
    assert_eq!(commands::head("<a@b>"), "HEAD <a@b>\r\n");
    assert_eq!(commands::body("<a@b>"), "BODY <a@b>\r\n");
    assert_eq!(commands::article("<a@b>"), "ARTICLE <a@b>\r\n");
}
