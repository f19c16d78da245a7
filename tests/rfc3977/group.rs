//! RFC 3977 Section 6.1.1 - GROUP and Section 7.6.3 - LIST ACTIVE

use nntp_courier::commands::{self, ActiveGroup, GroupFilter};
use nntp_courier::{GroupList, NntpError, NntpResponse, codes};

#[test]
fn test_group_command_format() {
    assert_eq!(commands::group("misc.test"), "GROUP misc.test\r\n");
}

#[test]
fn test_group_response_fields() {
    // Example from Section 6.1.1.3
    let response = NntpResponse {
        code: codes::GROUP_SELECTED,
        message: "1234 3000234 3002322 misc.test".to_string(),
        lines: vec![],
    };
    let info = commands::parse_group_response("misc.test", response).unwrap();
    assert_eq!(info.count, 1234);
    assert_eq!(info.first, 3_000_234);
    assert_eq!(info.last, 3_002_322);
    assert_eq!(info.name, "misc.test");
}

#[test]
fn test_empty_group() {
    // An empty group may report last < first
    let response = NntpResponse {
        code: codes::GROUP_SELECTED,
        message: "0 4000 3999 example.currently.empty.newsgroup".to_string(),
        lines: vec![],
    };
    let info = commands::parse_group_response("example.currently.empty.newsgroup", response).unwrap();
    assert_eq!(info.count, 0);
    assert!(info.last < info.first);
}

#[test]
fn test_no_such_group() {
    let response = NntpResponse {
        code: codes::NO_SUCH_GROUP,
        message: "example.is.sob.bradner.or.barber is unknown".to_string(),
        lines: vec![],
    };
    let err = commands::parse_group_response("example.is.sob.bradner.or.barber", response)
        .unwrap_err();
    assert!(matches!(err, NntpError::Protocol { code: 411, .. }));
}

#[test]
fn test_list_active_command() {
    assert_eq!(commands::list_active(None), "LIST ACTIVE\r\n");
    assert_eq!(commands::list_active(Some("misc.*")), "LIST ACTIVE misc.*\r\n");
}

#[test]
fn test_list_active_lines() {
    // Example from Section 7.6.3
    let list = GroupList::new(
        vec![
            "misc.test 3002322 3000234 y".into(),
            "comp.risks 442001 441099 m".into(),
            "alt.rfc-writers.recovery 4 1 y".into(),
            "tx.natives.recovery 89 56 y".into(),
        ],
        None,
    );
    let groups: Vec<ActiveGroup> = list.iter().collect();
    assert_eq!(groups.len(), 4);
    assert_eq!(groups[0].high, 3_002_322);
    assert_eq!(groups[0].low, 3_000_234);
    assert_eq!(groups[1].status, "m");
    assert!(groups.iter().all(ActiveGroup::posting_allowed));
}

#[test]
fn test_list_active_filtered_by_prefix() {
    let list = GroupList::new(
        vec![
            "misc.test 3002322 3000234 y".into(),
            "alt.rfc-writers.recovery 4 1 y".into(),
            "tx.natives.recovery 89 56 n".into(),
        ],
        Some(GroupFilter::parse("misc.*")),
    );
    let names: Vec<String> = list.iter().map(|g| g.name).collect();
    assert_eq!(names, vec!["misc.test"]);
}
