//! GROUP and LIST ACTIVE

use crate::error::{NntpError, Result};
use crate::response::NntpResponse;

pub fn group(newsgroup: &str) -> String {
    format!("GROUP {newsgroup}\r\n")
}

pub fn list_active(wildmat: Option<&str>) -> String {
    let pattern = wildmat.map(|w| format!(" {w}")).unwrap_or_default();
    format!("LIST ACTIVE{pattern}\r\n")
}

/// A selected group as reported by 211
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    pub name: String,
    /// Server's estimate, not an exact count
    pub count: u64,
    pub first: u64,
    pub last: u64,
}

/// Read `count first last [name]` out of a GROUP reply
///
/// The requested name stands in when the server omits it.
pub fn parse_group_response(name: &str, reply: NntpResponse) -> Result<GroupInfo> {
    if !reply.is_success() {
        return Err(NntpError::Protocol {
            code: reply.code,
            message: reply.message,
        });
    }

    let invalid = || NntpError::InvalidResponse(reply.message.clone());
    let mut words = reply.message.split_whitespace();
    let mut number = || -> Result<u64> {
        words.next().and_then(|w| w.parse().ok()).ok_or_else(invalid)
    };
    let (count, first, last) = (number()?, number()?, number()?);
    let name = words.next().unwrap_or(name).to_string();
    Ok(GroupInfo {
        name,
        count,
        first,
        last,
    })
}

/// One LIST ACTIVE line: `name high low status`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveGroup {
    pub name: String,
    pub high: u64,
    pub low: u64,
    /// `y`, `n`, `m` or a server-specific flag
    pub status: String,
}

impl ActiveGroup {
    /// `None` for lines with fewer than four fields
    pub fn parse(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split_whitespace().take(4).collect();
        let [name, high, low, status] = fields[..] else {
            return None;
        };
        Some(Self {
            name: name.to_string(),
            high: high.parse().unwrap_or_default(),
            low: low.parse().unwrap_or_default(),
            status: status.to_string(),
        })
    }

    /// Open for posting, moderated groups included
    pub fn posting_allowed(&self) -> bool {
        matches!(self.status.as_str(), "y" | "m")
    }
}

/// Filter applied to group listings
///
/// A pattern ending in `*` with no other wildcard is a prefix match and is
/// also sent to the server as a wildmat; any other text is matched as a
/// case-insensitive substring on the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupFilter {
    /// Names starting with the prefix
    Prefix(String),
    /// Names containing the needle
    Contains(String),
}

impl GroupFilter {
    /// Interpret a user-supplied filter string
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) if !prefix.contains(['*', '?', '[']) => {
                GroupFilter::Prefix(prefix.to_string())
            }
            _ => GroupFilter::Contains(pattern.trim_matches('*').to_lowercase()),
        }
    }

    /// Wildmat to hand to the server, if the filter can be expressed as one
    pub fn wildmat(&self) -> Option<String> {
        match self {
            GroupFilter::Prefix(prefix) => Some(format!("{prefix}*")),
            GroupFilter::Contains(_) => None,
        }
    }

    /// Client-side match
    pub fn matches(&self, name: &str) -> bool {
        match self {
            GroupFilter::Prefix(prefix) => name.starts_with(prefix.as_str()),
            GroupFilter::Contains(needle) => name.to_lowercase().contains(needle.as_str()),
        }
    }
}

/// LIST ACTIVE output, parsed and filtered each time it is iterated
#[derive(Debug, Clone, Default)]
pub struct GroupList {
    lines: Vec<String>,
    filter: Option<GroupFilter>,
}

impl GroupList {
    pub fn new(lines: Vec<String>, filter: Option<GroupFilter>) -> Self {
        Self { lines, filter }
    }

    /// Iterate matching groups from the start
    pub fn iter(&self) -> impl Iterator<Item = ActiveGroup> + '_ {
        self.lines
            .iter()
            .filter_map(|line| ActiveGroup::parse(line))
            .filter(|group| self.filter.as_ref().is_none_or(|f| f.matches(&group.name)))
    }

    /// Lines the server sent, before parsing and filtering
    pub fn raw_len(&self) -> usize {
        self.lines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_reply_fields() {
        let response = NntpResponse {
            code: 211,
            message: "3000 1 3000 alt.binaries.test".to_string(),
            lines: vec![],
        };

        let info = parse_group_response("alt.binaries.test", response).unwrap();
        assert_eq!(info.name, "alt.binaries.test");
        assert_eq!(info.count, 3000);
        assert_eq!(info.first, 1);
        assert_eq!(info.last, 3000);
    }

    #[test]
    fn test_group_reply_without_numbers() {
        let response = NntpResponse {
            code: 211,
            message: "lots of articles".to_string(),
            lines: vec![],
        };
        assert!(matches!(
            parse_group_response("g", response),
            Err(NntpError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!(
            GroupFilter::parse("alt.binaries.*"),
            GroupFilter::Prefix("alt.binaries.".into())
        );
        assert_eq!(
            GroupFilter::parse("*Linux*"),
            GroupFilter::Contains("linux".into())
        );
        assert_eq!(GroupFilter::parse("alt.binaries.*").wildmat().as_deref(), Some("alt.binaries.*"));
        assert!(GroupFilter::parse("linux").wildmat().is_none());
    }

    #[test]
    fn test_group_list_is_restartable() {
        let list = GroupList::new(
            vec![
                "alt.binaries.test 10 1 y".into(),
                "comp.os.linux 5 1 n".into(),
                "garbage".into(),
                "alt.linux.misc 3 1 m".into(),
            ],
            Some(GroupFilter::parse("linux")),
        );

        let first: Vec<_> = list.iter().map(|g| g.name).collect();
        let second: Vec<_> = list.iter().map(|g| g.name).collect();
        assert_eq!(first, vec!["comp.os.linux", "alt.linux.misc"]);
        assert_eq!(first, second);
        assert_eq!(list.raw_len(), 4);
    }

    #[test]
    fn test_active_group_posting_status() {
        let group = ActiveGroup::parse("alt.test 10 1 y").unwrap();
        assert!(group.posting_allowed());
        let group = ActiveGroup::parse("alt.test 10 1 n").unwrap();
        assert!(!group.posting_allowed());
    }
}
