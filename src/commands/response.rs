//! Status line parsing

use crate::error::{NntpError, Result};

/// Split a status line into its code and text
///
/// The code is exactly three digits at the start of the line. Some servers
/// prefix a UTF-8 BOM or omit the space before the text; both are accepted.
pub fn parse_response_line(line: &str) -> Result<(u16, String)> {
    let line = line.trim_start_matches('\u{FEFF}');
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    let code = match digits {
        3 => line[..3].parse::<u16>().ok(),
        _ => None,
    }
    .ok_or_else(|| NntpError::InvalidResponse(line.chars().take(100).collect()))?;

    let text = &line[3..];
    Ok((code, text.strip_prefix(' ').unwrap_or(text).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_and_text() {
        assert_eq!(
            parse_response_line("240 article posted ok").unwrap(),
            (240, "article posted ok".to_string())
        );
        assert_eq!(parse_response_line("205").unwrap(), (205, String::new()));
    }

    #[test]
    fn test_lenient_prefixes() {
        assert_eq!(
            parse_response_line("\u{FEFF}200 welcome").unwrap(),
            (200, "welcome".to_string())
        );
        assert_eq!(parse_response_line("281ok").unwrap(), (281, "ok".to_string()));
    }

    #[test]
    fn test_rejects_bad_codes() {
        for line in ["", "20", "2000 too long", "x00 nope"] {
            assert!(
                matches!(parse_response_line(line), Err(NntpError::InvalidResponse(_))),
                "{line:?}"
            );
        }
    }
}
