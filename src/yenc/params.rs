//! Parsers for the =ybegin, =ypart and =yend control lines

use crate::{NntpError, Result};
use std::collections::HashMap;

use super::types::{YencEnd, YencHeader, YencPart};

fn missing(key: &str, line: &str) -> NntpError {
    NntpError::Codec(format!("missing '{key}' in: {line}"))
}

fn number<T: std::str::FromStr>(params: &HashMap<&str, &str>, key: &str, line: &str) -> Result<T> {
    params
        .get(key)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| missing(key, line))
}

fn optional<T: std::str::FromStr>(params: &HashMap<&str, &str>, key: &str) -> Option<T> {
    params.get(key).and_then(|s| s.parse().ok())
}

fn hex(params: &HashMap<&str, &str>, key: &str) -> Option<u32> {
    params
        .get(key)
        .and_then(|s| u32::from_str_radix(s.trim(), 16).ok())
}

/// Parse yEnc =ybegin header line
///
/// Format: =ybegin [part=1 total=5] line=128 size=123456 name=file name.bin
pub fn parse_ybegin(line: &str) -> Result<YencHeader> {
    let rest = line
        .strip_prefix("=ybegin ")
        .ok_or_else(|| NntpError::Codec(format!("invalid yEnc header: {line}")))?;

    let params = parse_yenc_params(rest);

    Ok(YencHeader {
        line: number(&params, "line", line)?,
        size: number(&params, "size", line)?,
        name: params
            .get("name")
            .map(|s| s.to_string())
            .ok_or_else(|| missing("name", line))?,
        part: optional(&params, "part"),
        total: optional(&params, "total"),
    })
}

/// Parse yEnc =ypart line
///
/// Format: =ypart begin=1 end=123456
pub fn parse_ypart(line: &str) -> Result<YencPart> {
    let rest = line
        .strip_prefix("=ypart ")
        .ok_or_else(|| NntpError::Codec(format!("invalid yEnc part header: {line}")))?;

    let params = parse_yenc_params(rest);
    let begin: u64 = number(&params, "begin", line)?;
    let end: u64 = number(&params, "end", line)?;
    if begin == 0 || end + 1 < begin {
        return Err(NntpError::Codec(format!("invalid part range: {line}")));
    }

    Ok(YencPart { begin, end })
}

/// Parse yEnc =yend line
///
/// Format: =yend size=123456 [part=1] [pcrc32=87654321] [crc32=12345678]
pub fn parse_yend(line: &str) -> Result<YencEnd> {
    let rest = line
        .strip_prefix("=yend ")
        .ok_or_else(|| NntpError::Codec(format!("invalid yEnc trailer: {line}")))?;

    let params = parse_yenc_params(rest);

    Ok(YencEnd {
        size: number(&params, "size", line)?,
        part: optional(&params, "part"),
        crc32: hex(&params, "crc32"),
        pcrc32: hex(&params, "pcrc32"),
    })
}

/// Split `key=value` pairs; `name` swallows the rest of the line
fn parse_yenc_params(params: &str) -> HashMap<&str, &str> {
    let mut result = HashMap::new();
    let mut rest = params.trim_start();

    while !rest.is_empty() {
        let Some((key, after)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim();

        if key == "name" {
            result.insert(key, after.trim_end());
            break;
        }

        let (value, tail) = after.split_once(' ').unwrap_or((after, ""));
        result.insert(key, value);
        rest = tail.trim_start();
    }

    result
}
