use crate::{NntpError, Result};

use super::params::{parse_ybegin, parse_yend, parse_ypart};
use super::types::YencDecoded;

/// Decode one yEnc payload
///
/// Lines before `=ybegin` (article headers, blank lines) are skipped. Line
/// endings may be LF or CRLF. The CRC32 is computed but not checked; see
/// [`decode_verified`].
///
/// # Example
/// ```
/// use nntp_courier::yenc::{decode, encode};
///
/// let encoded = encode(b"Hello", "hello.txt", 128).unwrap();
/// let decoded = decode(&encoded).unwrap();
/// assert_eq!(decoded.data, b"Hello");
/// assert_eq!(decoded.header.name, "hello.txt");
/// ```
pub fn decode(input: &[u8]) -> Result<YencDecoded> {
    let mut lines = input
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line));

    let header_line = lines
        .by_ref()
        .find(|line| line.starts_with(b"=ybegin "))
        .ok_or_else(|| NntpError::Codec("missing =ybegin line".to_string()))?;
    let header = parse_ybegin(control_line(header_line)?)?;

    let mut part = None;
    let mut trailer = None;
    let mut data = Vec::with_capacity(header.size.min(16 * 1024 * 1024) as usize);

    for line in lines.by_ref() {
        if line.starts_with(b"=ypart ") {
            if part.is_some() || !data.is_empty() {
                return Err(NntpError::Codec("unexpected =ypart line".to_string()));
            }
            part = Some(parse_ypart(control_line(line)?)?);
        } else if line.starts_with(b"=yend") {
            trailer = Some(parse_yend(control_line(line)?)?);
            break;
        } else {
            decode_line(line, &mut data)?;
        }
    }

    let trailer = trailer.ok_or_else(|| NntpError::Codec("missing =yend line".to_string()))?;
    if header.part.is_some() && part.is_none() {
        return Err(NntpError::Codec(format!(
            "{}: multi-part header without =ypart",
            header.name
        )));
    }

    let calculated_crc32 = crc32fast::hash(&data);
    Ok(YencDecoded {
        header,
        part,
        trailer,
        data,
        calculated_crc32,
    })
}

/// Decode and check the declared CRC32 and size
///
/// Returns [`NntpError::ChecksumMismatch`] when the bytes differ from what
/// the sender declared.
pub fn decode_verified(input: &[u8]) -> Result<YencDecoded> {
    let decoded = decode(input)?;
    decoded.verify()?;
    Ok(decoded)
}

fn control_line(line: &[u8]) -> Result<&str> {
    std::str::from_utf8(line).map_err(|_| NntpError::Codec("non-ASCII yEnc control line".to_string()))
}

/// Reverse the +42 shift; `=X` escapes subtract a further 64
fn decode_line(line: &[u8], out: &mut Vec<u8>) -> Result<()> {
    let mut bytes = line.iter();
    while let Some(&byte) = bytes.next() {
        if byte == b'=' {
            let &escaped = bytes
                .next()
                .ok_or_else(|| NntpError::Codec("escape at end of line".to_string()))?;
            out.push(escaped.wrapping_sub(64).wrapping_sub(42));
        } else {
            out.push(byte.wrapping_sub(42));
        }
    }
    Ok(())
}
