use crate::{NntpError, Result};

use super::types::{EncodedPart, PartSpec};
use super::{MAX_LINE_LENGTH, MIN_LINE_LENGTH};

/// Number of parts `len` bytes split into at `part_size` bytes per part
pub fn part_count(len: u64, part_size: u64) -> u32 {
    if len == 0 || part_size == 0 {
        return 0;
    }
    len.div_ceil(part_size) as u32
}

fn check_line_length(line_length: usize) -> Result<()> {
    if !(MIN_LINE_LENGTH..=MAX_LINE_LENGTH).contains(&line_length) {
        return Err(NntpError::Codec(format!(
            "invalid line length {line_length} (must be {MIN_LINE_LENGTH}-{MAX_LINE_LENGTH})"
        )));
    }
    Ok(())
}

/// Split `data` into `ceil(len / part_size)` encoded parts
///
/// Zero-length input yields no parts. The last part's trailer carries the
/// CRC32 of the whole input.
///
/// # Example
/// ```
/// use nntp_courier::yenc::{decode_verified, encode_parts};
///
/// let data = vec![7u8; 1300];
/// let parts = encode_parts(&data, 512, 128, "seven.bin").unwrap();
/// let sizes: Vec<u64> = parts.iter().map(|p| p.length).collect();
/// assert_eq!(sizes, vec![512, 512, 276]);
///
/// let second = decode_verified(&parts[1].body).unwrap();
/// assert_eq!(second.data, &data[512..1024]);
/// ```
pub fn encode_parts(
    data: &[u8],
    part_size: usize,
    line_length: usize,
    filename: &str,
) -> Result<Vec<EncodedPart>> {
    if part_size == 0 {
        return Err(NntpError::Codec("part size must be > 0".to_string()));
    }
    check_line_length(line_length)?;

    let total = part_count(data.len() as u64, part_size as u64);
    let file_crc32 = crc32fast::hash(data);

    data.chunks(part_size)
        .enumerate()
        .map(|(i, chunk)| {
            let spec = PartSpec {
                part: i as u32 + 1,
                total,
                offset: (i * part_size) as u64,
                file_size: data.len() as u64,
                file_crc32: Some(file_crc32),
            };
            encode_part(chunk, spec, line_length, filename)
        })
        .collect()
}

/// Encode one part of a file
///
/// A single-part file (`total == 1`) is written without `=ypart` and with
/// a plain `crc32=` trailer.
pub fn encode_part(
    data: &[u8],
    spec: PartSpec,
    line_length: usize,
    filename: &str,
) -> Result<EncodedPart> {
    check_line_length(line_length)?;
    if spec.part == 0 || spec.part > spec.total {
        return Err(NntpError::Codec(format!(
            "part {} outside 1..={}",
            spec.part, spec.total
        )));
    }

    let crc32 = crc32fast::hash(data);
    let length = data.len() as u64;
    let mut body = Vec::with_capacity(data.len() + data.len() / 32 + 256);

    if spec.total == 1 {
        body.extend_from_slice(
            format!(
                "=ybegin line={} size={} name={}\r\n",
                line_length, length, filename
            )
            .as_bytes(),
        );
    } else {
        body.extend_from_slice(
            format!(
                "=ybegin part={} total={} line={} size={} name={}\r\n",
                spec.part, spec.total, line_length, spec.file_size, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(
            format!(
                "=ypart begin={} end={}\r\n",
                spec.offset + 1,
                spec.offset + length
            )
            .as_bytes(),
        );
    }

    let mut writer = LineWriter::new(line_length, body);
    for &byte in data {
        writer.push(byte.wrapping_add(42))?;
    }
    let mut body = writer.finish()?;

    if spec.total == 1 {
        body.extend_from_slice(format!("=yend size={} crc32={:08x}\r\n", length, crc32).as_bytes());
    } else {
        let mut trailer = format!(
            "=yend size={} part={} pcrc32={:08x}",
            length, spec.part, crc32
        );
        if spec.part == spec.total
            && let Some(file_crc32) = spec.file_crc32
        {
            trailer.push_str(&format!(" crc32={:08x}", file_crc32));
        }
        trailer.push_str("\r\n");
        body.extend_from_slice(trailer.as_bytes());
    }

    Ok(EncodedPart {
        part: spec.part,
        total: spec.total,
        offset: spec.offset,
        length,
        crc32,
        body,
    })
}

/// Encode `data` as one single-part yEnc block
pub fn encode(data: &[u8], filename: &str, line_length: usize) -> Result<Vec<u8>> {
    let spec = PartSpec {
        part: 1,
        total: 1,
        offset: 0,
        file_size: data.len() as u64,
        file_crc32: None,
    };
    Ok(encode_part(data, spec, line_length, filename)?.body)
}

/// Bytes that are escaped wherever they appear
fn is_critical_byte(byte: u8) -> bool {
    matches!(byte, 0x00 | b'\n' | b'\r' | b'=')
}

fn is_edge_whitespace(byte: u8) -> bool {
    byte == b' ' || byte == b'\t'
}

/// Accumulates shifted bytes into lines no wider than `width`
struct LineWriter {
    width: usize,
    out: Vec<u8>,
    line: Vec<u8>,
}

impl LineWriter {
    fn new(width: usize, out: Vec<u8>) -> Self {
        Self {
            width,
            out,
            line: Vec::with_capacity(width),
        }
    }

    fn push(&mut self, encoded: u8) -> Result<()> {
        // Wrap first so `at_start` describes where the byte actually lands
        if self.line.len() >= self.width {
            self.end_line()?;
        }
        let at_start = self.line.is_empty();
        let fills_line = self.line.len() + 1 >= self.width;

        let escape = is_critical_byte(encoded)
            || (is_edge_whitespace(encoded) && (at_start || fills_line))
            || (encoded == b'.' && at_start);

        if escape {
            self.put(&[b'=', encoded.wrapping_add(64)])
        } else {
            self.put(&[encoded])
        }
    }

    fn put(&mut self, token: &[u8]) -> Result<()> {
        if self.line.len() + token.len() > self.width {
            self.end_line()?;
        }
        self.line.extend_from_slice(token);
        Ok(())
    }

    /// Emit the current line
    ///
    /// Raw whitespace at the end is escaped in place when the escape fits,
    /// otherwise it moves to the start of the next line.
    fn end_line(&mut self) -> Result<()> {
        // The second byte of an escape is never TAB or SPACE, so trailing
        // whitespace here is always raw.
        let mut carry = Vec::new();
        while let Some(&last) = self.line.last() {
            if !is_edge_whitespace(last) {
                break;
            }
            self.line.pop();
            if self.line.len() + 2 <= self.width {
                self.line.extend_from_slice(&[b'=', last.wrapping_add(64)]);
                break;
            }
            carry.push(last);
        }

        self.write_line()?;

        for byte in carry.into_iter().rev() {
            self.push(byte)?;
        }
        Ok(())
    }

    fn write_line(&mut self) -> Result<()> {
        if self.line.len() > self.width {
            return Err(NntpError::Codec(format!(
                "encoder produced a {}-byte line (limit {})",
                self.line.len(),
                self.width
            )));
        }
        if !self.line.is_empty() {
            self.out.extend_from_slice(&self.line);
            self.out.extend_from_slice(b"\r\n");
            self.line.clear();
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<u8>> {
        while !self.line.is_empty() {
            self.end_line()?;
        }
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::yenc::decode::{decode, decode_verified};

    fn data_lines(body: &[u8]) -> Vec<&[u8]> {
        body.split(|&b| b == b'\n')
            .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
            .filter(|l| !l.is_empty() && !l.starts_with(b"=y"))
            .collect()
    }

    #[test]
    fn test_encode_simple() {
        let encoded = encode(b"Test", "test.txt", 128).unwrap();

        assert!(encoded.starts_with(b"=ybegin line=128 size=4 name=test.txt\r\n"));
        let text = String::from_utf8_lossy(&encoded);
        assert!(text.contains(&format!("=yend size=4 crc32={:08x}", crc32fast::hash(b"Test"))));

        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded.data, b"Test");
        assert!(decoded.verify().is_ok());
    }

    #[test]
    fn test_zero_length_input_has_no_parts() {
        assert!(encode_parts(&[], 512, 128, "empty").unwrap().is_empty());
        assert_eq!(part_count(0, 512), 0);
    }

    #[test]
    fn test_part_sizes_and_offsets() {
        let data: Vec<u8> = (0..1300u32).map(|i| (i % 251) as u8).collect();
        let parts = encode_parts(&data, 512, 128, "f.bin").unwrap();

        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts.iter().map(|p| (p.offset, p.length)).collect::<Vec<_>>(),
            vec![(0, 512), (512, 512), (1024, 276)]
        );
        for part in &parts {
            let slice = &data[part.offset as usize..(part.offset + part.length) as usize];
            assert_eq!(part.crc32, crc32fast::hash(slice));
            assert_eq!(part.total, 3);
        }

        let first = String::from_utf8_lossy(&parts[0].body);
        assert!(first.starts_with("=ybegin part=1 total=3 line=128 size=1300 name=f.bin\r\n=ypart begin=1 end=512\r\n"));
        assert!(!first.contains(" crc32="));

        let last = String::from_utf8_lossy(&parts[2].body);
        assert!(last.contains("=ypart begin=1025 end=1300"));
        assert!(last.contains(&format!(" crc32={:08x}", crc32fast::hash(&data))));
    }

    #[test]
    fn test_critical_bytes_escaped() {
        // Raw values that shift onto NUL, LF, CR and '='
        let data = [214u8, 224, 227, 19];
        let encoded = encode(&data, "c.bin", 128).unwrap();
        let lines = data_lines(&encoded);
        assert_eq!(lines, vec![b"=@=J=M=}".as_slice()]);
        assert_eq!(decode_verified(&encoded).unwrap().data, data);
    }

    #[test]
    fn test_leading_dot_and_edge_whitespace_escaped() {
        // 4 -> '.', 246 -> ' ', 223 -> '\t'
        let data = [4u8, 4, 246, 65, 246];
        let encoded = encode(&data, "d.bin", 128).unwrap();
        let lines = data_lines(&encoded);
        assert_eq!(lines, vec![b"=n.\x20k=`".as_slice()]);
        assert_eq!(decode_verified(&encoded).unwrap().data, data);
    }

    #[test]
    fn test_lines_never_exceed_width() {
        let data: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        for width in [2usize, 3, 7, 64, 128, 997] {
            let encoded = encode(&data, "w.bin", width).unwrap();
            for line in data_lines(&encoded) {
                assert!(line.len() <= width, "width {width}: {} bytes", line.len());
                assert!(!line.starts_with(b" ") && !line.ends_with(b" "));
                assert!(!line.starts_with(b"\t") && !line.ends_with(b"\t"));
                assert!(!line.starts_with(b"."));
            }
            assert_eq!(decode_verified(&encoded).unwrap().data, data);
        }
    }

    #[test]
    fn test_whitespace_run_at_line_break() {
        // 246 shifts to SPACE: a run of spaces straddling the wrap point
        let data = vec![246u8; 40];
        let encoded = encode(&data, "s.bin", 5).unwrap();
        for line in data_lines(&encoded) {
            assert!(line.len() <= 5);
            assert!(!line.ends_with(b" ") && !line.starts_with(b" "));
        }
        assert_eq!(decode_verified(&encoded).unwrap().data, data);
    }

    #[test]
    fn test_dot_after_full_line_is_escaped() {
        // 55 -> 'a', 4 -> '.'
        let data = [55u8, 55, 55, 55, 4];
        let encoded = encode(&data, "d.bin", 4).unwrap();
        let lines = data_lines(&encoded);
        assert_eq!(lines, vec![&b"aaaa"[..], &b"=n"[..]]);
    }

    #[test]
    fn test_invalid_line_length() {
        assert!(matches!(encode(b"x", "x", 0), Err(NntpError::Codec(_))));
        assert!(matches!(encode(b"x", "x", 1), Err(NntpError::Codec(_))));
        assert!(matches!(encode(b"x", "x", 998), Err(NntpError::Codec(_))));
        assert!(encode(b"x", "x", 997).is_ok());
    }

    #[test]
    fn test_invalid_part_spec() {
        let spec = PartSpec {
            part: 3,
            total: 2,
            offset: 0,
            file_size: 1,
            file_crc32: None,
        };
        assert!(encode_part(b"x", spec, 128, "x").is_err());
    }
}
