use crate::{NntpError, Result};

/// yEnc header from =ybegin line
#[derive(Debug, Clone, PartialEq)]
pub struct YencHeader {
    /// Line length (typically 128, max 997)
    pub line: usize,
    /// Total file size in bytes
    pub size: u64,
    /// Original filename
    pub name: String,
    /// Part number (for multi-part files)
    pub part: Option<u32>,
    /// Total number of parts (for multi-part files)
    pub total: Option<u32>,
}

/// yEnc part header from =ypart line
///
/// `begin` and `end` are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct YencPart {
    /// First byte of this part in the original file
    pub begin: u64,
    /// Last byte of this part in the original file
    pub end: u64,
}

impl YencPart {
    /// Zero-based offset of the first byte
    pub fn offset(&self) -> u64 {
        self.begin.saturating_sub(1)
    }

    /// Number of bytes covered
    pub fn len(&self) -> u64 {
        (self.end + 1).saturating_sub(self.begin)
    }

    /// True when the range covers no bytes
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// yEnc trailer from =yend line
#[derive(Debug, Clone, PartialEq)]
pub struct YencEnd {
    /// Size of decoded data in bytes
    pub size: u64,
    /// Part number echoed in the trailer
    pub part: Option<u32>,
    /// Whole-file CRC32 (single-part files, or the last part of a multi-part file)
    pub crc32: Option<u32>,
    /// CRC32 of this part only
    pub pcrc32: Option<u32>,
}

/// Decoded yEnc payload with its declared metadata
#[derive(Debug, Clone)]
pub struct YencDecoded {
    /// Parsed header information
    pub header: YencHeader,
    /// Part information (for multi-part files)
    pub part: Option<YencPart>,
    /// Trailer information
    pub trailer: YencEnd,
    /// Decoded binary data
    pub data: Vec<u8>,
    /// CRC32 computed over `data`
    pub calculated_crc32: u32,
}

impl YencDecoded {
    /// CRC32 the sender declared for exactly these bytes
    ///
    /// For a multi-part payload only `pcrc32` describes the part; the
    /// trailer's `crc32` there covers the whole file.
    pub fn declared_crc32(&self) -> Option<u32> {
        match self.part {
            Some(_) => self.trailer.pcrc32,
            None => self.trailer.crc32.or(self.trailer.pcrc32),
        }
    }

    /// Whole-file CRC32, when this payload carries it
    pub fn file_crc32(&self) -> Option<u32> {
        match self.part {
            Some(_) => self.trailer.crc32,
            None => self.trailer.crc32.or(self.trailer.pcrc32),
        }
    }

    /// Compare the declared CRC32 and size with the recovered bytes
    pub fn verify(&self) -> Result<()> {
        let expected = self.declared_crc32().ok_or_else(|| {
            NntpError::Codec(format!("{}: trailer declares no CRC32", self.header.name))
        })?;
        if expected != self.calculated_crc32 {
            return Err(NntpError::ChecksumMismatch {
                expected,
                actual: self.calculated_crc32,
            });
        }
        if self.trailer.size != self.data.len() as u64 {
            return Err(NntpError::Codec(format!(
                "{}: trailer size {} but decoded {} bytes",
                self.header.name,
                self.trailer.size,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Part number, treating a single-part payload as part 1 of 1
    pub fn part_number(&self) -> u32 {
        self.header.part.unwrap_or(1)
    }

    /// Total parts, treating a single-part payload as 1
    pub fn total_parts(&self) -> u32 {
        self.header.total.unwrap_or(1)
    }

    /// Zero-based offset of these bytes in the original file
    pub fn offset(&self) -> u64 {
        self.part.as_ref().map_or(0, YencPart::offset)
    }
}

/// Placement of one part inside its file, used when encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpec {
    /// 1-based part number
    pub part: u32,
    /// Total number of parts
    pub total: u32,
    /// Zero-based offset of the part in the file
    pub offset: u64,
    /// Size of the whole file
    pub file_size: u64,
    /// Whole-file CRC32, written into the last part's trailer
    pub file_crc32: Option<u32>,
}

/// One encoded part ready to become an article body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPart {
    /// 1-based part number
    pub part: u32,
    /// Total number of parts
    pub total: u32,
    /// Zero-based offset of the part in the file
    pub offset: u64,
    /// Raw byte count of the part
    pub length: u64,
    /// CRC32 of the raw part bytes
    pub crc32: u32,
    /// =ybegin ... =yend text, CRLF line endings
    pub body: Vec<u8>,
}

impl EncodedPart {
    /// 1-based position of the first byte, as written in `=ypart begin=`
    pub fn begin(&self) -> u64 {
        self.offset + 1
    }

    /// 1-based position of the last byte, as written in `=ypart end=`
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    /// Body lines without terminators
    pub fn lines(&self) -> impl Iterator<Item = &[u8]> {
        self.body
            .split(|&b| b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .filter(|line| !line.is_empty())
    }
}
