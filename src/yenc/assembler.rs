use crate::{NntpError, Result};
use std::collections::BTreeMap;

use super::types::YencDecoded;

/// Reassembles a file from its decoded yEnc parts
///
/// Parts may arrive in any order. Each part is CRC-checked on entry and
/// placed at the offset its `=ypart` line declares. A single-part payload
/// counts as part 1 of 1.
///
/// # Example
/// ```
/// use nntp_courier::yenc::{decode, encode_parts, YencMultipartAssembler};
///
/// let data: Vec<u8> = (0..1300u32).map(|i| i as u8).collect();
/// let parts = encode_parts(&data, 512, 128, "file.bin").unwrap();
///
/// let mut assembler = YencMultipartAssembler::new();
/// for part in parts.iter().rev() {
///     assembler.add_part(decode(&part.body).unwrap()).unwrap();
/// }
/// assert_eq!(assembler.assemble().unwrap(), data);
/// ```
#[derive(Debug, Clone, Default)]
pub struct YencMultipartAssembler {
    total_parts: Option<u32>,
    total_size: Option<u64>,
    filename: Option<String>,
    expected_crc32: Option<u32>,
    parts: BTreeMap<u32, YencDecoded>,
}

impl YencMultipartAssembler {
    /// Create an empty assembler; the part count is learned from the first part
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an assembler that already knows how many parts to expect
    ///
    /// Useful when the part count comes from a manifest and some parts may
    /// never arrive.
    pub fn expecting(total_parts: u32) -> Self {
        Self {
            total_parts: Some(total_parts),
            ..Self::default()
        }
    }

    /// Check the whole file against `crc32` even if no trailer carries it
    pub fn with_file_crc32(mut self, crc32: u32) -> Self {
        self.expected_crc32 = Some(crc32);
        self
    }

    /// Verify a decoded part and store it
    ///
    /// # Errors
    /// - [`NntpError::ChecksumMismatch`] when the part's bytes fail its CRC
    /// - [`NntpError::Codec`] for inconsistent metadata, duplicates or overlaps
    pub fn add_part(&mut self, decoded: YencDecoded) -> Result<()> {
        decoded.verify()?;

        let part_num = decoded.part_number();
        let total = decoded.total_parts();

        match self.total_parts {
            Some(expected) if expected != total => {
                return Err(NntpError::Codec(format!(
                    "part {part_num} declares {total} parts, expected {expected}"
                )));
            }
            _ => self.total_parts = Some(total),
        }
        if part_num == 0 || part_num > total {
            return Err(NntpError::Codec(format!(
                "part number {part_num} outside 1..={total}"
            )));
        }

        match &self.filename {
            Some(name) if name != &decoded.header.name => {
                return Err(NntpError::Codec(format!(
                    "part {part_num} names {}, expected {name}",
                    decoded.header.name
                )));
            }
            Some(_) => {}
            None => self.filename = Some(decoded.header.name.clone()),
        }

        let file_size = decoded.header.size;
        match self.total_size {
            Some(size) if size != file_size => {
                return Err(NntpError::Codec(format!(
                    "part {part_num} declares file size {file_size}, expected {size}"
                )));
            }
            _ => self.total_size = Some(file_size),
        }

        let start = decoded.offset();
        let end = start + decoded.data.len() as u64;
        if end > file_size {
            return Err(NntpError::Codec(format!(
                "part {part_num} ends at {end}, past file size {file_size}"
            )));
        }

        if self.parts.contains_key(&part_num) {
            return Err(NntpError::Codec(format!("part {part_num} already added")));
        }
        for (other_num, other) in &self.parts {
            let other_start = other.offset();
            let other_end = other_start + other.data.len() as u64;
            if start < other_end && other_start < end {
                return Err(NntpError::Codec(format!(
                    "part {part_num} ({start}..{end}) overlaps part {other_num} ({other_start}..{other_end})"
                )));
            }
        }

        if self.expected_crc32.is_none() {
            self.expected_crc32 = decoded.file_crc32();
        }

        self.parts.insert(part_num, decoded);
        Ok(())
    }

    /// True once every expected part is present
    pub fn is_complete(&self) -> bool {
        self.total_parts
            .is_some_and(|total| self.parts.len() == total as usize)
    }

    /// Number of parts received so far
    pub fn parts_received(&self) -> usize {
        self.parts.len()
    }

    /// Expected part count, if known
    pub fn total_parts(&self) -> Option<u32> {
        self.total_parts
    }

    /// Filename declared by the parts
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// 1-based numbers of the parts not yet received
    pub fn missing_parts(&self) -> Vec<u32> {
        match self.total_parts {
            Some(total) => (1..=total).filter(|n| !self.parts.contains_key(n)).collect(),
            None => Vec::new(),
        }
    }

    /// Concatenate the parts and verify the whole-file CRC32 when one is known
    ///
    /// # Errors
    /// - [`NntpError::IncompleteTransfer`] naming every missing part
    /// - [`NntpError::ChecksumMismatch`] when the reassembled file fails its CRC
    pub fn assemble(&self) -> Result<Vec<u8>> {
        let missing = self.missing_parts();
        if !missing.is_empty() || self.total_parts.is_none() {
            return Err(NntpError::IncompleteTransfer { missing });
        }

        let size = self.total_size.unwrap_or(0) as usize;
        let mut data = vec![0u8; size];
        let mut covered = 0usize;
        for part in self.parts.values() {
            let start = part.offset() as usize;
            data[start..start + part.data.len()].copy_from_slice(&part.data);
            covered += part.data.len();
        }
        if covered != size {
            return Err(NntpError::Codec(format!(
                "parts cover {covered} of {size} bytes"
            )));
        }

        if let Some(expected) = self.expected_crc32 {
            let actual = crc32fast::hash(&data);
            if actual != expected {
                return Err(NntpError::ChecksumMismatch { expected, actual });
            }
        }
        Ok(data)
    }
}
