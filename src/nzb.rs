//! NZB manifests
//!
//! A manifest lists, per source file, the groups it went to and the
//! message-id of every part. Generated documents carry parts in ascending
//! `number` order. Parsing skips elements and attributes it does not know,
//! so a `<file>` without `<groups>` or `<segments>` comes back with both
//! empty.
//!
//! Format: https://sabnzbd.org/wiki/extra/nzb-spec

use crate::{NntpError, Result};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::debug;

const NZB_NAMESPACE: &str = "http://www.newzbin.com/DTD/2003/nzb";
const PROLOGUE: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
    "<!DOCTYPE nzb PUBLIC \"-//newzBin//DTD NZB 1.1//EN\" ",
    "\"http://www.newzbin.com/DTD/nzb/nzb-1.1.dtd\">\n",
);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nzb {
    /// `<head>` entries keyed by their `type` attribute
    pub meta: BTreeMap<String, String>,
    pub files: Vec<NzbFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NzbFile {
    pub poster: String,
    /// Seconds since the epoch
    pub date: i64,
    pub subject: String,
    /// `filename` attribute; only some generators write it
    pub filename: Option<String>,
    /// `crc32` attribute over the whole file, hex
    pub crc32: Option<u32>,
    pub groups: Vec<String>,
    /// In document order, which need not be part order
    pub segments: Vec<NzbSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NzbSegment {
    /// Decoded size of the part
    pub bytes: u64,
    /// 1-based part number
    pub number: u32,
    pub crc32: Option<u32>,
    /// Stored without angle brackets, as the format writes it
    pub message_id: String,
}

impl NzbSegment {
    /// The id wrapped in brackets, ready for ARTICLE or BODY
    pub fn article_id(&self) -> String {
        format!("<{}>", bare_message_id(&self.message_id))
    }
}

/// `abc@host` from either `abc@host` or `<abc@host>`
pub fn bare_message_id(id: &str) -> &str {
    let trimmed = id.trim();
    match trimmed.strip_prefix('<').and_then(|rest| rest.strip_suffix('>')) {
        Some(inner) => inner,
        None => trimmed,
    }
}

impl NzbFile {
    pub fn total_bytes(&self) -> u64 {
        self.segments.iter().map(|s| s.bytes).sum()
    }

    /// Part count implied by the highest segment number
    pub fn total_parts(&self) -> u32 {
        self.segments.iter().map(|s| s.number).max().unwrap_or(0)
    }

    /// Numbers below the highest one that have no segment
    pub fn missing_segments(&self) -> Vec<u32> {
        let present: HashSet<u32> = self.segments.iter().map(|s| s.number).collect();
        (1..=self.total_parts()).filter(|n| !present.contains(n)).collect()
    }

    /// `filename` when present, otherwise the first quoted run in the subject
    pub fn file_name(&self) -> Option<String> {
        if let Some(name) = self.filename.as_deref().filter(|n| !n.is_empty()) {
            return Some(name.to_string());
        }
        let (_, after_quote) = self.subject.split_once('"')?;
        let (quoted, _) = after_quote.split_once('"')?;
        (!quoted.is_empty()).then(|| quoted.to_string())
    }

    /// One segment per number, lowest first
    pub fn ordered_segments(&self) -> Vec<&NzbSegment> {
        let mut ordered: Vec<&NzbSegment> = self.segments.iter().collect();
        ordered.sort_by_key(|s| s.number);
        ordered.dedup_by_key(|s| s.number);
        ordered
    }
}

fn xml_error(e: impl std::fmt::Display) -> NntpError {
    NntpError::Nzb(e.to_string())
}

fn hex(crc: u32) -> String {
    format!("{crc:08x}")
}

/// Indented element writer; attribute values and text are escaped
struct Emitter {
    writer: Writer<Vec<u8>>,
}

impl Emitter {
    fn emit(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).map_err(xml_error)
    }

    fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let mut start = BytesStart::new(name);
        for &attribute in attributes {
            start.push_attribute(attribute);
        }
        self.emit(Event::Start(start))
    }

    fn close(&mut self, name: &str) -> Result<()> {
        self.emit(Event::End(BytesEnd::new(name)))
    }

    fn leaf(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<()> {
        self.open(name, attributes)?;
        self.emit(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }

    fn file(&mut self, file: &NzbFile) -> Result<()> {
        let date = file.date.to_string();
        let crc = file.crc32.map(hex);
        let mut attributes = vec![
            ("poster", file.poster.as_str()),
            ("date", date.as_str()),
            ("subject", file.subject.as_str()),
        ];
        if let Some(name) = &file.filename {
            attributes.push(("filename", name.as_str()));
        }
        if let Some(crc) = &crc {
            attributes.push(("crc32", crc.as_str()));
        }
        self.open("file", &attributes)?;

        self.open("groups", &[])?;
        for group in &file.groups {
            self.leaf("group", &[], group)?;
        }
        self.close("groups")?;

        self.open("segments", &[])?;
        for segment in file.ordered_segments() {
            let bytes = segment.bytes.to_string();
            let number = segment.number.to_string();
            let crc = segment.crc32.map(hex);
            let mut attributes = vec![("bytes", bytes.as_str()), ("number", number.as_str())];
            if let Some(crc) = &crc {
                attributes.push(("crc32", crc.as_str()));
            }
            self.leaf("segment", &attributes, bare_message_id(&segment.message_id))?;
        }
        self.close("segments")?;
        self.close("file")
    }
}

impl Nzb {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(NzbFile::total_bytes).sum()
    }

    pub fn segment_count(&self) -> usize {
        self.files.iter().map(|f| f.segments.len()).sum()
    }

    /// Render the manifest with the NZB 1.1 doctype
    ///
    /// ```
    /// use nntp_courier::{Nzb, NzbFile, NzbSegment};
    ///
    /// let nzb = Nzb {
    ///     files: vec![NzbFile {
    ///         subject: "\"data.bin\" yEnc (1/1)".to_string(),
    ///         crc32: Some(0xdeadbeef),
    ///         groups: vec!["alt.binaries.test".to_string()],
    ///         segments: vec![NzbSegment {
    ///             bytes: 768000,
    ///             number: 1,
    ///             crc32: None,
    ///             message_id: "<part1@example.com>".to_string(),
    ///         }],
    ///         ..NzbFile::default()
    ///     }],
    ///     ..Nzb::default()
    /// };
    ///
    /// let xml = nzb.to_xml().unwrap();
    /// assert!(xml.contains("crc32=\"deadbeef\""));
    /// assert!(xml.contains(">part1@example.com</segment>"));
    /// ```
    pub fn to_xml(&self) -> Result<String> {
        let mut out = Emitter {
            writer: Writer::new_with_indent(Vec::new(), b' ', 2),
        };
        out.open("nzb", &[("xmlns", NZB_NAMESPACE)])?;
        if !self.meta.is_empty() {
            out.open("head", &[])?;
            for (kind, value) in &self.meta {
                out.leaf("meta", &[("type", kind.as_str())], value)?;
            }
            out.close("head")?;
        }
        for file in &self.files {
            out.file(file)?;
        }
        out.close("nzb")?;

        let body = String::from_utf8(out.writer.into_inner())?;
        Ok(format!("{PROLOGUE}{body}\n"))
    }

    /// Write to a sibling `.tmp` file, then rename over `path`
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        let xml = self.to_xml()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut staging = path.as_os_str().to_owned();
        staging.push(".tmp");
        tokio::fs::write(&staging, xml.as_bytes()).await?;
        tokio::fs::rename(&staging, path).await?;
        debug!("Manifest {} written, {} bytes", path.display(), xml.len());
        Ok(())
    }

    pub async fn read_from(path: &Path) -> Result<Nzb> {
        parse_nzb(&tokio::fs::read_to_string(path).await?)
    }
}

/// Accepts `deadbeef` and `0xDEADBEEF`
fn parse_crc(value: &str) -> Option<u32> {
    let value = value.trim();
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u32::from_str_radix(digits, 16).ok()
}

fn attribute_pairs(e: &BytesStart<'_>) -> Vec<(Vec<u8>, String)> {
    e.attributes()
        .flatten()
        .map(|attr| {
            let value = match attr.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
            };
            (attr.key.local_name().as_ref().to_vec(), value)
        })
        .collect()
}

fn number<T: std::str::FromStr>(value: &str) -> Option<T> {
    value.trim().parse().ok()
}

#[derive(Debug, Default)]
struct SegmentAttributes {
    bytes: u64,
    number: Option<u32>,
    crc32: Option<u32>,
}

/// Builds an [`Nzb`] from reader events, tracking the open element path
#[derive(Debug, Default)]
struct ManifestParser {
    nzb: Nzb,
    saw_root: bool,
    path: Vec<Vec<u8>>,
    text: String,
    meta_type: Option<String>,
    file: Option<NzbFile>,
    segment: Option<SegmentAttributes>,
}

impl ManifestParser {
    fn parent(&self) -> &[u8] {
        self.path.last().map(Vec::as_slice).unwrap_or_default()
    }

    fn start(&mut self, e: &BytesStart<'_>, empty: bool) {
        let local = e.local_name();
        let name = local.as_ref();
        self.text.clear();
        match name {
            b"nzb" => self.saw_root = true,
            b"meta" if !empty && self.parent() == b"head" => {
                self.meta_type = attribute_pairs(e)
                    .into_iter()
                    .find_map(|(key, value)| (key == b"type").then_some(value));
            }
            b"file" => {
                let file = file_attributes(e);
                if empty {
                    self.nzb.files.push(file);
                } else {
                    self.file = Some(file);
                }
            }
            b"segment" if !empty && self.parent() == b"segments" => {
                self.segment = Some(segment_attributes(e));
            }
            _ => {}
        }
        if !empty {
            self.path.push(name.to_vec());
        }
    }

    fn end(&mut self, name: &[u8]) {
        self.path.pop();
        let text = std::mem::take(&mut self.text);
        let text = text.trim();
        match name {
            b"meta" => {
                if let Some(kind) = self.meta_type.take().filter(|k| !k.is_empty()) {
                    self.nzb.meta.insert(kind, text.to_string());
                }
            }
            b"group" if self.parent() == b"groups" && !text.is_empty() => {
                if let Some(file) = self.file.as_mut() {
                    file.groups.push(text.to_string());
                }
            }
            b"segment" => {
                if let Some(segment) = self.segment.take() {
                    self.add_segment(segment, text);
                }
            }
            b"file" => {
                if let Some(file) = self.file.take() {
                    self.nzb.files.push(file);
                }
            }
            _ => {}
        }
    }

    fn add_segment(&mut self, attributes: SegmentAttributes, text: &str) {
        let id = bare_message_id(text);
        let (Some(file), Some(number)) = (self.file.as_mut(), attributes.number) else {
            debug!("Dropping NZB segment {:?} without a number", id);
            return;
        };
        if number == 0 || id.is_empty() {
            debug!("Dropping NZB segment {} of {:?}", number, file.subject);
            return;
        }
        file.segments.push(NzbSegment {
            bytes: attributes.bytes,
            number,
            crc32: attributes.crc32,
            message_id: id.to_string(),
        });
    }
}

fn file_attributes(e: &BytesStart<'_>) -> NzbFile {
    let mut file = NzbFile::default();
    for (key, value) in attribute_pairs(e) {
        match key.as_slice() {
            b"poster" => file.poster = value,
            b"date" => file.date = number(&value).unwrap_or_default(),
            b"subject" => file.subject = value,
            b"filename" => file.filename = Some(value),
            b"crc32" => file.crc32 = parse_crc(&value),
            _ => {}
        }
    }
    file
}

fn segment_attributes(e: &BytesStart<'_>) -> SegmentAttributes {
    let mut segment = SegmentAttributes::default();
    for (key, value) in attribute_pairs(e) {
        match key.as_slice() {
            b"bytes" => segment.bytes = number(&value).unwrap_or_default(),
            b"number" => segment.number = number(&value),
            b"crc32" => segment.crc32 = parse_crc(&value),
            _ => {}
        }
    }
    segment
}

/// Read an NZB document
///
/// # Errors
///
/// [`NntpError::Nzb`] when the XML is malformed or has no `<nzb>` root.
///
/// ```
/// use nntp_courier::parse_nzb;
///
/// let nzb = parse_nzb(r#"<nzb xmlns="http://www.newzbin.com/DTD/2003/nzb">
///   <file poster="p@example.com" date="1700000000" subject="&quot;a.bin&quot; yEnc (1/1)">
///     <groups><group>alt.binaries.test</group></groups>
///     <segments><segment bytes="512" number="1">one@example.com</segment></segments>
///   </file>
/// </nzb>"#).unwrap();
/// assert_eq!(nzb.files[0].file_name().as_deref(), Some("a.bin"));
/// assert_eq!(nzb.files[0].segments[0].article_id(), "<one@example.com>");
/// ```
pub fn parse_nzb(xml: &str) -> Result<Nzb> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut parser = ManifestParser::default();

    loop {
        let event = reader.read_event().map_err(|e| {
            NntpError::Nzb(format!("malformed XML at byte {}: {e}", reader.buffer_position()))
        })?;
        match event {
            Event::Start(e) => parser.start(&e, false),
            Event::Empty(e) => parser.start(&e, true),
            Event::Text(t) => match t.unescape() {
                Ok(text) => parser.text.push_str(&text),
                Err(_) => parser.text.push_str(&String::from_utf8_lossy(&t)),
            },
            Event::CData(t) => parser.text.push_str(&String::from_utf8_lossy(&t)),
            Event::End(e) => parser.end(e.local_name().as_ref()),
            Event::Eof => break,
            _ => {}
        }
    }

    if !parser.saw_root {
        return Err(NntpError::Nzb("no <nzb> root element".to_string()));
    }
    Ok(parser.nzb)
}
