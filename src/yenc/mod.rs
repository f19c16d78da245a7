//! yEnc binary encoding/decoding for Usenet
//!
//! Every raw byte is shifted by 42 modulo 256; results that collide with
//! NUL, LF, CR or `=` are written as `=` followed by the byte plus 64.
//! TAB and SPACE are escaped at either edge of a line and `.` at the start
//! of a line so that transports which trim whitespace or apply
//! dot-stuffing cannot alter the payload.
//!
//! Each part carries the CRC32 of its original bytes in `pcrc32=`; the
//! final part of a multi-part file also carries the whole-file `crc32=`.
//!
//! Reference: http://www.yenc.org/yenc-draft.1.3.txt

pub mod assembler;
pub mod decode;
pub mod encode;
pub mod params;
pub mod types;

pub use assembler::YencMultipartAssembler;
pub use decode::{decode, decode_verified};
pub use encode::{encode, encode_part, encode_parts, part_count};
pub use types::{EncodedPart, PartSpec, YencDecoded, YencEnd, YencHeader, YencPart};

/// Default output line width
pub const DEFAULT_LINE_LENGTH: usize = 128;

/// Narrowest line that still fits a two-byte escape sequence
pub const MIN_LINE_LENGTH: usize = 2;

/// Widest line allowed by the yEnc draft
pub const MAX_LINE_LENGTH: usize = 997;
