//! Primitive encoders/decoders
//!
//! Every decoder takes the full buffer plus a starting offset and returns the
//! value together with the offset just past it.

use crate::error::{Result, StoreError};

use super::CalendarDate;

/// Length prefix marking a null string
pub const NULL_STRING_LEN: u16 = 0xFFFF;

/// Longest encodable string, in UTF-8 bytes
pub const MAX_STRING_LEN: usize = 0xFFFE;

/// Tri-state boolean sentinels
pub const TRI_TRUE: u8 = b'V';
pub const TRI_FALSE: u8 = b'F';
pub const TRI_NULL: u8 = b'U';

/// Highest ordinal an enum member may have (stored as ordinal + 1 in one byte)
pub const MAX_ENUM_ORDINAL: usize = 254;

/// Size of an encoded present date: flag + year + month + day
const DATE_SIZE: usize = 1 + 4 + 1 + 1;

/// A decoded value and the offset of the first byte after it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded<T> {
    pub value: T,
    pub next_offset: usize,
}

impl<T> Decoded<T> {
    fn new(value: T, next_offset: usize) -> Self {
        Self { value, next_offset }
    }
}

/// Enumerations that can round-trip through the one-byte enum encoding
pub trait CodecEnum: Sized + Copy {
    /// Zero-based position of this member
    fn ordinal(self) -> usize;

    /// Member at the given position, if any
    fn from_ordinal(ordinal: usize) -> Option<Self>;
}

// =============================================================================
// Bounds Checking
// =============================================================================

fn require(buf: &[u8], offset: usize, needed: usize, what: &str) -> Result<()> {
    let available = buf.len().saturating_sub(offset);
    if offset > buf.len() || available < needed {
        return Err(StoreError::Decode(format!(
            "{}: need {} bytes at offset {}, buffer has {}",
            what,
            needed,
            offset,
            buf.len()
        )));
    }
    Ok(())
}

// =============================================================================
// Fixed-Width Integers
// =============================================================================

pub fn encode_u8(v: u8) -> [u8; 1] {
    [v]
}

pub fn decode_u8(buf: &[u8], offset: usize) -> Result<Decoded<u8>> {
    require(buf, offset, 1, "u8")?;
    Ok(Decoded::new(buf[offset], offset + 1))
}

pub fn encode_i16(v: i16) -> [u8; 2] {
    v.to_be_bytes()
}

pub fn decode_i16(buf: &[u8], offset: usize) -> Result<Decoded<i16>> {
    require(buf, offset, 2, "i16")?;
    let v = i16::from_be_bytes([buf[offset], buf[offset + 1]]);
    Ok(Decoded::new(v, offset + 2))
}

pub fn encode_i32(v: i32) -> [u8; 4] {
    v.to_be_bytes()
}

pub fn decode_i32(buf: &[u8], offset: usize) -> Result<Decoded<i32>> {
    require(buf, offset, 4, "i32")?;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    Ok(Decoded::new(i32::from_be_bytes(raw), offset + 4))
}

pub fn encode_u32(v: u32) -> [u8; 4] {
    v.to_be_bytes()
}

pub fn decode_u32(buf: &[u8], offset: usize) -> Result<Decoded<u32>> {
    require(buf, offset, 4, "u32")?;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    Ok(Decoded::new(u32::from_be_bytes(raw), offset + 4))
}

pub fn encode_i64(v: i64) -> [u8; 8] {
    v.to_be_bytes()
}

pub fn decode_i64(buf: &[u8], offset: usize) -> Result<Decoded<i64>> {
    require(buf, offset, 8, "i64")?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    Ok(Decoded::new(i64::from_be_bytes(raw), offset + 8))
}

pub fn encode_u64(v: u64) -> [u8; 8] {
    v.to_be_bytes()
}

pub fn decode_u64(buf: &[u8], offset: usize) -> Result<Decoded<u64>> {
    require(buf, offset, 8, "u64")?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    Ok(Decoded::new(u64::from_be_bytes(raw), offset + 8))
}

// =============================================================================
// Strings
// =============================================================================

/// Encode a nullable string as `len u16 + UTF-8 bytes`
///
/// Fails with `Capacity` if the UTF-8 form is longer than [`MAX_STRING_LEN`].
pub fn encode_string(v: Option<&str>) -> Result<Vec<u8>> {
    let s = match v {
        None => return Ok(NULL_STRING_LEN.to_be_bytes().to_vec()),
        Some(s) => s,
    };

    let data = s.as_bytes();
    if data.len() > MAX_STRING_LEN {
        return Err(StoreError::Capacity(format!(
            "string of {} bytes exceeds the {} byte limit",
            data.len(),
            MAX_STRING_LEN
        )));
    }

    let mut out = Vec::with_capacity(2 + data.len());
    out.extend_from_slice(&(data.len() as u16).to_be_bytes());
    out.extend_from_slice(data);
    Ok(out)
}

pub fn decode_string(buf: &[u8], offset: usize) -> Result<Decoded<Option<String>>> {
    require(buf, offset, 2, "string length")?;
    let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
    let start = offset + 2;

    if len == NULL_STRING_LEN {
        return Ok(Decoded::new(None, start));
    }

    let len = len as usize;
    require(buf, start, len, "string data")?;
    let s = std::str::from_utf8(&buf[start..start + len]).map_err(|e| {
        StoreError::Decode(format!("string at offset {} is not UTF-8: {}", offset, e))
    })?;

    Ok(Decoded::new(Some(s.to_string()), start + len))
}

// =============================================================================
// Booleans
// =============================================================================

pub fn encode_bool(v: bool) -> [u8; 1] {
    [if v { TRI_TRUE } else { TRI_FALSE }]
}

/// Decode a non-nullable boolean; the null sentinel is rejected
pub fn decode_bool(buf: &[u8], offset: usize) -> Result<Decoded<bool>> {
    let decoded = decode_tri_bool(buf, offset)?;
    match decoded.value {
        Some(v) => Ok(Decoded::new(v, decoded.next_offset)),
        None => Err(StoreError::Decode(format!(
            "null sentinel in non-nullable boolean at offset {}",
            offset
        ))),
    }
}

pub fn encode_tri_bool(v: Option<bool>) -> [u8; 1] {
    match v {
        Some(true) => [TRI_TRUE],
        Some(false) => [TRI_FALSE],
        None => [TRI_NULL],
    }
}

pub fn decode_tri_bool(buf: &[u8], offset: usize) -> Result<Decoded<Option<bool>>> {
    require(buf, offset, 1, "tri-bool")?;
    let value = match buf[offset] {
        TRI_TRUE => Some(true),
        TRI_FALSE => Some(false),
        TRI_NULL => None,
        other => {
            return Err(StoreError::Decode(format!(
                "invalid tri-bool byte 0x{:02x} at offset {}",
                other, offset
            )));
        }
    };
    Ok(Decoded::new(value, offset + 1))
}

// =============================================================================
// Enumerations
// =============================================================================

pub fn encode_enum<E: CodecEnum>(v: Option<E>) -> Result<[u8; 1]> {
    let e = match v {
        None => return Ok([0]),
        Some(e) => e,
    };

    let ordinal = e.ordinal();
    if ordinal > MAX_ENUM_ORDINAL {
        return Err(StoreError::Capacity(format!(
            "enum ordinal {} exceeds {}",
            ordinal, MAX_ENUM_ORDINAL
        )));
    }
    Ok([(ordinal + 1) as u8])
}

pub fn decode_enum<E: CodecEnum>(buf: &[u8], offset: usize) -> Result<Decoded<Option<E>>> {
    require(buf, offset, 1, "enum")?;
    let stored = buf[offset] as usize;
    if stored == 0 {
        return Ok(Decoded::new(None, offset + 1));
    }

    match E::from_ordinal(stored - 1) {
        Some(e) => Ok(Decoded::new(Some(e), offset + 1)),
        None => Err(StoreError::Decode(format!(
            "enum ordinal {} out of range at offset {}",
            stored - 1,
            offset
        ))),
    }
}

// =============================================================================
// Dates
// =============================================================================

pub fn encode_date(v: Option<CalendarDate>) -> Vec<u8> {
    let d = match v {
        None => return vec![0],
        Some(d) => d,
    };

    let mut out = Vec::with_capacity(DATE_SIZE);
    out.push(1);
    out.extend_from_slice(&d.year().to_be_bytes());
    out.push(d.month());
    out.push(d.day());
    out
}

pub fn decode_date(buf: &[u8], offset: usize) -> Result<Decoded<Option<CalendarDate>>> {
    require(buf, offset, 1, "date flag")?;
    match buf[offset] {
        0 => return Ok(Decoded::new(None, offset + 1)),
        1 => {}
        other => {
            return Err(StoreError::Decode(format!(
                "invalid date flag 0x{:02x} at offset {}",
                other, offset
            )));
        }
    }

    require(buf, offset, DATE_SIZE, "date")?;
    let year = decode_i32(buf, offset + 1)?.value;
    let month = buf[offset + 5];
    let day = buf[offset + 6];

    let date = CalendarDate::new(year, month, day).map_err(|_| {
        StoreError::Decode(format!(
            "invalid date {}-{:02}-{:02} at offset {}",
            year, month, day, offset
        ))
    })?;

    Ok(Decoded::new(Some(date), offset + DATE_SIZE))
}
