//! Payload composition
//!
//! `PayloadBuilder` concatenates encoded primitives into a `bytes::BytesMut`;
//! `PayloadReader` walks a payload with a moving offset.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, StoreError};

use super::primitives::{
    decode_bool, decode_date, decode_enum, decode_i16, decode_i32, decode_i64, decode_string,
    decode_tri_bool, encode_bool, encode_date, encode_enum, encode_string, encode_tri_bool,
    CodecEnum, Decoded,
};
use super::CalendarDate;

/// Builds a record payload field by field
#[derive(Debug, Default)]
pub struct PayloadBuilder {
    buf: BytesMut,
}

impl PayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn put_i16(&mut self, v: i16) -> &mut Self {
        self.buf.put_i16(v);
        self
    }

    pub fn put_i32(&mut self, v: i32) -> &mut Self {
        self.buf.put_i32(v);
        self
    }

    pub fn put_i64(&mut self, v: i64) -> &mut Self {
        self.buf.put_i64(v);
        self
    }

    pub fn put_bool(&mut self, v: bool) -> &mut Self {
        self.buf.put_slice(&encode_bool(v));
        self
    }

    pub fn put_tri_bool(&mut self, v: Option<bool>) -> &mut Self {
        self.buf.put_slice(&encode_tri_bool(v));
        self
    }

    pub fn put_date(&mut self, v: Option<CalendarDate>) -> &mut Self {
        self.buf.put_slice(&encode_date(v));
        self
    }

    /// Fails with `Capacity` for strings longer than the 16-bit length budget
    pub fn put_str(&mut self, v: Option<&str>) -> Result<&mut Self> {
        let encoded = encode_string(v)?;
        self.buf.put_slice(&encoded);
        Ok(self)
    }

    /// Fails with `Capacity` for ordinals above 254
    pub fn put_enum<E: CodecEnum>(&mut self, v: Option<E>) -> Result<&mut Self> {
        self.buf.put_slice(&encode_enum(v)?);
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Reads fields back out of a payload, in the order they were written
#[derive(Debug)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    fn advance<T>(&mut self, decoded: Decoded<T>) -> T {
        self.offset = decoded.next_offset;
        decoded.value
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let d = decode_i16(self.buf, self.offset)?;
        Ok(self.advance(d))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let d = decode_i32(self.buf, self.offset)?;
        Ok(self.advance(d))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        let d = decode_i64(self.buf, self.offset)?;
        Ok(self.advance(d))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        let d = decode_bool(self.buf, self.offset)?;
        Ok(self.advance(d))
    }

    pub fn read_tri_bool(&mut self) -> Result<Option<bool>> {
        let d = decode_tri_bool(self.buf, self.offset)?;
        Ok(self.advance(d))
    }

    pub fn read_str(&mut self) -> Result<Option<String>> {
        let d = decode_string(self.buf, self.offset)?;
        Ok(self.advance(d))
    }

    pub fn read_enum<E: CodecEnum>(&mut self) -> Result<Option<E>> {
        let d = decode_enum::<E>(self.buf, self.offset)?;
        Ok(self.advance(d))
    }

    pub fn read_date(&mut self) -> Result<Option<CalendarDate>> {
        let d = decode_date(self.buf, self.offset)?;
        Ok(self.advance(d))
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.offset)
    }

    /// Fails if any bytes were left unread
    pub fn expect_end(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(StoreError::Decode(format!(
                "{} trailing bytes after offset {}",
                self.remaining(),
                self.offset
            )));
        }
        Ok(())
    }
}
