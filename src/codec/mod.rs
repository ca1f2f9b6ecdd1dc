//! Codec Module
//!
//! The one byte layout shared by every record payload and file header.
//!
//! ## Primitive Layouts (all multi-byte values big-endian)
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────────────────┐
//! │ i16/i32/i64  │ 2 / 4 / 8 bytes, no null representation          │
//! ├──────────────┼──────────────────────────────────────────────────┤
//! │ string       │ len u16 + UTF-8 bytes                            │
//! │              │   0xFFFF = null, 0x0000 = "", max len 0xFFFE     │
//! ├──────────────┼──────────────────────────────────────────────────┤
//! │ bool         │ 1 byte: 'V' | 'F'                                │
//! │ tri-bool     │ 1 byte: 'V' | 'F' | 'U' (null)                   │
//! ├──────────────┼──────────────────────────────────────────────────┤
//! │ enum         │ 1 byte: 0 = null, otherwise ordinal + 1          │
//! ├──────────────┼──────────────────────────────────────────────────┤
//! │ date         │ flag u8 (0 = null) [+ year i32, month u8, day u8]│
//! └──────────────┴──────────────────────────────────────────────────┘
//! ```
//!
//! A record payload is the concatenation of these primitives in a fixed,
//! per-record-kind field order. [`PayloadBuilder`] and [`PayloadReader`]
//! compose them; the order of `put_*` calls must mirror the order of
//! `read_*` calls.

mod date;
mod payload;
mod primitives;

pub use date::CalendarDate;
pub use payload::{PayloadBuilder, PayloadReader};
pub use primitives::{
    decode_bool, decode_date, decode_enum, decode_i16, decode_i32, decode_i64, decode_string,
    decode_tri_bool, decode_u32, decode_u64, decode_u8, encode_bool, encode_date, encode_enum,
    encode_i16, encode_i32, encode_i64, encode_string, encode_tri_bool, encode_u32, encode_u64,
    encode_u8, CodecEnum, Decoded, MAX_ENUM_ORDINAL, MAX_STRING_LEN, NULL_STRING_LEN, TRI_FALSE,
    TRI_NULL, TRI_TRUE,
};
