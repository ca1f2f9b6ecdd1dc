//! Entity contract
//!
//! What a record type must provide for [`Table`](crate::table::Table) to
//! store it: a key scheme, a fixed field order through the codec, and (for
//! natural-key types) the string the key is derived from.

use crate::codec::{PayloadBuilder, PayloadReader};
use crate::error::Result;

/// How a table assigns index keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScheme {
    /// Surrogate ids handed out by the record store's `next_id` counter
    Sequential,
    /// Integer hash of a normalized natural key string
    NaturalKey,
}

/// A record type stored in a [`Table`](crate::table::Table)
pub trait Entity: Sized {
    const KEY_SCHEME: KeyScheme;

    /// Index key; meaningful once the entity has been created
    fn key(&self) -> i64;

    fn set_key(&mut self, key: i64);

    /// The natural key string, for `KeyScheme::NaturalKey` types
    fn natural_key(&self) -> Option<&str> {
        None
    }

    /// Index key for a natural key string
    ///
    /// Different strings may collide; tables resolve collisions by
    /// comparing normalized natural keys.
    fn derive_key(natural: &str) -> i64 {
        natural_key_hash(natural)
    }

    /// Write every field, in the type's fixed order
    fn encode(&self, out: &mut PayloadBuilder) -> Result<()>;

    /// Read the fields back in the same order
    fn decode(key: i64, input: &mut PayloadReader<'_>) -> Result<Self>;
}

/// How a caller names the entity to read or delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Id(i64),
    Natural(&'a str),
}

impl From<i64> for Lookup<'_> {
    fn from(id: i64) -> Self {
        Lookup::Id(id)
    }
}

impl<'a> From<&'a str> for Lookup<'a> {
    fn from(natural: &'a str) -> Self {
        Lookup::Natural(natural)
    }
}

/// Keep only alphanumerics, lowercased: `"123.456.789-00"` becomes `"12345678900"`
pub fn normalize(natural: &str) -> String {
    natural
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// CRC32 of the normalized key, widened to `i64`
pub fn natural_key_hash(natural: &str) -> i64 {
    crc32fast::hash(normalize(natural).as_bytes()) as i64
}

/// Whether two natural keys name the same entity
pub fn same_natural_key(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}
