//! Record identity types.
//!
//! `CacheKey` is what a resolver hands back for an object; `CacheReference` is
//! the pointer stored inside a record field when that object was promoted to a
//! record of its own.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const SERIALIZATION_PREFIX: &str = "ApolloCacheReference{";
const SERIALIZATION_SUFFIX: &str = "}";

/// Key identifying a record in the store.
///
/// The empty key is reserved: [`CacheKey::NO_KEY`] tells the normalizer to key
/// an object by its response path instead of giving it a global identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Sentinel meaning "do not promote, key this object by path".
    pub const NO_KEY: CacheKey = CacheKey(String::new());

    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// True for [`CacheKey::NO_KEY`] and for any empty string.
    pub fn is_no_key(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Pointer from a record field to another record.
///
/// Stored values of this type are what separate "this field is an entity" from
/// "this field is a string". The serialized form carries a reserved prefix so
/// generic JSON persistence can tell the two apart on the way back in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheReference {
    key: String,
}

impl CacheReference {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Encode as `ApolloCacheReference{<key>}`.
    pub fn serialize(&self) -> String {
        format!("{SERIALIZATION_PREFIX}{}{SERIALIZATION_SUFFIX}", self.key)
    }

    /// Whether `value` is the encoded form of a reference.
    pub fn is_serialized_reference(value: &str) -> bool {
        value.len() >= SERIALIZATION_PREFIX.len() + SERIALIZATION_SUFFIX.len()
            && value.starts_with(SERIALIZATION_PREFIX)
            && value.ends_with(SERIALIZATION_SUFFIX)
    }

    /// Decode the output of [`CacheReference::serialize`].
    ///
    /// Returns `None` for any string that is not a serialized reference.
    pub fn deserialize(value: &str) -> Option<Self> {
        if !Self::is_serialized_reference(value) {
            return None;
        }
        let key = &value[SERIALIZATION_PREFIX.len()..value.len() - SERIALIZATION_SUFFIX.len()];
        Some(Self::new(key))
    }
}

impl fmt::Display for CacheReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl From<CacheKey> for CacheReference {
    fn from(value: CacheKey) -> Self {
        Self { key: value.0 }
    }
}

impl Serialize for CacheReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&CacheReference::serialize(self))
    }
}

impl<'de> Deserialize<'de> for CacheReference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        CacheReference::deserialize(&raw).ok_or_else(|| {
            serde::de::Error::custom(format!("`{raw}` is not a serialized cache reference"))
        })
    }
}
