//! The attribute value model.
//!
//! Distributed object fields hold [`DValue`]s. Set fields hold [`DEntry`]s,
//! each addressable by a comparable [`DKey`]. All three serialize with
//! serde because the embedding session layer mirrors accepted events to
//! clients over the wire.

use serde::{Deserialize, Serialize};

use crate::Oid;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Oid(Oid),
}

impl DValue {
    /// A short label for log messages and kind-mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            DValue::Null => "null",
            DValue::Bool(_) => "bool",
            DValue::Int(_) => "int",
            DValue::Float(_) => "float",
            DValue::Str(_) => "string",
            DValue::Bytes(_) => "bytes",
            DValue::Oid(_) => "oid",
        }
    }

    /// Returns the integer payload, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            DValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for DValue {
    fn from(v: bool) -> Self {
        DValue::Bool(v)
    }
}

impl From<i32> for DValue {
    fn from(v: i32) -> Self {
        DValue::Int(v as i64)
    }
}

impl From<i64> for DValue {
    fn from(v: i64) -> Self {
        DValue::Int(v)
    }
}

impl From<f64> for DValue {
    fn from(v: f64) -> Self {
        DValue::Float(v)
    }
}

impl From<&str> for DValue {
    fn from(v: &str) -> Self {
        DValue::Str(v.to_owned())
    }
}

impl From<String> for DValue {
    fn from(v: String) -> Self {
        DValue::Str(v)
    }
}

impl From<Oid> for DValue {
    fn from(v: Oid) -> Self {
        DValue::Oid(v)
    }
}

/// The comparable key that addresses one entry of a set field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DKey {
    Int(i64),
    Str(String),
    Oid(Oid),
}

impl From<i64> for DKey {
    fn from(v: i64) -> Self {
        DKey::Int(v)
    }
}

impl From<&str> for DKey {
    fn from(v: &str) -> Self {
        DKey::Str(v.to_owned())
    }
}

impl From<String> for DKey {
    fn from(v: String) -> Self {
        DKey::Str(v)
    }
}

impl From<Oid> for DKey {
    fn from(v: Oid) -> Self {
        DKey::Oid(v)
    }
}

/// One element of a set field: a keyed value.
///
/// Entries are identified by their key. Adding an entry whose key already
/// exists is rejected; replacing one with the same key is an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DEntry {
    pub key: DKey,
    pub value: DValue,
}

impl DEntry {
    pub fn new(key: impl Into<DKey>, value: impl Into<DValue>) -> Self {
        DEntry {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_kinds() {
        assert_eq!(DValue::from(3).kind(), "int");
        assert_eq!(DValue::from("hi").kind(), "string");
        assert_eq!(DValue::from(Oid(1)).kind(), "oid");
        assert_eq!(DValue::Null.kind(), "null");
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(DValue::from(7).as_int(), Some(7));
        assert_eq!(DValue::from("x").as_int(), None);
        assert_eq!(DValue::from("x").as_str(), Some("x"));
    }

    #[test]
    fn test_entry_round_trip() {
        let entry = DEntry::new("alice", 12);
        let json = serde_json::to_string(&entry).unwrap();
        let decoded: DEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, decoded);
    }
}
