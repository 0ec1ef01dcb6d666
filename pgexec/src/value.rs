//! Column value types.
use bytes::Bytes;

use crate::common::ByteStr;

/// Postgres object identifier.
///
/// The oid type is implemented as an unsigned four-byte integer.
///
/// <https://www.postgresql.org/docs/current/datatype-oid.html>
pub type Oid = u32;

/// A column type that this crate can decode.
///
/// A non-empty slice of `Kind` passed to [`Query::types`][1] declares the
/// expected type of each output column in order.
///
/// [1]: crate::query::Query::types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// `bool`, 1-byte storage
    Bool,
    /// `int2`, -32 thousand to 32 thousand, 2-byte storage
    Int2,
    /// `int4`, -2 billion to 2 billion integer, 4-byte storage
    Int4,
    /// `int8`, ~18 digit integer, 8-byte storage
    Int8,
    /// `float4`, single-precision floating point number, 4-byte storage
    Float4,
    /// `float8`, double-precision floating point number, 8-byte storage
    Float8,
    /// `text`, variable-length string, no limit specified
    Text,
    /// `bytea`, variable-length binary string
    Bytea,
    /// `json`/`jsonb` document
    #[cfg(feature = "json")]
    Json,
}

impl Kind {
    /// Returns the canonical [`Oid`] for this kind.
    pub const fn oid(self) -> Oid {
        match self {
            Kind::Bool => 16,
            Kind::Int2 => 21,
            Kind::Int4 => 23,
            Kind::Int8 => 20,
            Kind::Float4 => 700,
            Kind::Float8 => 701,
            Kind::Text => 25,
            Kind::Bytea => 17,
            #[cfg(feature = "json")]
            Kind::Json => 3802,
        }
    }

    /// Map a wire oid to a `Kind`, accepting the textual aliases.
    ///
    /// Returns [`None`] for oids outside the supported set.
    pub fn from_oid(oid: Oid) -> Option<Kind> {
        match oid {
            16 => Some(Kind::Bool),
            21 => Some(Kind::Int2),
            23 => Some(Kind::Int4),
            20 => Some(Kind::Int8),
            700 => Some(Kind::Float4),
            701 => Some(Kind::Float8),
            // text, name, bpchar, varchar
            25 | 19 | 1042 | 1043 => Some(Kind::Text),
            17 => Some(Kind::Bytea),
            #[cfg(feature = "json")]
            114 | 3802 => Some(Kind::Json),
            _ => None,
        }
    }

    /// Returns `true` if a column of `oid` can be decoded binary as `self`.
    pub(crate) fn matches(self, oid: Oid) -> bool {
        Kind::from_oid(oid) == Some(self)
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Kind::Bool => "bool",
            Kind::Int2 => "int2",
            Kind::Int4 => "int4",
            Kind::Int8 => "int8",
            Kind::Float4 => "float4",
            Kind::Float8 => "float8",
            Kind::Text => "text",
            Kind::Bytea => "bytea",
            #[cfg(feature = "json")]
            Kind::Json => "json",
        })
    }
}

/// A decoded column value.
///
/// This is the closed set of runtime-typed values a row can hold; columns
/// with an oid outside the supported set decode as [`Value::Text`] or
/// [`Value::Bytes`] depending on their wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL` under any declared type.
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Text(ByteStr),
    Bytes(Bytes),
    #[cfg(feature = "json")]
    Json(serde_json::Value),
}

impl Value {
    /// Return `true` if value is SQL `NULL`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the [`Kind`] of this value, [`None`] for `NULL`.
    pub fn kind(&self) -> Option<Kind> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(Kind::Bool),
            Value::Int2(_) => Some(Kind::Int2),
            Value::Int4(_) => Some(Kind::Int4),
            Value::Int8(_) => Some(Kind::Int8),
            Value::Float4(_) => Some(Kind::Float4),
            Value::Float8(_) => Some(Kind::Float8),
            Value::Text(_) => Some(Kind::Text),
            Value::Bytes(_) => Some(Kind::Bytea),
            #[cfg(feature = "json")]
            Value::Json(_) => Some(Kind::Json),
        }
    }

    /// Extract a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract an integer, widened to `i64`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int2(i) => Some(*i as i64),
            Value::Int4(i) => Some(*i as i64),
            Value::Int8(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract a float, widened to `f64`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float4(f) => Some(*f as f64),
            Value::Float8(f) => Some(*f),
            _ => None,
        }
    }

    /// Extract a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    /// Extract raw bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int2(i) => serializer.serialize_i16(*i),
            Value::Int4(i) => serializer.serialize_i32(*i),
            Value::Int8(i) => serializer.serialize_i64(*i),
            Value::Float4(f) => serializer.serialize_f32(*f),
            Value::Float8(f) => serializer.serialize_f64(*f),
            Value::Text(t) => serializer.serialize_str(t.as_str()),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            #[cfg(feature = "json")]
            Value::Json(v) => v.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn int_widening() {
        assert_eq!(Value::Int2(2).as_int(), Some(2));
        assert_eq!(Value::Int4(-4).as_int(), Some(-4));
        assert_eq!(Value::Int8(i64::MAX).as_int(), Some(i64::MAX));
        assert_eq!(Value::Text(ByteStr::from_static("5")).as_int(), None);
    }

    #[test]
    fn oid_alias() {
        // varchar decodes as text
        assert_eq!(Kind::from_oid(1043), Some(Kind::Text));
        assert!(Kind::Text.matches(1043));
        assert!(!Kind::Int4.matches(25));
    }
}
