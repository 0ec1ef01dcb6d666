//! Row decoding and materialized results.
//!
//! - [`Row`]
//! - [`Rows`]
//! - [`RowIndex`]
//! - [`DecodeError`]
use bytes::Bytes;
use std::{borrow::Cow, fmt, str::Utf8Error, sync::Arc};

use crate::{
    common::{ByteStr, unit_error},
    ext::FmtExt,
    session::{FieldDescription, Format},
    value::{Kind, Oid, Value},
};

/// One decoded result row.
///
/// Values are ordered as the columns of the statement's row description,
/// which all rows of one result share.
#[derive(Debug, Clone)]
pub struct Row {
    fields: Arc<[FieldDescription]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(fields: Arc<[FieldDescription]>, values: Vec<Value>) -> Self {
        Self { fields, values }
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if row contains no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the shared column metadata.
    pub fn fields(&self) -> &[FieldDescription] {
        &self.fields
    }

    /// Returns the decoded values in column order.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Get a value by position or column name.
    pub fn get<I: RowIndex>(&self, index: I) -> Option<&Value> {
        self.try_get(index).ok()
    }

    /// Try get a value by position or column name.
    pub fn try_get<I: RowIndex>(&self, index: I) -> Result<&Value, DecodeError> {
        let nth = index.position(&self.fields)?;
        Ok(&self.values[nth])
    }

    /// Consume self into the decoded values.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl std::ops::Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

impl IntoIterator for Row {
    type Item = Value;

    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// Materialized query result.
///
/// Owns every row of one statement in arrival order; immutable once
/// constructed.
#[derive(Debug)]
pub struct Rows {
    fields: Arc<[FieldDescription]>,
    rows: Vec<Row>,
    tag: ByteStr,
}

impl Rows {
    pub(crate) fn new(fields: Arc<[FieldDescription]>, rows: Vec<Row>, tag: ByteStr) -> Self {
        Self { fields, rows, tag }
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the result holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the shared column metadata.
    ///
    /// Empty for statements which return no rows.
    pub fn fields(&self) -> &[FieldDescription] {
        &self.fields
    }

    /// Get row by index.
    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    /// Returns the first row, if any.
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Iterate the rows in arrival order.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Returns the command tag, e.g. `SELECT 3`.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Number of rows affected, parsed from the command tag.
    pub fn rows_affected(&self) -> u64 {
        rows_affected(&self.tag)
    }
}

impl std::ops::Index<usize> for Rows {
    type Output = Row;

    fn index(&self, index: usize) -> &Self::Output {
        &self.rows[index]
    }
}

impl IntoIterator for Rows {
    type Item = Row;

    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a Rows {
    type Item = &'a Row;

    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Decode information from a `CommandComplete` tag.
pub(crate) fn rows_affected(tag: &str) -> u64 {
    let mut whs = tag.split_whitespace();
    let Some(tag) = whs.next() else {
        return 0;
    };
    let Some(rows) = whs.next() else {
        return 0;
    };
    match tag {
        "INSERT" => whs.next().unwrap_or_default(),
        "SELECT" => rows,
        "UPDATE" => rows,
        "DELETE" => rows,
        "MERGE" => rows,
        "FETCH" => rows,
        "MOVE" => rows,
        "COPY" => rows,
        _ => return 0,
    }
    .parse()
    .unwrap_or_default()
}

// ===== Decoding =====

/// Decode one raw wire row against the caller's declared schema.
///
/// An empty schema decodes every column by its wire oid; a non-empty schema
/// must match the column count and decodes column `i` as `schema[i]`.
pub(crate) fn decode_row(
    fields: &Arc<[FieldDescription]>,
    schema: &[Kind],
    cells: Vec<Option<Bytes>>,
) -> Result<Row, DecodeError> {
    if cells.len() != fields.len() {
        return Err(DecodeError::ColumnCount { expected: fields.len(), found: cells.len() });
    }
    if !schema.is_empty() && schema.len() != cells.len() {
        return Err(DecodeError::ColumnCount { expected: schema.len(), found: cells.len() });
    }

    let mut values = Vec::with_capacity(cells.len());
    for (nth, cell) in cells.into_iter().enumerate() {
        let field = &fields[nth];
        let value = match cell {
            // NULL decodes as NULL under any declared type
            None => Value::Null,
            Some(bytes) => match schema.get(nth).copied() {
                Some(kind) => decode_as(kind, field, bytes)?,
                None => decode_wire(field, bytes)?,
            },
        };
        values.push(value);
    }

    Ok(Row::new(fields.clone(), values))
}

/// Decode a cell by its wire oid alone.
fn decode_wire(field: &FieldDescription, bytes: Bytes) -> Result<Value, DecodeError> {
    match Kind::from_oid(field.oid) {
        Some(kind) => decode_as(kind, field, bytes),
        None => match field.format {
            Format::Text => Ok(Value::Text(ByteStr::from_utf8(bytes)?)),
            Format::Binary => Ok(Value::Bytes(bytes)),
        },
    }
}

/// Decode a non-NULL cell as the declared `kind`.
fn decode_as(kind: Kind, field: &FieldDescription, bytes: Bytes) -> Result<Value, DecodeError> {
    match field.format {
        Format::Text => decode_text(kind, bytes),
        Format::Binary => decode_binary(kind, field.oid, bytes),
    }
}

/// Text format parses regardless of the column's own oid, so a text column
/// holding digits decodes under a declared integer kind.
fn decode_text(kind: Kind, bytes: Bytes) -> Result<Value, DecodeError> {
    let text = ByteStr::from_utf8(bytes)?;
    macro_rules! parse {
        ($variant:ident) => {
            match text.parse() {
                Ok(ok) => Ok(Value::$variant(ok)),
                Err(_) => Err(DecodeError::parse(kind, text.into_bytes())),
            }
        };
    }
    match kind {
        Kind::Bool => match text.as_str() {
            "t" | "true" | "TRUE" | "1" => Ok(Value::Bool(true)),
            "f" | "false" | "FALSE" | "0" => Ok(Value::Bool(false)),
            _ => Err(DecodeError::parse(kind, text.into_bytes())),
        },
        Kind::Int2 => parse!(Int2),
        Kind::Int4 => parse!(Int4),
        Kind::Int8 => parse!(Int8),
        Kind::Float4 => parse!(Float4),
        Kind::Float8 => parse!(Float8),
        Kind::Text => Ok(Value::Text(text)),
        Kind::Bytea => match decode_hex(&text) {
            Some(bytes) => Ok(Value::Bytes(bytes)),
            None => Err(DecodeError::parse(kind, text.into_bytes())),
        },
        #[cfg(feature = "json")]
        Kind::Json => Ok(Value::Json(serde_json::from_str(&text)?)),
    }
}

/// Binary format requires the column oid to agree with the declared kind.
fn decode_binary(kind: Kind, oid: Oid, bytes: Bytes) -> Result<Value, DecodeError> {
    if !kind.matches(oid) {
        return Err(DecodeError::OidMismatch { kind, oid });
    }
    macro_rules! be {
        ($ty:ty => $variant:ident) => {
            match <[u8; size_of::<$ty>()]>::try_from(&bytes[..]) {
                Ok(be) => Ok(Value::$variant(<$ty>::from_be_bytes(be))),
                Err(_) => Err(DecodeError::parse(kind, bytes)),
            }
        };
    }
    match kind {
        Kind::Bool => match &bytes[..] {
            [b] => Ok(Value::Bool(*b != 0)),
            _ => Err(DecodeError::parse(kind, bytes)),
        },
        Kind::Int2 => be!(i16 => Int2),
        Kind::Int4 => be!(i32 => Int4),
        Kind::Int8 => be!(i64 => Int8),
        Kind::Float4 => be!(f32 => Float4),
        Kind::Float8 => be!(f64 => Float8),
        Kind::Text => Ok(Value::Text(ByteStr::from_utf8(bytes)?)),
        Kind::Bytea => Ok(Value::Bytes(bytes)),
        #[cfg(feature = "json")]
        Kind::Json => {
            // jsonb carries a leading version byte
            let body = match (oid, bytes.first()) {
                (3802, Some(1)) => &bytes[1..],
                _ => &bytes[..],
            };
            Ok(Value::Json(serde_json::from_slice(body)?))
        },
    }
}

/// Decode the `\x`-prefixed hex form of `bytea` text output.
fn decode_hex(text: &str) -> Option<Bytes> {
    let hex = text.strip_prefix("\\x")?.as_bytes();
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(hex.len() / 2);
    for pair in hex.chunks_exact(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        out.push((hi << 4 | lo) as u8);
    }
    Some(out.into())
}

// ===== Indexing =====

/// Type that can be used for indexing a row's columns.
pub trait RowIndex: sealed::Sealed {
    /// Returns the position of the column within `fields`.
    fn position(&self, fields: &[FieldDescription]) -> Result<usize, DecodeError>;
}

impl RowIndex for usize {
    fn position(&self, fields: &[FieldDescription]) -> Result<usize, DecodeError> {
        match *self < fields.len() {
            true => Ok(*self),
            false => Err(DecodeError::IndexOutOfBounds(*self)),
        }
    }
}

impl RowIndex for &str {
    fn position(&self, fields: &[FieldDescription]) -> Result<usize, DecodeError> {
        fields
            .iter()
            .position(|f|f.name == **self)
            .ok_or_else(||DecodeError::ColumnNotFound(String::from(*self).into()))
    }
}

mod sealed {
    pub trait Sealed { }
    impl Sealed for usize { }
    impl Sealed for &str { }
}

unit_error! {
    /// An error when [`fetch_one`][crate::query::Query::fetch_one] does not
    /// return any row.
    pub struct RowNotFound("row not found");
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for DecodeError {
            fn from($pat: $ty) -> Self {
                $body
            }
        }
    };
}

/// An error when decoding row values.
pub enum DecodeError {
    /// Postgres return non utf8 string.
    Utf8(Utf8Error),
    /// Declared schema length and column count disagree.
    ColumnCount { expected: usize, found: usize },
    /// Raw bytes cannot be parsed as the declared kind.
    Parse { kind: Kind, value: Bytes },
    /// Binary column oid disagrees with the declared kind.
    OidMismatch { kind: Kind, oid: Oid },
    /// Column requested not found.
    ColumnNotFound(Cow<'static,str>),
    /// Index requested is out of bounds.
    IndexOutOfBounds(usize),
    /// Server version string does not follow the `major.minor.patch` shape.
    Version(ByteStr),
    /// Failed to deserialize using `serde_json`.
    #[cfg(feature = "json")]
    Json(serde_json::error::Error),
}

impl DecodeError {
    pub(crate) fn parse(kind: Kind, value: Bytes) -> Self {
        Self::Parse { kind, value }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to decode value, ")?;
        match self {
            Self::Utf8(e) => write!(f, "{e}"),
            Self::ColumnCount { expected, found } => {
                write!(f, "expected {expected} columns, row has {found}")
            },
            Self::Parse { kind, value } => write!(f, "cannot parse {:?} as {kind}", value.lossy()),
            Self::OidMismatch { kind, oid } => write!(f, "oid {oid} is not {kind}"),
            Self::ColumnNotFound(name) => write!(f, "column not found: {name:?}"),
            Self::IndexOutOfBounds(u) => write!(f, "index out of bounds: {u:?}"),
            Self::Version(v) => write!(f, "unrecognized server version {v:?}"),
            #[cfg(feature = "json")]
            Self::Json(e) => write!(f, "{e}"),
        }
    }
}

from!(<Utf8Error>e => Self::Utf8(e));
#[cfg(feature = "json")]
from!(<serde_json::error::Error>e => Self::Json(e));

impl std::error::Error for DecodeError { }

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fields(columns: &[(&'static str, Oid)]) -> Arc<[FieldDescription]> {
        columns.iter()
            .map(|(name, oid)|FieldDescription {
                name: ByteStr::from_static(name),
                oid: *oid,
                format: Format::Text,
            })
            .collect::<Vec<_>>()
            .into()
    }

    fn cell(text: &str) -> Option<Bytes> {
        Some(Bytes::copy_from_slice(text.as_bytes()))
    }

    #[test]
    fn command_tags() {
        assert_eq!(rows_affected("SELECT 3"), 3);
        assert_eq!(rows_affected("INSERT 0 5"), 5);
        assert_eq!(rows_affected("UPDATE 1"), 1);
        assert_eq!(rows_affected("CREATE TABLE"), 0);
        assert_eq!(rows_affected(""), 0);
    }

    #[test]
    fn hex_bytea() {
        assert_eq!(decode_hex("\\x4869").unwrap(), Bytes::from_static(b"Hi"));
        assert_eq!(decode_hex("\\x").unwrap(), Bytes::new());
        assert!(decode_hex("4869").is_none());
        assert!(decode_hex("\\x486").is_none());
    }

    #[test]
    fn schema_length_checked() {
        let fields = fields(&[("a", 25), ("b", 25)]);
        let err = decode_row(&fields, &[Kind::Text], vec![cell("x"), cell("y")]).unwrap_err();
        assert!(matches!(err, DecodeError::ColumnCount { expected: 1, found: 2 }));
    }

    #[test]
    fn null_skips_declared_type() {
        let fields = fields(&[("a", 25)]);
        let row = decode_row(&fields, &[Kind::Int4], vec![None]).unwrap();
        assert!(row[0].is_null());
    }

    #[test]
    fn text_coerced_to_declared_int() {
        let fields = fields(&[("a", 25)]);
        let row = decode_row(&fields, &[Kind::Int4], vec![cell("123")]).unwrap();
        assert_eq!(row[0], Value::Int4(123));

        let err = decode_row(&fields, &[Kind::Int4], vec![cell("abc")]).unwrap_err();
        assert!(matches!(err, DecodeError::Parse { kind: Kind::Int4, .. }));
    }

    #[test]
    fn binary_oid_checked() {
        let fields: Arc<[FieldDescription]> = vec![FieldDescription {
            name: ByteStr::from_static("n"),
            oid: 25,
            format: Format::Binary,
        }]
        .into();
        let err = decode_row(&fields, &[Kind::Int4], vec![cell("abcd")]).unwrap_err();
        assert!(matches!(err, DecodeError::OidMismatch { kind: Kind::Int4, oid: 25 }));
    }

    #[test]
    fn index_by_name() {
        let fields = fields(&[("id", 23), ("name", 25)]);
        let row = decode_row(&fields, &[], vec![cell("7"), cell("foo")]).unwrap();
        assert_eq!(row.try_get("name").unwrap(), &Value::Text(ByteStr::from_static("foo")));
        assert!(matches!(
            row.try_get("missing").unwrap_err(),
            DecodeError::ColumnNotFound(_),
        ));
        assert!(matches!(
            row.try_get(9).unwrap_err(),
            DecodeError::IndexOutOfBounds(9),
        ));
    }
}
