//! Positional parameter encoding.
use crate::value::{Kind, Oid};

/// Longest textual integer, `i64::MIN` with sign.
const INLINE_LEN: usize = 20;

/// A parameter value encoded for transmission.
///
/// Parameters travel in text format; the session implementation frames them
/// into the wire message. Oid `0` leaves the type for the server to infer.
#[derive(Debug)]
pub struct Encoded<'q> {
    oid: Oid,
    value: Option<TextValue<'q>>,
}

impl<'q> Encoded<'q> {
    /// SQL `NULL` with unspecified type.
    pub const fn null() -> Encoded<'static> {
        Encoded { oid: 0, value: None }
    }

    /// Returns the parameter type oid, `0` for unspecified.
    pub const fn oid(&self) -> Oid {
        self.oid
    }

    /// Returns the textual value, [`None`] for SQL `NULL`.
    pub fn value(&self) -> Option<&str> {
        self.value.as_ref().map(TextValue::as_str)
    }
}

#[derive(Debug)]
enum TextValue<'q> {
    Static(&'static str),
    Slice(&'q str),
    Inline { offset: u8, buf: [u8; INLINE_LEN] },
    Owned(String),
}

impl TextValue<'_> {
    /// Store a short ASCII slice without allocating.
    fn inline(slice: &[u8]) -> TextValue<'static> {
        let len = slice.len();
        assert!(len <= INLINE_LEN, "inline slice is too large");
        let mut buf = [0u8; INLINE_LEN];
        buf[INLINE_LEN - len..].copy_from_slice(slice);
        TextValue::Inline { offset: (INLINE_LEN - len) as u8, buf }
    }

    fn as_str(&self) -> &str {
        match self {
            TextValue::Static(s) => s,
            TextValue::Slice(s) => s,
            // SAFETY: only constructed from `&str` contents
            TextValue::Inline { offset, buf } => unsafe {
                std::str::from_utf8_unchecked(&buf[*offset as usize..])
            },
            TextValue::Owned(s) => s,
        }
    }
}

/// A value that can be bound to a sql parameter.
pub trait Encode<'q> {
    /// Encode self into its textual wire value.
    fn encode(self) -> Encoded<'q>;
}

impl Encode<'static> for bool {
    fn encode(self) -> Encoded<'static> {
        Encoded {
            oid: Kind::Bool.oid(),
            value: Some(TextValue::Static(if self { "t" } else { "f" })),
        }
    }
}

macro_rules! encode_int {
    ($($ty:ty => $kind:ident),* $(,)?) => {$(
        impl Encode<'static> for $ty {
            fn encode(self) -> Encoded<'static> {
                let mut fmt = itoa::Buffer::new();
                Encoded {
                    oid: Kind::$kind.oid(),
                    value: Some(TextValue::inline(fmt.format(self).as_bytes())),
                }
            }
        }
    )*};
}

encode_int! {
    i16 => Int2,
    i32 => Int4,
    i64 => Int8,
}

macro_rules! encode_float {
    ($($ty:ty => $kind:ident),* $(,)?) => {$(
        impl Encode<'static> for $ty {
            fn encode(self) -> Encoded<'static> {
                Encoded {
                    oid: Kind::$kind.oid(),
                    value: Some(TextValue::Owned(self.to_string())),
                }
            }
        }
    )*};
}

encode_float! {
    f32 => Float4,
    f64 => Float8,
}

impl<'q> Encode<'q> for &'q str {
    fn encode(self) -> Encoded<'q> {
        Encoded {
            oid: Kind::Text.oid(),
            value: Some(TextValue::Slice(self)),
        }
    }
}

impl Encode<'static> for String {
    fn encode(self) -> Encoded<'static> {
        Encoded {
            oid: Kind::Text.oid(),
            value: Some(TextValue::Owned(self)),
        }
    }
}

impl<'q> Encode<'q> for &'q String {
    fn encode(self) -> Encoded<'q> {
        self.as_str().encode()
    }
}

impl<'q, T: Encode<'q>> Encode<'q> for Option<T> {
    fn encode(self) -> Encoded<'q> {
        match self {
            Some(value) => value.encode(),
            None => Encoded::null(),
        }
    }
}

/// Serialized as `jsonb`.
///
/// # Panics
///
/// [`Encode`] panics if the [`Serialize`][serde::Serialize] implementation
/// decides to fail.
#[cfg(feature = "json")]
impl Encode<'static> for &serde_json::Value {
    fn encode(self) -> Encoded<'static> {
        Encoded {
            oid: Kind::Json.oid(),
            value: Some(TextValue::Owned(
                serde_json::to_string(self).expect("json value serialization"),
            )),
        }
    }
}
