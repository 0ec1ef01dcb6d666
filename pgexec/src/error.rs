//! `pgexec` error types.
use std::{backtrace::Backtrace, fmt, io, str::Utf8Error};

use crate::{
    common::unit_error,
    config::ParseError,
    row::{DecodeError, RowNotFound},
    session::{ConnectError, ErrorResponse, ProtocolError},
};

/// A specialized [`Result`] type for `pgexec` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

unit_error! {
    /// An error when operating on an already closed connection.
    pub struct ClosedError("connection is closed");
}

/// All possible error from `pgexec` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub(crate) fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub(crate) fn closed() -> Self {
        ClosedError.into()
    }

    pub(crate) fn row_not_found() -> Self {
        RowNotFound.into()
    }
}

/// All possible error kind from `pgexec` library.
pub enum ErrorKind {
    Config(ParseError),
    Connect(ConnectError),
    Protocol(ProtocolError),
    Io(io::Error),
    Database(ErrorResponse),
    Utf8(Utf8Error),
    Decode(DecodeError),
    RowNotFound(RowNotFound),
    Closed(ClosedError),
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<ConnectError>e => ErrorKind::Connect(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<io::Error>e => ErrorKind::Io(e));
from!(<ErrorResponse>e => ErrorKind::Database(e));
from!(<Utf8Error>e => ErrorKind::Utf8(e));
from!(<DecodeError>e => ErrorKind::Decode(e));
from!(<RowNotFound>e => ErrorKind::RowNotFound(e));
from!(<ClosedError>e => ErrorKind::Closed(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Connect(e) => e.fmt(f),
            Self::Protocol(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::Database(e) => e.fmt(f),
            Self::Utf8(e) => e.fmt(f),
            Self::Decode(e) => e.fmt(f),
            Self::RowNotFound(e) => e.fmt(f),
            Self::Closed(e) => e.fmt(f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
