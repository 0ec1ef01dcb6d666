//! The [`Session`] trait and the events it emits.
//!
//! A [`Session`] owns the socket, the startup/authentication handshake and
//! the byte-level message codec. This crate never touches any of that: it
//! submits requests and consumes the resulting [`SessionEvent`] stream.
use bytes::Bytes;
use std::{
    borrow::Cow,
    fmt,
    task::{Context, Poll},
};

use crate::{Result, common::ByteStr, config::Config, encode::Encoded, value::Oid};

/// Result column wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Text,
    Binary,
}

/// One column of a row description.
#[derive(Debug, Clone)]
pub struct FieldDescription {
    /// Column name.
    pub name: ByteStr,
    /// Column type oid.
    pub oid: Oid,
    /// Format of the column's cells in subsequent data rows.
    pub format: Format,
}

/// Server-originated informational or warning message.
///
/// A notice never terminates execution and is never an error.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Notice {
    /// Severity such as `NOTICE`, `WARNING` or `DEBUG`.
    pub severity: ByteStr,
    /// `SQLSTATE` code, when the server sent one.
    pub code: Option<ByteStr>,
    /// Human-readable message.
    pub message: ByteStr,
}

/// Asynchronous publish/subscribe message from `NOTIFY`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Notification {
    /// Channel name the notification was sent on.
    pub channel: ByteStr,
    /// Payload string, possibly empty.
    pub payload: ByteStr,
    /// Process id of the originating server session.
    pub pid: u32,
}

/// One protocol event of an in-flight request.
#[derive(Debug)]
pub enum SessionEvent {
    /// Column metadata preceding the data rows of an extended request.
    RowDescription(Vec<FieldDescription>),
    /// One raw data row, one cell per column, [`None`] for SQL `NULL`.
    Row(Vec<Option<Bytes>>),
    /// A statement finished; carries the command tag, e.g. `SELECT 3`.
    Complete(ByteStr),
    /// Interleaved informational message, see [`Notice`].
    Notice(Notice),
    /// Interleaved notification, see [`Notification`].
    Notification(Notification),
    /// The request is fully processed and a new one may be submitted.
    Ready,
}

/// A protocol session which can submit requests and yield their events.
///
/// Exactly one request may be in flight at a time; submitting while events
/// of a previous request are pending is a caller bug, not guarded here.
pub trait Session: Sized + Unpin {
    /// Future returned by [`connect`][Session::connect].
    type Connect: Future<Output = Result<Self>>;

    /// Open a session: resolve the address, perform the startup and
    /// authentication handshake.
    fn connect(config: Config) -> Self::Connect;

    /// Submit one or more semicolon-separated statements without parameters.
    ///
    /// Responds with zero or more of [`RowDescription`][SessionEvent::RowDescription],
    /// [`Row`][SessionEvent::Row] and [`Complete`][SessionEvent::Complete]
    /// (one per statement), terminated by [`Ready`][SessionEvent::Ready].
    fn send_simple(&mut self, sql: &str);

    /// Submit a single parameterized statement through bind/execute.
    ///
    /// Responds with [`RowDescription`][SessionEvent::RowDescription], the
    /// data rows and [`Complete`][SessionEvent::Complete], terminated by
    /// [`Ready`][SessionEvent::Ready].
    fn send_extended(&mut self, sql: &str, params: &[Encoded<'_>]);

    /// Poll the next event of the in-flight request.
    ///
    /// Implementor should flush buffered outgoing messages before reading.
    ///
    /// A server `ErrorResponse` is returned as [`Err`]; the caller then
    /// invokes [`recover`][Session::recover] before submitting again.
    fn poll_event(&mut self, cx: &mut Context) -> Poll<Result<SessionEvent>>;

    /// Discard events of the in-flight request until
    /// [`Ready`][SessionEvent::Ready].
    fn recover(&mut self);

    /// Release the socket, aborting any in-flight request.
    ///
    /// Must be idempotent and must not fail.
    fn close(&mut self);
}

/// Server-reported statement failure.
#[derive(Clone)]
pub struct ErrorResponse {
    /// Severity such as `ERROR`, `FATAL` or `PANIC`.
    pub severity: ByteStr,
    /// `SQLSTATE` code.
    pub code: ByteStr,
    /// Human-readable message.
    pub message: ByteStr,
}

impl std::error::Error for ErrorResponse { }

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.severity, self.message, self.code)
    }
}

impl fmt::Debug for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// Connect-time failure reported by a session implementation.
///
/// Network unreachable, authentication rejected, or protocol version
/// mismatch; fatal to that connect attempt.
pub struct ConnectError {
    reason: Cow<'static, str>,
}

impl ConnectError {
    /// Create new `ConnectError`.
    pub fn new(reason: impl Into<Cow<'static, str>>) -> Self {
        Self { reason: reason.into() }
    }
}

impl std::error::Error for ConnectError { }

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to connect: {}", self.reason)
    }
}

impl fmt::Debug for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

/// The session or the server broke message sequencing.
pub struct ProtocolError {
    reason: Cow<'static, str>,
}

impl ProtocolError {
    /// Create new `ProtocolError`.
    pub fn new(reason: impl Into<Cow<'static, str>>) -> Self {
        Self { reason: reason.into() }
    }
}

impl std::error::Error for ProtocolError { }

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "protocol violation: {}", self.reason)
    }
}

impl fmt::Debug for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
