//! Postgres connection handle.
use std::fmt;

mod hooks;

pub(crate) use hooks::Hooks;

use crate::{
    Result,
    common::{ByteStr, debug_log},
    config::Config,
    error::Error,
    fetch::ExecAll,
    query::Query,
    row::DecodeError,
    session::{Notice, Notification, Session},
};

/// Postgres connection handle.
///
/// Owns one protocol session and executes at most one query at a time.
/// Queries are strictly request/response with no client-side pipelining;
/// invoking the query api concurrently from multiple tasks on one handle is
/// a caller bug, not guarded here.
///
/// There is no timeout or cancellation primitive: a hung server blocks the
/// caller until the session's i/o fails. Callers needing cancellation wrap
/// the returned futures in their own timeout mechanism.
pub struct Connection<S: Session> {
    session: Option<S>,
    hooks: Hooks,
}

impl<S: Session> Connection<S> {
    /// Connect using configuration from environment variable.
    ///
    /// See [`Config::from_env`] for the variables read.
    pub async fn connect_env() -> Result<Self> {
        Self::connect_with(Config::from_env()).await
    }

    /// Connect using an url.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(Config::parse(url)?).await
    }

    /// Connect using key-value pairs.
    ///
    /// See [`Config::from_pairs`] for the recognized keys.
    pub async fn connect_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self::connect_with(Config::from_pairs(pairs)?).await
    }

    /// Connect using a resolved [`Config`].
    pub async fn connect_with(config: Config) -> Result<Self> {
        let session = S::connect(config).await?;
        debug_log!("session established");
        Ok(Self::from_session(session))
    }

    /// Wrap an already-established session.
    pub fn from_session(session: S) -> Self {
        Self { session: Some(session), hooks: Hooks::default() }
    }

    /// Start building a parameterized query, see [`query`][crate::query::query].
    pub fn query<'c, 'q>(&'c mut self, sql: &'q str) -> Query<'c, 'q, S> {
        crate::query::query(sql, self)
    }

    /// Run one or more semicolon-separated statements, discarding all
    /// results, see [`exec_all`][crate::query::exec_all].
    pub fn exec_all<'c, 'q>(&'c mut self, sql: &'q str) -> ExecAll<'c, 'q, S> {
        crate::query::exec_all(sql, self)
    }

    /// Query the server version.
    pub async fn version(&mut self) -> Result<ServerVersion> {
        let row = crate::query::query("SELECT version()", self)
            .fetch_one()
            .await
            .map_err(|err|err.with_context("server version query"))?;
        let banner = row.try_get(0)?.as_str().unwrap_or_default();
        parse_server_version(banner)
            .ok_or_else(||DecodeError::Version(ByteStr::copy_from_str(banner)).into())
    }

    /// Register the notice handler, replacing any previous one.
    ///
    /// Notices arriving with no handler registered are dropped.
    pub fn on_notice(&mut self, handler: impl FnMut(Notice) + Send + 'static) {
        self.hooks.set_notice(handler);
    }

    /// Register the notification handler, replacing any previous one.
    ///
    /// Notifications arriving with no handler registered are dropped.
    pub fn on_notification(&mut self, handler: impl FnMut(Notification) + Send + 'static) {
        self.hooks.set_notification(handler);
    }

    /// Close the connection, aborting any in-flight query.
    ///
    /// Closing an already closed connection is a no-op. [`Drop`] also
    /// closes, as a safety net for early exits; explicit `close` is the
    /// primary discipline.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
            debug_log!("connection closed");
        }
    }

    /// Returns `true` once [`close`][Connection::close] has run.
    pub fn is_closed(&self) -> bool {
        self.session.is_none()
    }

    pub(crate) fn parts(&mut self) -> Result<(&mut S, &mut Hooks)> {
        match self.session.as_mut() {
            Some(session) => Ok((session, &mut self.hooks)),
            None => Err(Error::closed()),
        }
    }
}

impl<S: Session> Drop for Connection<S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<S: Session> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &if self.is_closed() { "closed" } else { "connected" })
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Server version triple reported by `SELECT version()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ServerVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Extract `major.minor.patch` from a `SELECT version()` banner.
///
/// Missing minor/patch components default to zero; a version token that is
/// not purely numeric does not match.
fn parse_server_version(banner: &str) -> Option<ServerVersion> {
    let numeric = banner
        .split_whitespace()
        .find(|t|t.starts_with(|c: char|c.is_ascii_digit()))?;

    let mut parts = numeric.split('.');
    let major = parts.next()?.parse().ok()?;
    let mut component = ||match parts.next() {
        Some(part) => part.parse().ok(),
        None => Some(0),
    };
    let minor = component()?;
    let patch = component()?;

    Some(ServerVersion { major, minor, patch })
}
