//! Postgres query execution and result typing over a pluggable protocol
//! session.
//!
//! The crate drives a [`Session`] — the object owning the socket, the
//! startup handshake and the byte-level message codec — and turns its raw
//! protocol events into typed rows, while routing interleaved notices and
//! notifications to registered handlers.
//!
//! # Examples
//!
//! Materialized query:
//!
//! ```no_run
//! use pgexec::{Connection, Kind, Session, query};
//!
//! # async fn app<S: Session>() -> pgexec::Result<()> {
//! let mut conn = Connection::<S>::connect_env().await?;
//!
//! let rows = query("SELECT id, name FROM users WHERE id = $1", &mut conn)
//!     .bind(420)
//!     .types(&[Kind::Int4, Kind::Text])
//!     .fetch_all()
//!     .await?;
//!
//! assert_eq!(rows[0][0].as_int(), Some(420));
//! # Ok(())
//! # }
//! ```
//!
//! Streamed query, one handler call per row, nothing buffered:
//!
//! ```no_run
//! use pgexec::{Connection, Session, query};
//!
//! # async fn app<S: Session>(conn: &mut Connection<S>) -> pgexec::Result<()> {
//! conn.on_notice(|notice|println!("{}: {}", notice.severity, notice.message));
//!
//! query("SELECT generate_series(1, 1000000)", conn)
//!     .fetch_each(|row|{
//!         println!("{:?}", row[0]);
//!         Ok(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod common;
mod ext;

// Configuration
pub mod config;

// Session boundary
pub mod session;

// Encoding
pub mod encode;
pub mod value;
pub mod row;

// Operation
pub mod query;
pub mod fetch;

// Connection
pub mod connection;

mod error;

pub use encode::Encode;
pub use value::{Kind, Value};
pub use row::{Row, Rows, DecodeError};

pub use config::Config;
pub use session::{Notice, Notification, Session, SessionEvent};
pub use connection::{Connection, ServerVersion};
#[doc(inline)]
pub use query::{query, exec_all};
pub use error::{Error, ErrorKind, Result};
