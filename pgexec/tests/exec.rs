//! End-to-end execution tests over a scripted in-memory session.
use std::{
    collections::VecDeque,
    future::{Ready, ready},
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    task::{Context, Poll},
};

use bytes::Bytes;
use pgexec::{
    Connection, Error, ErrorKind, Kind, Row, Value,
    common::ByteStr,
    config::Config,
    connection::ServerVersion,
    encode::Encoded,
    query,
    session::{
        ErrorResponse, FieldDescription, Format, Notice, Notification, Session, SessionEvent,
    },
};

type Script = Vec<Result<SessionEvent, Error>>;

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Simple(String),
    Extended { sql: String, params: Vec<(u32, Option<String>)> },
}

/// Replays one pre-recorded event script per submitted request.
#[derive(Default)]
struct MockSession {
    replies: VecDeque<Script>,
    queue: VecDeque<Result<SessionEvent, Error>>,
    sent: Arc<Mutex<Vec<Sent>>>,
    closed: Arc<AtomicU32>,
}

impl Session for MockSession {
    type Connect = Ready<pgexec::Result<Self>>;

    fn connect(_: Config) -> Self::Connect {
        ready(Ok(Self::default()))
    }

    fn send_simple(&mut self, sql: &str) {
        self.sent.lock().unwrap().push(Sent::Simple(sql.into()));
        self.queue = self.replies.pop_front().expect("unscripted request").into();
    }

    fn send_extended(&mut self, sql: &str, params: &[Encoded<'_>]) {
        let params = params
            .iter()
            .map(|p|(p.oid(), p.value().map(String::from)))
            .collect();
        self.sent.lock().unwrap().push(Sent::Extended { sql: sql.into(), params });
        self.queue = self.replies.pop_front().expect("unscripted request").into();
    }

    fn poll_event(&mut self, _: &mut Context) -> Poll<pgexec::Result<SessionEvent>> {
        Poll::Ready(self.queue.pop_front().expect("script exhausted"))
    }

    fn recover(&mut self) {
        while let Some(event) = self.queue.pop_front() {
            if matches!(event, Ok(SessionEvent::Ready)) {
                break;
            }
        }
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn mock(scripts: Vec<Script>) -> (MockSession, Arc<Mutex<Vec<Sent>>>, Arc<AtomicU32>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(AtomicU32::new(0));
    let session = MockSession {
        replies: scripts.into(),
        queue: VecDeque::new(),
        sent: sent.clone(),
        closed: closed.clone(),
    };
    (session, sent, closed)
}

fn conn(scripts: Vec<Script>) -> Connection<MockSession> {
    Connection::from_session(mock(scripts).0)
}

fn fields(columns: &[(&str, u32)]) -> SessionEvent {
    SessionEvent::RowDescription(
        columns.iter()
            .map(|(name, oid)|FieldDescription {
                name: ByteStr::copy_from_str(name),
                oid: *oid,
                format: Format::Text,
            })
            .collect(),
    )
}

fn row(cells: &[Option<&str>]) -> SessionEvent {
    SessionEvent::Row(
        cells
            .iter()
            .map(|c|c.map(|text|Bytes::copy_from_slice(text.as_bytes())))
            .collect(),
    )
}

fn complete(tag: &str) -> SessionEvent {
    SessionEvent::Complete(ByteStr::copy_from_str(tag))
}

fn notice(message: &str) -> SessionEvent {
    SessionEvent::Notice(Notice {
        severity: ByteStr::from_static("NOTICE"),
        code: None,
        message: ByteStr::copy_from_str(message),
    })
}

fn db_error(code: &'static str, message: &'static str) -> Error {
    ErrorResponse {
        severity: ByteStr::from_static("ERROR"),
        code: ByteStr::from_static(code),
        message: ByteStr::from_static(message),
    }
    .into()
}

fn select_two() -> Script {
    vec![
        Ok(fields(&[("id", 23), ("name", 25)])),
        Ok(row(&[Some("1"), Some("foo")])),
        Ok(row(&[Some("2"), Some("bar")])),
        Ok(complete("SELECT 2")),
        Ok(SessionEvent::Ready),
    ]
}

#[tokio::test]
async fn fetch_all_untyped() {
    let mut conn = conn(vec![select_two()]);

    let rows = query("SELECT id, name FROM t", &mut conn).fetch_all().await.unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][0], Value::Int4(1));
    assert_eq!(rows[0][1].as_str(), Some("foo"));
    assert_eq!(rows[1][0].as_int(), Some(2));
    assert_eq!(rows.fields()[1].name, "name");
    assert_eq!(rows.rows_affected(), 2);
}

#[tokio::test]
async fn extended_path_even_without_params() {
    let (session, sent, _) = mock(vec![
        select_two(),
        vec![Ok(complete("INSERT 0 1")), Ok(SessionEvent::Ready)],
    ]);
    let mut conn = Connection::from_session(session);

    query("SELECT id, name FROM t", &mut conn).fetch_all().await.unwrap();
    let rows = query("INSERT INTO t(id, name) VALUES($1, $2)", &mut conn)
        .bind(7)
        .bind("baz")
        .fetch_all()
        .await
        .unwrap();

    assert!(rows.is_empty());
    assert_eq!(rows.rows_affected(), 1);

    let sent = sent.lock().unwrap();
    assert_eq!(
        sent[0],
        Sent::Extended { sql: "SELECT id, name FROM t".into(), params: vec![] },
    );
    assert_eq!(
        sent[1],
        Sent::Extended {
            sql: "INSERT INTO t(id, name) VALUES($1, $2)".into(),
            params: vec![(23, Some("7".into())), (25, Some("baz".into()))],
        },
    );
}

#[tokio::test]
async fn declared_schema_decodes_and_nulls_pass() {
    let mut conn = conn(vec![vec![
        Ok(fields(&[("n", 25), ("s", 25)])),
        Ok(row(&[Some("123"), None])),
        Ok(complete("SELECT 1")),
        Ok(SessionEvent::Ready),
    ]]);

    let rows = query("SELECT n, s FROM t", &mut conn)
        .types(&[Kind::Int8, Kind::Text])
        .fetch_all()
        .await
        .unwrap();

    // digits in a text column decode under the declared integer kind,
    // NULL decodes as NULL under any declared kind
    assert_eq!(rows[0][0], Value::Int8(123));
    assert!(rows[0][1].is_null());
}

#[tokio::test]
async fn declared_schema_rejects_non_numeric_text() {
    let mut conn = conn(vec![
        vec![
            Ok(fields(&[("n", 25)])),
            Ok(row(&[Some("abc")])),
            Ok(complete("SELECT 1")),
            Ok(SessionEvent::Ready),
        ],
        select_two(),
    ]);

    let err = query("SELECT n FROM t", &mut conn)
        .types(&[Kind::Int4])
        .fetch_all()
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Decode(_)));

    // the decode failure resynchronized the session
    let rows = query("SELECT id, name FROM t", &mut conn).fetch_all().await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn declared_schema_length_mismatch() {
    let mut conn = conn(vec![select_two()]);

    let err = query("SELECT id, name FROM t", &mut conn)
        .types(&[Kind::Int4])
        .fetch_all()
        .await
        .unwrap_err();

    assert!(matches!(err.kind(), ErrorKind::Decode(_)));
}

#[tokio::test]
async fn streamed_matches_materialized() {
    let mut conn = conn(vec![select_two(), select_two()]);

    let buffered: Vec<_> = query("SELECT id, name FROM t", &mut conn)
        .fetch_all()
        .await
        .unwrap()
        .into_iter()
        .map(Row::into_values)
        .collect();

    let mut streamed = Vec::new();
    query("SELECT id, name FROM t", &mut conn)
        .fetch_each(|row|{
            streamed.push(row.into_values());
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(buffered, streamed);
}

#[tokio::test]
async fn handler_error_abandons_remaining_rows() {
    let mut conn = conn(vec![select_two(), select_two()]);

    let mut calls = 0;
    let err = query("SELECT id, name FROM t", &mut conn)
        .fetch_each(|_|{
            calls += 1;
            Err(db_error("P0001", "handler gave up"))
        })
        .await
        .unwrap_err();

    assert_eq!(calls, 1);
    assert!(matches!(err.kind(), ErrorKind::Database(_)));

    // abandoned rows were discarded, the connection is usable again
    let rows = query("SELECT id, name FROM t", &mut conn).fetch_all().await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn exec_all_discards_result_data() {
    let (session, sent, _) = mock(vec![vec![
        Ok(complete("CREATE TABLE")),
        Ok(fields(&[("id", 23)])),
        Ok(row(&[Some("1")])),
        Ok(complete("SELECT 1")),
        Ok(SessionEvent::Ready),
    ]]);
    let mut conn = Connection::from_session(session);

    conn.exec_all("CREATE TABLE t(id int); SELECT * FROM t;").await.unwrap();

    assert_eq!(
        sent.lock().unwrap()[0],
        Sent::Simple("CREATE TABLE t(id int); SELECT * FROM t;".into()),
    );
}

#[tokio::test]
async fn notices_precede_the_rows_they_preceded_on_the_wire() {
    let mut conn = conn(vec![vec![
        Ok(notice("about to scan")),
        Ok(fields(&[("id", 23)])),
        Ok(row(&[Some("1")])),
        Ok(row(&[Some("2")])),
        Ok(complete("SELECT 2")),
        Ok(SessionEvent::Ready),
    ]]);

    let order = Arc::new(Mutex::new(Vec::new()));

    let seen = order.clone();
    conn.on_notice(move |notice|seen.lock().unwrap().push(format!("notice:{}", notice.message)));

    let seen = order.clone();
    query("SELECT id FROM t", &mut conn)
        .fetch_each(move |row|{
            seen.lock().unwrap().push(format!("row:{:?}", row[0].as_int().unwrap()));
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(*order.lock().unwrap(), ["notice:about to scan", "row:1", "row:2"]);
}

#[tokio::test]
async fn second_notice_handler_replaces_first() {
    let with_notice = ||vec![
        Ok(notice("ping")),
        Ok(complete("SELECT 0")),
        Ok(SessionEvent::Ready),
    ];
    let mut conn = conn(vec![with_notice(), with_notice()]);

    let first = Arc::new(AtomicU32::new(0));
    let second = Arc::new(AtomicU32::new(0));

    let count = first.clone();
    conn.on_notice(move |_|{
        count.fetch_add(1, Ordering::SeqCst);
    });
    query("SELECT 1", &mut conn).fetch_all().await.unwrap();

    let count = second.clone();
    conn.on_notice(move |_|{
        count.fetch_add(1, Ordering::SeqCst);
    });
    query("SELECT 1", &mut conn).fetch_all().await.unwrap();

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn notifications_are_routed() {
    let mut conn = conn(vec![vec![
        Ok(fields(&[("id", 23)])),
        Ok(SessionEvent::Notification(Notification {
            channel: ByteStr::from_static("jobs"),
            payload: ByteStr::from_static("42"),
            pid: 99,
        })),
        Ok(row(&[Some("1")])),
        Ok(complete("SELECT 1")),
        Ok(SessionEvent::Ready),
    ]]);

    let received = Arc::new(Mutex::new(Vec::new()));
    let seen = received.clone();
    conn.on_notification(move |n|{
        seen.lock().unwrap().push((n.channel.to_string(), n.payload.to_string(), n.pid));
    });

    let rows = query("SELECT id FROM t", &mut conn).fetch_all().await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(*received.lock().unwrap(), [("jobs".into(), "42".into(), 99u32)]);
}

#[tokio::test]
async fn query_error_aborts_without_poisoning_the_handle() {
    let mut conn = conn(vec![
        vec![
            Ok(fields(&[("id", 23)])),
            Ok(row(&[Some("1")])),
            Err(db_error("42703", "column does not exist")),
            Ok(SessionEvent::Ready),
        ],
        select_two(),
    ]);

    let err = query("SELECT nope FROM t", &mut conn).fetch_all().await.unwrap_err();
    match err.kind() {
        ErrorKind::Database(response) => assert_eq!(response.code, "42703"),
        kind => panic!("expected database error, got {kind:?}"),
    }

    let rows = query("SELECT id, name FROM t", &mut conn).fetch_all().await.unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn version_parses_the_banner() {
    let banner = "PostgreSQL 14.2.1 on x86_64-pc-linux-gnu, compiled by gcc";
    let mut conn = conn(vec![vec![
        Ok(fields(&[("version", 25)])),
        Ok(row(&[Some(banner)])),
        Ok(complete("SELECT 1")),
        Ok(SessionEvent::Ready),
    ]]);

    let version = conn.version().await.unwrap();
    assert_eq!(version, ServerVersion { major: 14, minor: 2, patch: 1 });
}

#[tokio::test]
async fn version_rejects_unrecognized_banner() {
    let mut conn = conn(vec![vec![
        Ok(fields(&[("version", 25)])),
        Ok(row(&[Some("PostgreSQL devel on x86_64")])),
        Ok(complete("SELECT 1")),
        Ok(SessionEvent::Ready),
    ]]);

    let err = conn.version().await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Decode(_)));
}

#[tokio::test]
async fn fetch_one_requires_a_row() {
    let mut conn = conn(vec![vec![
        Ok(fields(&[("id", 23)])),
        Ok(complete("SELECT 0")),
        Ok(SessionEvent::Ready),
    ]]);

    let err = query("SELECT id FROM t WHERE false", &mut conn)
        .fetch_one()
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::RowNotFound(_)));
}

#[tokio::test]
async fn binary_cells_decode_big_endian() {
    let mut conn = conn(vec![vec![
        Ok(SessionEvent::RowDescription(vec![FieldDescription {
            name: ByteStr::from_static("id"),
            oid: 23,
            format: Format::Binary,
        }])),
        Ok(SessionEvent::Row(vec![Some(Bytes::from_static(&[0, 0, 1, 164]))])),
        Ok(complete("SELECT 1")),
        Ok(SessionEvent::Ready),
    ]]);

    let rows = query("SELECT id FROM t", &mut conn).fetch_all().await.unwrap();
    assert_eq!(rows[0][0], Value::Int4(420));
}

#[tokio::test]
async fn close_is_idempotent_and_fences_execution() {
    let (session, _, closed) = mock(vec![]);
    let mut conn = Connection::from_session(session);

    assert!(!conn.is_closed());
    conn.close();
    conn.close();
    assert!(conn.is_closed());
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    let err = query("SELECT 1", &mut conn).fetch_all().await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Closed(_)));
}

#[test]
fn drop_closes_the_session() {
    let (session, _, closed) = mock(vec![]);
    drop(Connection::from_session(session));
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}
