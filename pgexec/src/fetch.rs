//! Query execution futures and streams.
use futures_core::Stream;
use std::{
    mem,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
};

use crate::{
    Result,
    common::{ByteStr, span, verbose},
    connection::Connection,
    encode::Encoded,
    row::{self, DecodeError, Row, Rows},
    session::{FieldDescription, ProtocolError, Session, SessionEvent},
    value::Kind,
};

/// Streaming extended-query execution.
///
/// Submits one parameterized statement through bind/execute, decodes each
/// data row as it arrives, and forwards interleaved notices and
/// notifications to the connection's registered handlers.
///
/// The stream must be polled until completion, otherwise it will disturb
/// subsequent query.
#[derive(Debug)]
#[must_use = "streams do nothing unless polled"]
pub struct ExecStream<'c, 'q, S: Session> {
    conn: &'c mut Connection<S>,
    sql: &'q str,
    params: Vec<Encoded<'q>>,
    schema: &'q [Kind],
    fields: Option<Arc<[FieldDescription]>>,
    tag: Option<ByteStr>,
    phase: Phase,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Submit,
    Description,
    Rows,
    Drain,
    Complete,
}

impl<'c, 'q, S: Session> ExecStream<'c, 'q, S> {
    pub(crate) fn new(
        conn: &'c mut Connection<S>,
        sql: &'q str,
        params: Vec<Encoded<'q>>,
        schema: &'q [Kind],
    ) -> Self {
        Self {
            conn,
            sql,
            params,
            schema,
            fields: None,
            tag: None,
            phase: Phase::Submit,
        }
    }

    /// Stop yielding rows and resynchronize the session.
    fn abandon(&mut self) {
        if let Ok((session, _)) = self.conn.parts() {
            session.recover();
        }
        self.phase = Phase::Complete;
    }
}

impl<S: Session> Stream for ExecStream<'_, '_, S> {
    type Item = Result<Row>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let me = self.get_mut();

        loop {
            if let Phase::Complete = me.phase {
                return Poll::Ready(None);
            }

            let (session, hooks) = match me.conn.parts() {
                Ok(parts) => parts,
                Err(err) => {
                    me.phase = Phase::Complete;
                    return Poll::Ready(Some(Err(err)));
                },
            };

            match me.phase {
                Phase::Submit => {
                    span!("exec", sql = me.sql);
                    session.send_extended(me.sql, &me.params);
                    me.phase = Phase::Description;
                },
                Phase::Description => match ready!(session.poll_event(cx)) {
                    Ok(SessionEvent::RowDescription(fields)) => {
                        if !me.schema.is_empty() && me.schema.len() != fields.len() {
                            session.recover();
                            me.phase = Phase::Complete;
                            let err = DecodeError::ColumnCount {
                                expected: me.schema.len(),
                                found: fields.len(),
                            };
                            return Poll::Ready(Some(Err(err.into())));
                        }
                        me.fields = Some(fields.into());
                        me.phase = Phase::Rows;
                    },
                    // statement yields no rows at all
                    Ok(SessionEvent::Complete(tag)) => {
                        me.tag = Some(tag);
                        me.phase = Phase::Drain;
                    },
                    Ok(SessionEvent::Notice(notice)) => hooks.notice(notice),
                    Ok(SessionEvent::Notification(notification)) => {
                        hooks.notification(notification)
                    },
                    Ok(SessionEvent::Ready) => me.phase = Phase::Complete,
                    Ok(SessionEvent::Row(_)) => {
                        session.recover();
                        me.phase = Phase::Complete;
                        let err = ProtocolError::new("row data before row description");
                        return Poll::Ready(Some(Err(err.into())));
                    },
                    Err(err) => {
                        session.recover();
                        me.phase = Phase::Complete;
                        return Poll::Ready(Some(Err(err)));
                    },
                },
                Phase::Rows => match ready!(session.poll_event(cx)) {
                    Ok(SessionEvent::Row(cells)) => {
                        let fields = me.fields.as_ref().expect("description precedes rows");
                        match row::decode_row(fields, me.schema, cells) {
                            Ok(row) => return Poll::Ready(Some(Ok(row))),
                            Err(err) => {
                                session.recover();
                                me.phase = Phase::Complete;
                                return Poll::Ready(Some(Err(err.into())));
                            },
                        }
                    },
                    Ok(SessionEvent::Complete(tag)) => {
                        me.tag = Some(tag);
                        me.phase = Phase::Drain;
                    },
                    Ok(SessionEvent::Notice(notice)) => hooks.notice(notice),
                    Ok(SessionEvent::Notification(notification)) => {
                        hooks.notification(notification)
                    },
                    Ok(SessionEvent::Ready) => me.phase = Phase::Complete,
                    Ok(SessionEvent::RowDescription(_)) => {
                        session.recover();
                        me.phase = Phase::Complete;
                        let err = ProtocolError::new("duplicate row description");
                        return Poll::Ready(Some(Err(err.into())));
                    },
                    Err(err) => {
                        session.recover();
                        me.phase = Phase::Complete;
                        return Poll::Ready(Some(Err(err)));
                    },
                },
                Phase::Drain => match ready!(session.poll_event(cx)) {
                    Ok(SessionEvent::Ready) => {
                        verbose!("query complete");
                        me.phase = Phase::Complete;
                    },
                    Ok(SessionEvent::Complete(tag)) => me.tag = Some(tag),
                    Ok(SessionEvent::Notice(notice)) => hooks.notice(notice),
                    Ok(SessionEvent::Notification(notification)) => {
                        hooks.notification(notification)
                    },
                    Ok(SessionEvent::RowDescription(_) | SessionEvent::Row(_)) => { },
                    Err(err) => {
                        session.recover();
                        me.phase = Phase::Complete;
                        return Poll::Ready(Some(Err(err)));
                    },
                },
                Phase::Complete => unreachable!(),
            }
        }
    }
}

/// Buffer every row into a [`Rows`].
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct FetchAll<'c, 'q, S: Session> {
    fetch: ExecStream<'c, 'q, S>,
    rows: Vec<Row>,
}

impl<'c, 'q, S: Session> FetchAll<'c, 'q, S> {
    pub(crate) fn new(fetch: ExecStream<'c, 'q, S>) -> Self {
        Self { fetch, rows: vec![] }
    }
}

impl<S: Session> Future for FetchAll<'_, '_, S> {
    type Output = Result<Rows>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();

        while let Some(row) = ready!(Pin::new(&mut me.fetch).poll_next(cx)?) {
            me.rows.push(row);
        }

        let fields = me.fetch.fields.take().unwrap_or_else(||Vec::new().into());
        let tag = me.fetch.tag.take().unwrap_or_default();
        Poll::Ready(Ok(Rows::new(fields, mem::take(&mut me.rows), tag)))
    }
}

/// Fetch the first row, failing when the result is empty.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct FetchOne<'c, 'q, S: Session> {
    fetch: ExecStream<'c, 'q, S>,
    first: Option<Row>,
}

impl<'c, 'q, S: Session> FetchOne<'c, 'q, S> {
    pub(crate) fn new(fetch: ExecStream<'c, 'q, S>) -> Self {
        Self { fetch, first: None }
    }
}

impl<S: Session> Future for FetchOne<'_, '_, S> {
    type Output = Result<Row>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();

        while let Some(row) = ready!(Pin::new(&mut me.fetch).poll_next(cx)?) {
            if me.first.is_none() {
                me.first = Some(row);
            }
        }

        match me.first.take() {
            Some(row) => Poll::Ready(Ok(row)),
            None => Poll::Ready(Err(crate::Error::row_not_found())),
        }
    }
}

/// Invoke a handler once per row, in arrival order, without buffering.
///
/// A handler error abandons the remaining rows and propagates.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct FetchEach<'c, 'q, S: Session, F> {
    fetch: ExecStream<'c, 'q, S>,
    handler: F,
}

impl<'c, 'q, S: Session, F> FetchEach<'c, 'q, S, F> {
    pub(crate) fn new(fetch: ExecStream<'c, 'q, S>, handler: F) -> Self {
        Self { fetch, handler }
    }
}

impl<S, F> Future for FetchEach<'_, '_, S, F>
where
    S: Session,
    F: FnMut(Row) -> Result<()> + Unpin,
{
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();

        while let Some(row) = ready!(Pin::new(&mut me.fetch).poll_next(cx)?) {
            if let Err(err) = (me.handler)(row) {
                me.fetch.abandon();
                return Poll::Ready(Err(err));
            }
        }

        Poll::Ready(Ok(()))
    }
}

impl<S: Session + std::fmt::Debug, F> std::fmt::Debug for FetchEach<'_, '_, S, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchEach").field("fetch", &self.fetch).finish_non_exhaustive()
    }
}

/// Simple-query execution; every piece of result data is discarded.
///
/// Runs one or more semicolon-separated statements without parameters.
#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct ExecAll<'c, 'q, S: Session> {
    conn: &'c mut Connection<S>,
    sql: &'q str,
    submitted: bool,
}

impl<'c, 'q, S: Session> ExecAll<'c, 'q, S> {
    pub(crate) fn new(conn: &'c mut Connection<S>, sql: &'q str) -> Self {
        Self { conn, sql, submitted: false }
    }
}

impl<S: Session> Future for ExecAll<'_, '_, S> {
    type Output = Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let me = self.get_mut();

        loop {
            let (session, hooks) = match me.conn.parts() {
                Ok(parts) => parts,
                Err(err) => return Poll::Ready(Err(err)),
            };

            if !me.submitted {
                span!("exec_all", sql = me.sql);
                session.send_simple(me.sql);
                me.submitted = true;
            }

            match ready!(session.poll_event(cx)) {
                Ok(SessionEvent::Ready) => return Poll::Ready(Ok(())),
                Ok(SessionEvent::Notice(notice)) => hooks.notice(notice),
                Ok(SessionEvent::Notification(notification)) => hooks.notification(notification),
                Ok(
                    SessionEvent::RowDescription(_)
                    | SessionEvent::Row(_)
                    | SessionEvent::Complete(_),
                ) => { },
                Err(err) => {
                    session.recover();
                    return Poll::Ready(Err(err));
                },
            }
        }
    }
}
