//! Query API types.
use crate::{
    connection::Connection,
    encode::{Encode, Encoded},
    fetch::{ExecAll, ExecStream, FetchAll, FetchEach, FetchOne},
    row::Row,
    session::Session,
    value::Kind,
};

/// Entrypoint of the query API.
///
/// Always takes the extended (bind/execute) path, even with zero
/// parameters, so results carry column-typed metadata and exactly one
/// statement runs.
pub fn query<'c, 'q, S: Session>(
    sql: &'q str,
    conn: &'c mut Connection<S>,
) -> Query<'c, 'q, S> {
    Query { conn, sql, params: Vec::new(), schema: &[] }
}

/// Run one or more semicolon-separated statements, discarding all results.
pub fn exec_all<'c, 'q, S: Session>(
    sql: &'q str,
    conn: &'c mut Connection<S>,
) -> ExecAll<'c, 'q, S> {
    ExecAll::new(conn, sql)
}

/// The query API.
///
/// Select the call shape with [`bind`][Query::bind] (positional
/// parameters), [`types`][Query::types] (expected-type schema), and one of
/// the `fetch` methods (consumption discipline).
#[derive(Debug)]
#[must_use = "a query does nothing unless fetched"]
pub struct Query<'c, 'q, S: Session> {
    conn: &'c mut Connection<S>,
    sql: &'q str,
    params: Vec<Encoded<'q>>,
    schema: &'q [Kind],
}

impl<'c, 'q, S: Session> Query<'c, 'q, S> {
    /// Bind the next positional query parameter.
    pub fn bind<V: Encode<'q>>(mut self, value: V) -> Self {
        self.params.push(value.encode());
        self
    }

    /// Declare the expected type of each output column.
    ///
    /// Without a schema every column decodes by its wire type id. With one,
    /// its length must equal the result's column count and column `i`
    /// decodes as `schema[i]`.
    pub fn types(mut self, schema: &'q [Kind]) -> Self {
        self.schema = schema;
        self
    }

    /// Fetch rows using the [`Stream`][futures_core::Stream] api.
    ///
    /// The returned stream must be polled/awaited until completion,
    /// otherwise it will disturb subsequent query.
    pub fn fetch(self) -> ExecStream<'c, 'q, S> {
        ExecStream::new(self.conn, self.sql, self.params, self.schema)
    }

    /// Fetch all rows into a materialized [`Rows`][crate::row::Rows].
    pub fn fetch_all(self) -> FetchAll<'c, 'q, S> {
        FetchAll::new(self.fetch())
    }

    /// Fetch the first row.
    pub fn fetch_one(self) -> FetchOne<'c, 'q, S> {
        FetchOne::new(self.fetch())
    }

    /// Invoke `handler` once per row in arrival order, without buffering.
    ///
    /// Rows are not retained after the handler returns; a handler error
    /// abandons the remaining rows and propagates.
    pub fn fetch_each<F>(self, handler: F) -> FetchEach<'c, 'q, S, F>
    where
        F: FnMut(Row) -> crate::Result<()> + Unpin,
    {
        FetchEach::new(self.fetch(), handler)
    }
}
