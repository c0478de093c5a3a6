//! PostgreSQL data mart.
//!
//! One connection per load stage. Outside atomic mode every insert is its
//! own implicit transaction, so a failure keeps the rows before it.

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnection, Postgres};
use sqlx::query::Query;
use sqlx::Connection;
use std::collections::HashMap;

use super::schema::{BoundValue, TargetTable};
use super::{InsertOutcome, TargetSession, TargetStore};
use crate::config::redact_uri;
use crate::error::{LoadError, LoadResult};
use crate::models::Cell;

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// The analytical store, tables under `namespace`.
pub struct PostgresTarget {
    uri: String,
    namespace: String,
}

impl PostgresTarget {
    /// `namespace` must already be a validated identifier, see
    /// [`PipelineConfig`](crate::config::PipelineConfig).
    pub fn new(uri: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl TargetStore for PostgresTarget {
    type Session = PostgresSession;

    fn describe(&self) -> String {
        format!("{} (schema {})", redact_uri(&self.uri), self.namespace)
    }

    async fn open(&self) -> LoadResult<PostgresSession> {
        let conn = PgConnection::connect(&self.uri)
            .await
            .map_err(LoadError::Connect)?;
        Ok(PostgresSession {
            conn,
            namespace: self.namespace.clone(),
            statements: HashMap::new(),
        })
    }
}

/// A live connection to the data mart.
pub struct PostgresSession {
    conn: PgConnection,
    namespace: String,
    /// Rendered insert statements by table name.
    statements: HashMap<&'static str, String>,
}

#[async_trait]
impl TargetSession for PostgresSession {
    async fn insert_or_skip(
        &mut self,
        table: &'static TargetTable,
        cells: &[&Cell],
    ) -> LoadResult<InsertOutcome> {
        let values = table.coerce_row(cells)?;

        let namespace = &self.namespace;
        let sql = self
            .statements
            .entry(table.name)
            .or_insert_with(|| table.insert_statement(namespace));

        let query = values
            .into_iter()
            .fold(sqlx::query(sql.as_str()), bind_value);
        let result = query.execute(&mut self.conn).await?;

        Ok(if result.rows_affected() > 0 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::Skipped
        })
    }

    async fn begin(&mut self) -> LoadResult<()> {
        sqlx::query("BEGIN").execute(&mut self.conn).await?;
        Ok(())
    }

    async fn commit(&mut self) -> LoadResult<()> {
        sqlx::query("COMMIT").execute(&mut self.conn).await?;
        Ok(())
    }

    async fn rollback(&mut self) -> LoadResult<()> {
        sqlx::query("ROLLBACK").execute(&mut self.conn).await?;
        Ok(())
    }

    async fn close(self) -> LoadResult<()> {
        self.conn.close().await?;
        Ok(())
    }
}

fn bind_value(query: PgQuery<'_>, value: BoundValue) -> PgQuery<'_> {
    match value {
        BoundValue::Text(v) | BoundValue::Numeric(v) => query.bind(v),
        BoundValue::Flag(v) => query.bind(v),
        BoundValue::Timestamp(v) => query.bind(v),
    }
}
