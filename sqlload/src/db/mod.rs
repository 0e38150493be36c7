use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod mysql;
pub use memory::{MemoryConnector, MemoryStore};
pub use mysql::{MySqlConnector, MySqlDb};

/// Positional statement parameter, bound to a `?` placeholder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Param {
    Int(i64),
    Text(String),
}

/// What a statement returned. Selects report `rows`, writes `rows_affected`.
/// An empty row set is still a result.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub rows: usize,
    pub rows_affected: u64,
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("connect failed: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("{0}")]
    Statement(#[from] sqlx::Error),

    #[error("{0}")]
    Rejected(String),
}

/// One open connection, owned by exactly one virtual user.
#[async_trait]
pub trait DB: Send + 'static {
    /// Runs a row-returning statement.
    async fn query(&mut self, sql: &str, params: &[Param]) -> Result<QueryResult, DbError>;

    async fn execute(&mut self, sql: &str, params: &[Param]) -> Result<QueryResult, DbError>;

    async fn close(self) -> Result<(), DbError>;
}

/// Opens connections to one endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: DB;

    async fn connect(&self) -> Result<Self::Conn, DbError>;
}

/// Pre-flight check: open one connection and release it again.
pub async fn probe<C: Connector>(connector: &C) -> Result<(), DbError> {
    let conn = connector.connect().await?;
    conn.close().await
}
