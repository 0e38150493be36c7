use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlConnection};
use sqlx::query::Query;
use sqlx::{Connection, MySql};

use crate::config::RunConfig;
use crate::db::{Connector, DbError, Param, QueryResult, DB};

pub struct MySqlConnector {
    options: MySqlConnectOptions,
}

impl MySqlConnector {
    pub fn new(config: &RunConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);
        MySqlConnector { options }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    type Conn = MySqlDb;

    async fn connect(&self) -> Result<MySqlDb, DbError> {
        let conn = MySqlConnection::connect_with(&self.options)
            .await
            .map_err(DbError::Connect)?;
        Ok(MySqlDb { conn })
    }
}

pub struct MySqlDb {
    conn: MySqlConnection,
}

fn bind<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[Param],
) -> Query<'q, MySql, MySqlArguments> {
    for p in params {
        query = match p {
            Param::Int(v) => query.bind(*v),
            Param::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

#[async_trait]
impl DB for MySqlDb {
    async fn query(&mut self, sql: &str, params: &[Param]) -> Result<QueryResult, DbError> {
        let rows = bind(sqlx::query(sql), params)
            .fetch_all(&mut self.conn)
            .await?;
        Ok(QueryResult {
            rows: rows.len(),
            rows_affected: 0,
        })
    }

    async fn execute(&mut self, sql: &str, params: &[Param]) -> Result<QueryResult, DbError> {
        let done = bind(sqlx::query(sql), params)
            .execute(&mut self.conn)
            .await?;
        Ok(QueryResult {
            rows: 0,
            rows_affected: done.rows_affected(),
        })
    }

    async fn close(self) -> Result<(), DbError> {
        self.conn.close().await?;
        Ok(())
    }
}
