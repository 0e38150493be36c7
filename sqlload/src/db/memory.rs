use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::db::{Connector, DbError, Param, QueryResult, DB};

type Rows = BTreeMap<i64, String>;

#[derive(Default)]
struct Tables {
    schema: String,
    tables: HashMap<String, Rows>,
    next_id: HashMap<String, i64>,
}

/// In-process table store standing in for a database server in dry runs and
/// tests. Each table is `id -> name`. Statements are understood only as far as
/// the driver's own patterns need: referenced tables must exist, writes and
/// point lookups are keyed on the last integer parameter, and every other
/// select returns the row count of its first table.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Tables>>,
    connections: Arc<Mutex<u64>>,
    closed: Arc<Mutex<u64>>,
}

impl MemoryStore {
    pub fn new(schema: &str) -> Self {
        MemoryStore {
            inner: Arc::new(Mutex::new(Tables {
                schema: schema.to_string(),
                ..Default::default()
            })),
            connections: Arc::new(Mutex::new(0)),
            closed: Arc::new(Mutex::new(0)),
        }
    }

    /// Creates `table` with `rows` sequential ids starting at 1.
    pub fn create_table(&self, table: &str, rows: i64) {
        let mut x = self.inner.lock();
        let mut data = Rows::new();
        for id in 1..=rows {
            data.insert(id, format!("{}_{}", table, id));
        }
        x.tables.insert(table.to_string(), data);
        x.next_id.insert(table.to_string(), rows + 1);
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.inner.lock().tables.get(table).map(|t| t.len())
    }

    /// Total connections ever opened against this store.
    pub fn connections_opened(&self) -> u64 {
        *self.connections.lock()
    }

    /// Connections closed by their owner, as opposed to dropped.
    pub fn connections_closed(&self) -> u64 {
        *self.closed.lock()
    }

    fn run(&self, sql: &str, params: &[Param]) -> Result<QueryResult, DbError> {
        let referenced = referenced_tables(sql);
        let mut x = self.inner.lock();
        for t in &referenced {
            if !x.tables.contains_key(t) {
                return Err(DbError::Rejected(format!(
                    "Table '{}.{}' doesn't exist",
                    x.schema, t
                )));
            }
        }
        let first = referenced
            .first()
            .cloned()
            .ok_or_else(|| DbError::Rejected(format!("no table referenced in {:?}", sql)))?;
        let key = params.iter().rev().find_map(|p| match p {
            Param::Int(v) => Some(*v),
            _ => None,
        });
        let text = params.iter().find_map(|p| match p {
            Param::Text(s) => Some(s.clone()),
            _ => None,
        });

        let verb = sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        match &*verb {
            "INSERT" => {
                let id = {
                    let next = x.next_id.entry(first.clone()).or_insert(1);
                    let id = *next;
                    *next += 1;
                    id
                };
                let rows = x.tables.entry(first).or_default();
                rows.insert(id, text.unwrap_or_default());
                Ok(QueryResult {
                    rows: 0,
                    rows_affected: 1,
                })
            }
            "UPDATE" => {
                let rows = x.tables.entry(first).or_default();
                let affected = match key.and_then(|k| rows.get_mut(&k)) {
                    Some(v) => {
                        *v = text.unwrap_or_default();
                        1
                    }
                    None => 0,
                };
                Ok(QueryResult {
                    rows: 0,
                    rows_affected: affected,
                })
            }
            "DELETE" => {
                let rows = x.tables.entry(first).or_default();
                let affected = key.and_then(|k| rows.remove(&k)).map_or(0, |_| 1);
                Ok(QueryResult {
                    rows: 0,
                    rows_affected: affected,
                })
            }
            "SELECT" => {
                let rows = &x.tables[&first];
                let n = match key {
                    Some(k) if is_keyed(sql) => usize::from(rows.contains_key(&k)),
                    _ => rows.len(),
                };
                Ok(QueryResult {
                    rows: n,
                    rows_affected: 0,
                })
            }
            other => Err(DbError::Rejected(format!("unsupported statement {:?}", other))),
        }
    }
}

fn is_keyed(sql: &str) -> bool {
    sql.contains(" id = ?") || sql.contains(".id = ?")
}

/// Table names following FROM / INTO / UPDATE / JOIN, in statement order.
fn referenced_tables(sql: &str) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();
    let mut tokens = sql.split_whitespace();
    while let Some(tok) = tokens.next() {
        let tok = tok.to_ascii_uppercase();
        if matches!(&*tok, "FROM" | "INTO" | "UPDATE" | "JOIN") {
            if let Some(name) = tokens.next() {
                let name = name
                    .trim_matches(|c: char| !(c.is_alphanumeric() || c == '_'))
                    .to_string();
                if !name.is_empty() && !tables.contains(&name) {
                    tables.push(name);
                }
            }
        }
    }
    tables
}

pub struct MemoryConnector {
    store: MemoryStore,
}

impl MemoryConnector {
    pub fn new(store: MemoryStore) -> Self {
        MemoryConnector { store }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Conn = MemoryDb;

    async fn connect(&self) -> Result<MemoryDb, DbError> {
        *self.store.connections.lock() += 1;
        Ok(MemoryDb {
            store: self.store.clone(),
        })
    }
}

pub struct MemoryDb {
    store: MemoryStore,
}

#[async_trait]
impl DB for MemoryDb {
    async fn query(&mut self, sql: &str, params: &[Param]) -> Result<QueryResult, DbError> {
        self.store.run(sql, params)
    }

    async fn execute(&mut self, sql: &str, params: &[Param]) -> Result<QueryResult, DbError> {
        self.store.run(sql, params)
    }

    async fn close(self) -> Result<(), DbError> {
        *self.store.closed.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        let s = MemoryStore::new("super_awesome_application");
        s.create_table("customers", 4);
        s.create_table("orders", 6);
        s
    }

    #[test]
    fn finds_tables_behind_keywords() {
        let sql = "SELECT c.id FROM customers c LEFT JOIN orders o ON o.customer_id = c.id \
                   UNION SELECT c.id FROM customers c RIGHT JOIN orders o ON o.customer_id = c.id";
        assert_eq!(referenced_tables(sql), vec!["customers", "orders"]);
        assert_eq!(
            referenced_tables("INSERT INTO competitor (name) VALUES (?)"),
            vec!["competitor"]
        );
    }

    #[test]
    fn missing_table_is_rejected() {
        let err = store()
            .run(
                "UPDATE competitor SET name = ? WHERE id = ?",
                &[Param::Text("x".into()), Param::Int(1)],
            )
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Table 'super_awesome_application.competitor' doesn't exist"
        );
    }

    #[test]
    fn point_lookup_misses_are_empty_results() {
        let s = store();
        let hit = s
            .run("SELECT * FROM customers WHERE id = ?", &[Param::Int(3)])
            .unwrap();
        assert_eq!(hit.rows, 1);
        let miss = s
            .run("SELECT * FROM customers WHERE id = ?", &[Param::Int(999)])
            .unwrap();
        assert_eq!(miss.rows, 0);
    }

    #[test]
    fn writes_change_row_counts() {
        let s = store();
        s.run(
            "INSERT INTO customers (name) VALUES (?)",
            &[Param::Text("Alice_1".into())],
        )
        .unwrap();
        assert_eq!(s.row_count("customers"), Some(5));
        let r = s
            .run("DELETE FROM customers WHERE id = ?", &[Param::Int(5)])
            .unwrap();
        assert_eq!(r.rows_affected, 1);
        let r = s
            .run("DELETE FROM customers WHERE id = ?", &[Param::Int(5)])
            .unwrap();
        assert_eq!(r.rows_affected, 0);
        assert_eq!(s.row_count("customers"), Some(4));
    }
}
