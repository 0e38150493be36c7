use crate::workloads::StatementClass;

/// Parameters a pattern binds, in placeholder order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamSpec {
    None,
    Key,
    NameFilter,
    Name,
    NameAndKey,
}

#[derive(Clone, Debug)]
pub struct StatementPattern {
    pub name: &'static str,
    pub class: StatementClass,
    pub sql: String,
    pub params: ParamSpec,
}

impl StatementPattern {
    fn new(name: &'static str, class: StatementClass, sql: String, params: ParamSpec) -> Self {
        StatementPattern {
            name,
            class,
            sql,
            params,
        }
    }
}

/// Read catalogue over `table (id, name)` and `join_table (id, <table>_id, amount)`.
pub(crate) fn read_patterns(table: &str, join_table: &str, fk: &str) -> Vec<StatementPattern> {
    use ParamSpec::*;
    use StatementClass::Select;

    vec![
        StatementPattern::new(
            "select_by_id",
            Select,
            format!("SELECT * FROM {table} WHERE id = ?"),
            Key,
        ),
        StatementPattern::new(
            "select_by_name_like",
            Select,
            format!("SELECT * FROM {table} WHERE name LIKE ?"),
            NameFilter,
        ),
        StatementPattern::new(
            "count_all",
            Select,
            format!("SELECT COUNT(*) AS total FROM {table}"),
            None,
        ),
        StatementPattern::new(
            "count_by_name",
            Select,
            format!("SELECT name, COUNT(*) AS total FROM {table} GROUP BY name"),
            None,
        ),
        StatementPattern::new(
            "inner_join",
            Select,
            format!(
                "SELECT t.id, t.name, j.id AS joined_id, j.amount \
                 FROM {table} t INNER JOIN {join_table} j ON j.{fk} = t.id"
            ),
            None,
        ),
        StatementPattern::new(
            "left_join",
            Select,
            format!(
                "SELECT t.id, t.name, j.id AS joined_id \
                 FROM {table} t LEFT JOIN {join_table} j ON j.{fk} = t.id"
            ),
            None,
        ),
        StatementPattern::new(
            "left_join_filtered",
            Select,
            format!(
                "SELECT t.id, t.name, j.id AS joined_id, j.amount \
                 FROM {table} t LEFT JOIN {join_table} j ON j.{fk} = t.id WHERE t.id = ?"
            ),
            Key,
        ),
        // MySQL has no FULL OUTER JOIN. Left join plus the right-only rows;
        // UNION collapses duplicate rows, so the shape is kept as is.
        StatementPattern::new(
            "full_outer_join",
            Select,
            format!(
                "SELECT t.id, t.name, j.id AS joined_id \
                 FROM {table} t LEFT JOIN {join_table} j ON j.{fk} = t.id \
                 UNION \
                 SELECT t.id, t.name, j.id AS joined_id \
                 FROM {table} t RIGHT JOIN {join_table} j ON j.{fk} = t.id WHERE t.id IS NULL"
            ),
            None,
        ),
        StatementPattern::new(
            "having_join",
            Select,
            format!(
                "SELECT t.id, t.name, COUNT(j.id) AS joined_count \
                 FROM {table} t INNER JOIN {join_table} j ON j.{fk} = t.id \
                 GROUP BY t.id, t.name HAVING COUNT(j.id) > 1"
            ),
            None,
        ),
    ]
}

pub(crate) fn insert_pattern(name: &'static str, table: &str) -> StatementPattern {
    StatementPattern::new(
        name,
        StatementClass::Insert,
        format!("INSERT INTO {table} (name) VALUES (?)"),
        ParamSpec::Name,
    )
}

pub(crate) fn update_pattern(name: &'static str, table: &str) -> StatementPattern {
    StatementPattern::new(
        name,
        StatementClass::Update,
        format!("UPDATE {table} SET name = ? WHERE id = ?"),
        ParamSpec::NameAndKey,
    )
}

pub(crate) fn delete_pattern(name: &'static str, table: &str) -> StatementPattern {
    StatementPattern::new(
        name,
        StatementClass::Delete,
        format!("DELETE FROM {table} WHERE id = ?"),
        ParamSpec::Key,
    )
}
