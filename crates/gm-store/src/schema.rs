//! Task table bootstrap and append-only column evolution.
//!
//! Columns are matched purely by name and are never renamed or dropped.
//! Parameter columns carry a default so that rows created by an earlier run
//! with a smaller parameter set read back the declared default.

use gm_types::{Parameter, ScalarType, ScalarValue, StoreError};
use rusqlite::Connection;

/// Column-name prefix for result values, created lazily the first time any
/// task returns that key.
pub const RESULT_COLUMN_PREFIX: &str = "ret_";

/// Column-name prefix for forced-override audit values.
pub const FORCE_COLUMN_PREFIX: &str = "force_";

/// Descriptor for one dynamically added column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub storage_type: &'static str,
    pub default: Option<ScalarValue>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, ty: ScalarType, default: Option<ScalarValue>) -> Self {
        Self {
            name: name.into(),
            storage_type: ty.storage_type(),
            default,
        }
    }

    /// Column spec for a declared parameter.
    pub fn param(parameter: &Parameter) -> Self {
        Self::new(
            parameter.column_name(),
            parameter.base_type,
            Some(parameter.default.clone()),
        )
    }

    /// Column spec for a result key, typed from its first-seen value.
    pub fn result(key: &str, value: &ScalarValue) -> Self {
        Self::new(
            format!("{RESULT_COLUMN_PREFIX}{key}"),
            value.scalar_type(),
            None,
        )
    }

    /// Column spec for a forced-override audit value.
    pub fn force(name: &str, value: &ScalarValue) -> Self {
        Self::new(
            format!("{FORCE_COLUMN_PREFIX}{name}"),
            value.scalar_type(),
            None,
        )
    }
}

/// Idempotently create the task table with its fixed system columns.
pub fn ensure_task_table(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            host TEXT NOT NULL,
            pid INTEGER NOT NULL,
            run_at INTEGER,
            duration_min REAL,
            status TEXT DEFAULT 'PENDING'
        );",
    )?;
    Ok(())
}

/// Current column names of the task table.
pub fn table_columns(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare("PRAGMA table_info(tasks)")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Add every column not already present, leaving existing data untouched.
/// Returns how many columns were added.
pub fn ensure_columns(conn: &Connection, specs: &[ColumnSpec]) -> Result<usize, StoreError> {
    let existing = table_columns(conn)?;
    let mut added = 0;
    for spec in specs {
        if existing.iter().any(|column| column == &spec.name) {
            continue;
        }
        let statement = match &spec.default {
            Some(default) => format!(
                "ALTER TABLE tasks ADD COLUMN {} {} DEFAULT {}",
                spec.name,
                spec.storage_type,
                sql_literal(default)
            ),
            None => format!(
                "ALTER TABLE tasks ADD COLUMN {} {}",
                spec.name, spec.storage_type
            ),
        };
        tracing::debug!("Evolving schema: {}", statement);
        conn.execute(&statement, [])?;
        added += 1;
    }
    Ok(added)
}

/// Render a default value as a SQL literal for ALTER TABLE, which does not
/// accept bound parameters.
fn sql_literal(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Float(v) => v.to_string(),
        ScalarValue::Int(v) => v.to_string(),
        ScalarValue::Text(v) => format!("'{}'", v.replace('\'', "''")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gm_types::Parameter;
    use rusqlite::Connection;

    fn fresh_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        ensure_task_table(&conn).unwrap();
        conn
    }

    #[test]
    fn table_creation_is_idempotent() {
        let conn = fresh_conn();
        ensure_task_table(&conn).unwrap();
        let columns = table_columns(&conn).unwrap();
        assert!(columns.contains(&"id".to_string()));
        assert!(columns.contains(&"status".to_string()));
    }

    #[test]
    fn columns_are_appended_once() {
        let conn = fresh_conn();
        let alpha = Parameter::float("alpha", 0.5, [0.0, 0.5]).unwrap();
        let specs = vec![ColumnSpec::param(&alpha)];

        assert_eq!(ensure_columns(&conn, &specs).unwrap(), 1);
        assert_eq!(ensure_columns(&conn, &specs).unwrap(), 0);
        assert!(table_columns(&conn).unwrap().contains(&"param_alpha".to_string()));
    }

    #[test]
    fn late_column_backfills_default() {
        let conn = fresh_conn();
        conn.execute(
            "INSERT INTO tasks (host, pid) VALUES ('h', 1)",
            [],
        )
        .unwrap();

        let gpu = Parameter::int("gpu", 0, [0]).unwrap();
        ensure_columns(&conn, &[ColumnSpec::param(&gpu)]).unwrap();

        let value: i64 = conn
            .query_row("SELECT param_gpu FROM tasks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(value, 0);
    }

    #[test]
    fn text_defaults_are_quoted() {
        let conn = fresh_conn();
        let dataset = Parameter::text("dataset", "d'1", ["d'1", "d2"]).unwrap();
        ensure_columns(&conn, &[ColumnSpec::param(&dataset)]).unwrap();

        conn.execute("INSERT INTO tasks (host, pid) VALUES ('h', 1)", [])
            .unwrap();
        let value: String = conn
            .query_row("SELECT param_dataset FROM tasks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(value, "d'1");
    }
}
