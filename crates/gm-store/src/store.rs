//! The shared task store. One SQLite database is the sole coordination
//! medium between worker processes; every mutation runs inside a transaction
//! scoped to that single logical operation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use gm_types::{
    GmResult, ParamMap, Parameter, ResultMap, ScalarType, ScalarValue, StoreError, TaskStatus,
    WorkerIdentity,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use crate::manifest::Manifest;
use crate::schema::{self, ColumnSpec};

const DB_FILE: &str = "tune.db";
const MANIFEST_FILE: &str = "manifest.json";

/// A row claimed by this process: id, parameter values aligned with the
/// declared parameter order, and the claim timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedTask {
    pub id: i64,
    pub values: Vec<ScalarValue>,
    pub claimed_at: DateTime<Utc>,
}

/// Point-in-time queue summary.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueStatus {
    pub pending: i64,
    pub running: i64,
    pub terminated: i64,
    /// Mean duration of the 20 most recently started terminated tasks.
    pub recent_avg_duration_min: Option<f64>,
}

impl QueueStatus {
    /// Estimated completions per hour given the current running set.
    pub fn throughput_per_hour(&self) -> Option<f64> {
        match self.recent_avg_duration_min {
            Some(avg) if avg > 0.0 && self.running > 0 => {
                Some(60.0 / avg * self.running as f64)
            }
            _ => None,
        }
    }
}

/// Handle on the persistent task store.
pub struct TaskStore {
    conn: Connection,
    dir: PathBuf,
    identity: WorkerIdentity,
}

impl TaskStore {
    /// Open (creating if necessary) the store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> GmResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let conn = Connection::open(dir.join(DB_FILE)).map_err(StoreError::from)?;
        // Concurrent claimants briefly serialize on the write lock.
        conn.busy_timeout(Duration::from_secs(30))
            .map_err(StoreError::from)?;
        Ok(Self {
            conn,
            dir,
            identity: WorkerIdentity::current(),
        })
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// Idempotently create the task table.
    pub fn ensure_schema(&self) -> GmResult<()> {
        schema::ensure_task_table(&self.conn)?;
        Ok(())
    }

    /// Append-only schema evolution (see [`schema::ensure_columns`]).
    pub fn ensure_columns(&self, specs: &[ColumnSpec]) -> GmResult<usize> {
        Ok(schema::ensure_columns(&self.conn, specs)?)
    }

    /// Current column names of the task table.
    pub fn column_names(&self) -> GmResult<Vec<String>> {
        Ok(schema::table_columns(&self.conn)?)
    }

    /// Validate the declared parameters against the compatibility manifest
    /// and rewrite it on success. Fails before any table mutation.
    pub fn check_compatibility(&self, parameters: &[Parameter]) -> GmResult<()> {
        let path = self.manifest_path();
        let mut manifest = Manifest::load(&path)?;
        manifest.reconcile(parameters)?;
        manifest.save(&path)
    }

    /// Read-only variant of [`check_compatibility`](Self::check_compatibility)
    /// used by the planning view.
    pub fn verify_compatibility(&self, parameters: &[Parameter]) -> GmResult<()> {
        Manifest::load(&self.manifest_path())?.verify(parameters)?;
        Ok(())
    }

    /// Count rows matching the given column/value filters, optionally
    /// restricted to one status.
    pub fn count_matching(
        &self,
        filters: &[(String, ScalarValue)],
        status: Option<TaskStatus>,
    ) -> GmResult<i64> {
        let mut clauses: Vec<String> = Vec::with_capacity(filters.len() + 1);
        let mut bound: Vec<SqlValue> = Vec::with_capacity(filters.len() + 1);
        for (column, value) in filters {
            clauses.push(format!("{column} = ?"));
            bound.push(sql_value(value));
        }
        if let Some(status) = status {
            clauses.push("status = ?".to_string());
            bound.push(SqlValue::Text(status.as_str().to_string()));
        }

        let sql = if clauses.is_empty() {
            "SELECT COUNT(*) FROM tasks".to_string()
        } else {
            format!("SELECT COUNT(*) FROM tasks WHERE {}", clauses.join(" AND "))
        };
        let count = self
            .conn
            .query_row(&sql, rusqlite::params_from_iter(bound), |row| row.get(0))
            .map_err(StoreError::from)?;
        Ok(count)
    }

    /// Seed PENDING rows. Each row is stamped with this process's identity,
    /// informational until claimed. All rows land in one transaction.
    pub fn insert_pending(
        &mut self,
        columns: &[String],
        rows: &[Vec<ScalarValue>],
    ) -> GmResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let column_list = std::iter::once("host".to_string())
            .chain(std::iter::once("pid".to_string()))
            .chain(columns.iter().cloned())
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len() + 2].join(", ");
        let sql = format!("INSERT INTO tasks ({column_list}) VALUES ({placeholders})");

        let tx = self
            .conn
            .transaction()
            .map_err(StoreError::from)?;
        {
            let mut stmt = tx.prepare(&sql).map_err(StoreError::from)?;
            for row in rows {
                let mut bound: Vec<SqlValue> = Vec::with_capacity(row.len() + 2);
                bound.push(SqlValue::Text(self.identity.host.clone()));
                bound.push(SqlValue::Integer(self.identity.pid as i64));
                bound.extend(row.iter().map(sql_value));
                stmt.execute(rusqlite::params_from_iter(bound))
                    .map_err(StoreError::from)?;
            }
        }
        tx.commit().map_err(StoreError::from)?;
        info!("Seeded {} pending task(s)", rows.len());
        Ok(rows.len())
    }

    /// Atomically claim one PENDING row: select it (unordered among eligible
    /// rows) and flip it to RUNNING with this process's identity, in a single
    /// IMMEDIATE transaction. The engine's transaction isolation is the sole
    /// double-claim guard. Returns `None` when the queue is drained.
    pub fn claim(&mut self, parameters: &[Parameter]) -> GmResult<Option<ClaimedTask>> {
        let columns: Vec<String> = parameters.iter().map(|p| p.column_name()).collect();
        let select = format!(
            "SELECT id{}{} FROM tasks WHERE status = 'PENDING' ORDER BY RANDOM() LIMIT 1",
            if columns.is_empty() { "" } else { ", " },
            columns.join(", ")
        );

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::from)?;

        let row: Option<(i64, Vec<SqlValue>)> = tx
            .query_row(&select, [], |row| {
                let id: i64 = row.get(0)?;
                let mut raw = Vec::with_capacity(columns.len());
                for idx in 0..columns.len() {
                    raw.push(row.get::<_, SqlValue>(idx + 1)?);
                }
                Ok((id, raw))
            })
            .optional()
            .map_err(StoreError::from)?;

        let Some((id, raw)) = row else {
            tx.commit().map_err(StoreError::from)?;
            debug!("No eligible task; queue drained");
            return Ok(None);
        };

        let claimed_at = Utc::now();
        tx.execute(
            "UPDATE tasks SET host = ?1, pid = ?2, status = 'RUNNING', run_at = ?3 WHERE id = ?4",
            params![
                self.identity.host,
                self.identity.pid,
                claimed_at.timestamp(),
                id
            ],
        )
        .map_err(StoreError::from)?;
        tx.commit().map_err(StoreError::from)?;

        let mut values = Vec::with_capacity(raw.len());
        for (parameter, value) in parameters.iter().zip(raw) {
            values.push(decode(&parameter.column_name(), parameter.base_type, value)?);
        }

        info!("Claimed task {} as {}", id, self.identity);
        Ok(Some(ClaimedTask {
            id,
            values,
            claimed_at,
        }))
    }

    /// Terminal commit: evolve the schema for unseen result and override
    /// columns, then mark the row TERMINATED with its duration, result
    /// values and forced-override audit values.
    pub fn commit_result(
        &mut self,
        id: i64,
        duration_min: f64,
        results: &ResultMap,
        forced: &ParamMap,
    ) -> GmResult<()> {
        let mut specs = Vec::with_capacity(results.len() + forced.len());
        for (key, value) in results {
            gm_types::validate_name(key)?;
            specs.push(ColumnSpec::result(key, value));
        }
        for (name, value) in forced {
            gm_types::validate_name(name)?;
            specs.push(ColumnSpec::force(name, value));
        }

        let tx = self
            .conn
            .transaction()
            .map_err(StoreError::from)?;
        schema::ensure_columns(&tx, &specs)?;

        let mut sets = vec![
            "status = 'TERMINATED'".to_string(),
            "duration_min = ?".to_string(),
        ];
        let mut bound: Vec<SqlValue> = vec![SqlValue::Real(duration_min)];
        for (key, value) in results {
            sets.push(format!("{}{} = ?", schema::RESULT_COLUMN_PREFIX, key));
            bound.push(sql_value(value));
        }
        for (name, value) in forced {
            sets.push(format!("{}{} = ?", schema::FORCE_COLUMN_PREFIX, name));
            bound.push(sql_value(value));
        }
        bound.push(SqlValue::Integer(id));

        let sql = format!("UPDATE tasks SET {} WHERE id = ?", sets.join(", "));
        tx.execute(&sql, rusqlite::params_from_iter(bound))
            .map_err(StoreError::from)?;
        tx.commit().map_err(StoreError::from)?;

        info!("Task {} terminated after {:.3} min", id, duration_min);
        Ok(())
    }

    /// Roll a row back to PENDING so any worker can reclaim it. The prior
    /// host/pid/run_at stay behind as a record of the failed attempt.
    pub fn release(&mut self, id: i64) -> GmResult<()> {
        self.conn
            .execute("UPDATE tasks SET status = 'PENDING' WHERE id = ?1", [id])
            .map_err(StoreError::from)?;
        info!("Task {} released back to PENDING", id);
        Ok(())
    }

    /// `(total rows, terminated rows)`, used by the completion detector.
    pub fn totals(&self) -> GmResult<(i64, i64)> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
            .map_err(StoreError::from)?;
        let terminated: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM tasks WHERE status = 'TERMINATED'",
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::from)?;
        Ok((total, terminated))
    }

    /// Read-only queue summary for operators.
    pub fn queue_status(&self) -> GmResult<QueueStatus> {
        let count = |status: TaskStatus| -> Result<i64, StoreError> {
            Ok(self.conn.query_row(
                "SELECT COUNT(*) FROM tasks WHERE status = ?1",
                [status.as_str()],
                |row| row.get(0),
            )?)
        };
        let recent_avg_duration_min: Option<f64> = self
            .conn
            .query_row(
                "SELECT AVG(duration_min) FROM (
                    SELECT duration_min FROM tasks
                    WHERE status = 'TERMINATED'
                    ORDER BY run_at DESC LIMIT 20
                )",
                [],
                |row| row.get(0),
            )
            .map_err(StoreError::from)?;

        Ok(QueueStatus {
            pending: count(TaskStatus::Pending)?,
            running: count(TaskStatus::Running)?,
            terminated: count(TaskStatus::Terminated)?,
            recent_avg_duration_min,
        })
    }

    /// Maintenance operation: flip RUNNING rows owned by `host` back to
    /// PENDING, returning the affected ids. Never called by the core loop.
    pub fn requeue_host(&mut self, host: &str) -> GmResult<Vec<i64>> {
        let tx = self
            .conn
            .transaction()
            .map_err(StoreError::from)?;
        let ids: Vec<i64> = {
            let mut stmt = tx
                .prepare("SELECT id FROM tasks WHERE status = 'RUNNING' AND host = ?1")
                .map_err(StoreError::from)?;
            let ids = stmt
                .query_map([host], |row| row.get(0))
                .map_err(StoreError::from)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(StoreError::from)?;
            ids
        };
        tx.execute(
            "UPDATE tasks SET status = 'PENDING' WHERE status = 'RUNNING' AND host = ?1",
            [host],
        )
        .map_err(StoreError::from)?;
        tx.commit().map_err(StoreError::from)?;

        if !ids.is_empty() {
            info!("Requeued {} running task(s) on host {}", ids.len(), host);
        }
        Ok(ids)
    }

    /// Status and claim timestamp of one row, for inspection and tests.
    pub fn task_state(&self, id: i64) -> GmResult<TaskSnapshot> {
        let snapshot = self
            .conn
            .query_row(
                "SELECT status, host, pid, run_at, duration_min FROM tasks WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, Option<f64>>(4)?,
                    ))
                },
            )
            .map_err(StoreError::from)?;

        let (status, host, pid, run_at, duration_min) = snapshot;
        let status = TaskStatus::parse(&status).ok_or_else(|| StoreError::Decode {
            column: "status".to_string(),
            found: status.clone(),
        })?;
        Ok(TaskSnapshot {
            status,
            host,
            pid: pid as u32,
            run_at: run_at.and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            duration_min,
        })
    }
}

/// System-column view of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    pub host: String,
    pub pid: u32,
    pub run_at: Option<DateTime<Utc>>,
    pub duration_min: Option<f64>,
}

fn sql_value(value: &ScalarValue) -> SqlValue {
    match value {
        ScalarValue::Float(v) => SqlValue::Real(*v),
        ScalarValue::Int(v) => SqlValue::Integer(*v),
        ScalarValue::Text(v) => SqlValue::Text(v.clone()),
    }
}

fn decode(column: &str, ty: ScalarType, value: SqlValue) -> Result<ScalarValue, StoreError> {
    let decoded = match (ty, &value) {
        (ScalarType::Float, SqlValue::Real(v)) => ScalarValue::Float(*v),
        (ScalarType::Float, SqlValue::Integer(v)) => ScalarValue::Float(*v as f64),
        (ScalarType::Int, SqlValue::Integer(v)) => ScalarValue::Int(*v),
        (ScalarType::Text, SqlValue::Text(v)) => ScalarValue::Text(v.clone()),
        _ => {
            return Err(StoreError::Decode {
                column: column.to_string(),
                found: format!("{value:?}"),
            })
        }
    };
    Ok(decoded)
}
