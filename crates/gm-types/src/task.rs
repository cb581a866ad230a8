//! Task lifecycle types shared between the store and the worker loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one task row.
///
/// `Pending --claim--> Running --success--> Terminated`;
/// `Running --failure--> Pending`. Terminated is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Terminated,
}

impl TaskStatus {
    /// Stored string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Terminated => "TERMINATED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(TaskStatus::Pending),
            "RUNNING" => Some(TaskStatus::Running),
            "TERMINATED" => Some(TaskStatus::Terminated),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Host and pid of the process that owns a row while it is running, or that
/// last touched it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub host: String,
    pub pid: u32,
}

impl WorkerIdentity {
    pub fn current() -> Self {
        let host = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("HOST"))
            .unwrap_or_else(|_| "unknown-host".to_string());
        Self {
            host,
            pid: std::process::id(),
        }
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.pid)
    }
}

/// Outcome of one worker invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Tasks this worker committed as TERMINATED during this invocation.
    pub completed: u64,
    /// Whether the whole sweep was observed complete after the queue drained.
    pub swept_clean: bool,
    pub finished_at: DateTime<Utc>,
}
