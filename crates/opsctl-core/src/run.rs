//! Run records: one entry per execution of an action.
//!
//! A record is created in `Running` by [`RunRecord::start`] and turned into a
//! terminal record by [`RunRecord::finish`], which consumes it. There is no
//! way back from `Success`/`Failed`, so a finished record is immutable by
//! construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::recap::Summary;

// ---------------------------------------------------------------------------
// RunStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RunOutcome
// ---------------------------------------------------------------------------

/// How an execution ended, as seen by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The process ran to completion. `exit_code` is `None` when it was
    /// terminated by a signal.
    Exited {
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    /// The process was killed at the deadline.
    TimedOut { stdout: String, stderr: String },
    /// The process never started.
    LaunchFailed { error: String },
}

// ---------------------------------------------------------------------------
// RunRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub action_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    pub scheduled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Rendered command line, for diagnosis only.
    #[serde(default)]
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosts: Option<Vec<String>>,
}

impl RunRecord {
    /// Allocate a new `Running` record with a fresh id.
    pub fn start(action_id: impl Into<String>, scheduled: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action_id: action_id.into(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            duration_seconds: None,
            scheduled,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            summary: None,
            error: None,
            command: String::new(),
            hosts: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    pub fn with_hosts(mut self, hosts: Option<Vec<String>>) -> Self {
        self.hosts = hosts;
        self
    }

    /// Close the record with `outcome`, measured as `duration_seconds` long.
    ///
    /// Status is `Success` only for a clean exit with code 0. Whatever stdout
    /// was captured is run through [`crate::recap::parse`].
    pub fn finish(mut self, outcome: RunOutcome, duration_seconds: f64) -> Self {
        match outcome {
            RunOutcome::Exited {
                exit_code,
                stdout,
                stderr,
            } => {
                self.status = if exit_code == Some(0) {
                    RunStatus::Success
                } else {
                    RunStatus::Failed
                };
                self.exit_code = exit_code;
                self.summary = Some(crate::recap::parse(&stdout));
                self.stdout = stdout;
                self.stderr = stderr;
            }
            RunOutcome::TimedOut { stdout, stderr } => {
                self.status = RunStatus::Failed;
                self.summary = Some(crate::recap::parse(&stdout));
                self.stdout = stdout;
                self.stderr = stderr;
                self.error = Some("timed out".to_string());
            }
            RunOutcome::LaunchFailed { error } => {
                self.status = RunStatus::Failed;
                self.error = Some(error);
            }
        }
        self.finished_at = Some(Utc::now());
        self.duration_seconds = Some(duration_seconds.max(0.0));
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
