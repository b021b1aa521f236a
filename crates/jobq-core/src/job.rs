use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type JobId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        }
    }

    /// Unknown names map to `None`; listing an unknown state yields nothing.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobState::Pending),
            "processing" => Some(JobState::Processing),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            "dead" => Some(JobState::Dead),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub command: String,

    pub state: JobState,

    pub attempts: i64,
    pub max_retries: i64,
    pub priority: i64,

    pub created_at: String,
    pub updated_at: String,
    pub run_at: Option<String>,

    pub last_error: Option<String>,
    pub locked_by: Option<String>,
    pub lock_until: Option<String>,
}

/// Enqueue request. Only `command` is required; everything else has a default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewJob {
    pub id: Option<String>,
    pub command: String,
    pub max_retries: Option<i64>,
    pub priority: Option<i64>,
    pub run_at: Option<String>,
}

/// Snapshot of the fields preserved across a move to the dead letter queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqPayload {
    pub id: JobId,
    pub command: String,
    pub max_retries: i64,
    pub priority: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub id: String,
    pub job_id: JobId,
    pub payload: DlqPayload,
    pub dead_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRow {
    pub id: String,
    pub pid: i64,
    pub started_at: String,
    pub heartbeat_at: String,
}

/// Aggregate counts returned by `status`, also served by the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QueueStatus {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub dead: i64,
    pub active_workers: i64,
    pub oldest_pending: Option<String>,
}

/// `"<prefix>_<8-hex-chars>"`, e.g. `job_3f9ac1d2` or `worker_b0e51f77`.
pub fn generate_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..8])
}

/// Truncate a diagnostic string to `max` characters on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
