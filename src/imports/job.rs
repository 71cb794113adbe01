use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// Four-way classification of a pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl StepStatus {
    pub fn from_server(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" => Self::Pending,
            "running" | "in_progress" => Self::Running,
            "success" | "completed" | "skipped" => Self::Success,
            "failed" | "error" => Self::Failed,
            other => {
                tracing::debug!(status = other, "unrecognized step status, treating as pending");
                Self::Pending
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStep {
    pub id: String,
    pub name: String,
    pub status: StepStatus,
}

impl JobStep {
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: StepStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
        }
    }
}

/// Top-level status the server reports for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Success,
    Error,
    Other(String),
}

impl JobStatus {
    pub fn from_server(raw: &str) -> Self {
        match raw.trim() {
            "running" => Self::Running,
            "success" => Self::Success,
            "error" => Self::Error,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
            Self::Other(raw) => raw,
        }
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One server-side SQL import attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportJob {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub steps: Vec<JobStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotStep {
    pub name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub output: Vec<String>,
    pub error: Option<String>,
}

impl SnapshotStep {
    pub fn failed(&self) -> bool {
        self.result.as_deref() == Some("failed")
    }
}

/// Independently updated import progress blob. It may describe an older job
/// than the current [`ImportJob`]; correlate by timestamp before trusting it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportStatusSnapshot {
    pub db_operation_in_progress: bool,
    pub import_in_progress: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<SnapshotStep>,
}

/// Everything one SQL status round trip returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlImportStatus {
    pub job: Option<ImportJob>,
    pub snapshot: Option<ImportStatusSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaStatus {
    Initializing,
    Initialized,
    Running,
    Completing,
    Ran,
    Validating,
    Validated,
    Completed,
    Failed,
    Aborting,
    Aborted,
    Unknown,
}

impl MediaStatus {
    pub fn from_server(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "INITIALIZING" => Self::Initializing,
            "INITIALIZED" => Self::Initialized,
            "RUNNING" => Self::Running,
            "COMPLETING" => Self::Completing,
            "RAN" => Self::Ran,
            "VALIDATING" => Self::Validating,
            "VALIDATED" => Self::Validated,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "ABORTING" => Self::Aborting,
            "ABORTED" => Self::Aborted,
            other => {
                tracing::debug!(status = other, "unrecognized media import status");
                Self::Unknown
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::Initialized => "INITIALIZED",
            Self::Running => "RUNNING",
            Self::Completing => "COMPLETING",
            Self::Ran => "RAN",
            Self::Validating => "VALIDATING",
            Self::Validated => "VALIDATED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Aborting => "ABORTING",
            Self::Aborted => "ABORTED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileError {
    pub file_name: String,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FailureDetails {
    pub previous_status: Option<MediaStatus>,
    pub global_errors: Vec<String>,
    pub file_errors: Vec<FileError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaImportStatus {
    pub import_id: Option<i64>,
    pub site_id: Option<i64>,
    pub status: MediaStatus,
    pub files_total: u64,
    pub files_processed: u64,
    pub failure_details: Option<FailureDetails>,
}

/// The app and environment an import is being watched for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportTarget {
    pub app_id: i64,
    pub app_name: String,
    pub env_id: i64,
    pub env_type: String,
    pub primary_domain: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_vocabulary_maps_to_four_states() {
        assert_eq!(StepStatus::from_server("queued"), StepStatus::Pending);
        assert_eq!(StepStatus::from_server("RUNNING"), StepStatus::Running);
        assert_eq!(StepStatus::from_server("skipped"), StepStatus::Success);
        assert_eq!(StepStatus::from_server("error"), StepStatus::Failed);
        assert_eq!(StepStatus::from_server("mystery"), StepStatus::Pending);
    }

    #[test]
    fn job_status_keeps_unknown_values() {
        let status = JobStatus::from_server("cancelled");
        assert_eq!(status, JobStatus::Other("cancelled".into()));
        assert_eq!(status.as_str(), "cancelled");
        assert_eq!(serde_json::to_string(&JobStatus::Error).unwrap(), "\"error\"");
    }

    #[test]
    fn media_status_is_case_insensitive() {
        assert_eq!(MediaStatus::from_server("validated"), MediaStatus::Validated);
        assert_eq!(MediaStatus::from_server("???"), MediaStatus::Unknown);
    }
}
