//! GraphQL queries and the wire-to-domain conversions for import status.
//!
//! Wire structs mirror the server's JSON loosely (ids may be numbers or
//! strings, timestamps come in several shapes). Everything is converted to
//! the types in [`super::job`] here, so nothing downstream sees raw JSON.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{
    FailureDetails, FileError, ImportJob, ImportStatusSnapshot, ImportTarget, JobStatus, JobStep,
    MediaImportStatus, MediaStatus, SnapshotStep, SqlImportStatus, StepStatus,
};
use super::poll::StatusFetcher;
use crate::http::{ApiClient, TransportError};

const SQL_STATUS_QUERY: &str = r#"
query SqlImportStatus($appId: Int, $envId: Int) {
  app(id: $appId) {
    environments(id: $envId) {
      id
      jobs(types: "sql_import") {
        id
        type
        createdAt
        completedAt
        progress {
          status
          steps { id name status }
        }
      }
      importStatus {
        dbOperationInProgress
        importInProgress
        progress {
          started_at
          finished_at
          steps { name started_at finished_at result output error }
        }
      }
    }
  }
}
"#;

const MEDIA_STATUS_QUERY: &str = r#"
query MediaImportStatus($appId: Int, $envId: Int) {
  app(id: $appId) {
    environments(id: $envId) {
      id
      mediaImportStatus {
        importId
        siteId
        status
        filesTotal
        filesProcessed
        failureDetails {
          previousStatus
          globalErrors
          fileErrors { fileName errors }
        }
      }
    }
  }
}
"#;

const TARGET_QUERY: &str = r#"
query ImportTarget($appId: Int, $envId: Int) {
  app(id: $appId) {
    id
    name
    environments(id: $envId) {
      id
      type
      primaryDomain { name }
    }
  }
}
"#;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AppEnvVars {
    app_id: i64,
    env_id: i64,
}

impl AppEnvVars {
    fn of(target: &ImportTarget) -> Self {
        Self {
            app_id: target.app_id,
            env_id: target.env_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AppData<E> {
    app: Option<WireApp<E>>,
}

#[derive(Debug, Deserialize)]
struct WireApp<E> {
    name: Option<String>,
    environments: Option<Vec<E>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireId {
    Int(i64),
    Text(String),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            Self::Int(id) => id.to_string(),
            Self::Text(id) => id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireOutput {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SqlEnvironment {
    jobs: Option<Vec<WireJob>>,
    import_status: Option<WireImportStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireJob {
    id: WireId,
    created_at: Option<WireTimestamp>,
    completed_at: Option<WireTimestamp>,
    progress: Option<WireJobProgress>,
}

#[derive(Debug, Deserialize)]
struct WireJobProgress {
    status: Option<String>,
    steps: Option<Vec<WireJobStep>>,
}

#[derive(Debug, Deserialize)]
struct WireJobStep {
    id: WireId,
    name: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireImportStatus {
    db_operation_in_progress: Option<bool>,
    import_in_progress: Option<bool>,
    progress: Option<WireSnapshot>,
}

#[derive(Debug, Deserialize)]
struct WireSnapshot {
    started_at: Option<WireTimestamp>,
    finished_at: Option<WireTimestamp>,
    steps: Option<Vec<WireSnapshotStep>>,
}

#[derive(Debug, Deserialize)]
struct WireSnapshotStep {
    name: String,
    started_at: Option<WireTimestamp>,
    finished_at: Option<WireTimestamp>,
    result: Option<String>,
    output: Option<WireOutput>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaEnvironment {
    media_import_status: Option<WireMediaStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMediaStatus {
    import_id: Option<i64>,
    site_id: Option<i64>,
    status: Option<String>,
    files_total: Option<u64>,
    files_processed: Option<u64>,
    failure_details: Option<WireFailureDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFailureDetails {
    previous_status: Option<String>,
    global_errors: Option<Vec<String>>,
    file_errors: Option<Vec<WireFileError>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFileError {
    file_name: String,
    errors: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetEnvironment {
    id: Option<i64>,
    #[serde(rename = "type")]
    env_type: Option<String>,
    primary_domain: Option<WireDomain>,
}

#[derive(Debug, Deserialize)]
struct WireDomain {
    name: Option<String>,
}

fn first_environment<E>(data: AppData<E>) -> Result<E, TransportError> {
    data.app
        .and_then(|app| app.environments)
        .and_then(|envs| envs.into_iter().next())
        .ok_or_else(|| {
            TransportError::Schema("Unable to determine import status from environment".to_string())
        })
}

/// Smallest job timestamp taken as epoch milliseconds (March 1973). Anything
/// below is almost certainly epoch seconds and would defeat the stale-snapshot
/// check, so it is refused instead of guessed at.
const MIN_JOB_MILLIS: f64 = 100_000_000_000.0;

/// Job timestamps: RFC 3339 text, or epoch milliseconds.
fn job_time(raw: Option<WireTimestamp>) -> Result<Option<DateTime<Utc>>, TransportError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let millis = match raw {
        WireTimestamp::Number(millis) => millis,
        WireTimestamp::Text(text) => match text.trim().parse::<f64>() {
            Ok(millis) => millis,
            Err(_) => {
                return DateTime::parse_from_rfc3339(text.trim())
                    .map(|at| Some(at.with_timezone(&Utc)))
                    .map_err(|err| TransportError::Schema(format!("bad job timestamp {text:?}: {err}")));
            }
        },
    };
    if millis.is_nan() || millis < MIN_JOB_MILLIS {
        return Err(TransportError::Schema(format!(
            "job timestamp {millis} is not in epoch milliseconds"
        )));
    }
    DateTime::from_timestamp_millis(millis as i64)
        .map(Some)
        .ok_or_else(|| TransportError::Schema(format!("job timestamp out of range: {millis}")))
}

/// Snapshot timestamps: epoch seconds, possibly fractional.
fn snapshot_time(raw: Option<WireTimestamp>) -> Result<Option<DateTime<Utc>>, TransportError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let secs = match raw {
        WireTimestamp::Number(secs) => secs,
        WireTimestamp::Text(text) => match text.trim().parse::<f64>() {
            Ok(secs) => secs,
            Err(_) => {
                return DateTime::parse_from_rfc3339(text.trim())
                    .map(|at| Some(at.with_timezone(&Utc)))
                    .map_err(|err| {
                        TransportError::Schema(format!("bad snapshot timestamp {text:?}: {err}"))
                    });
            }
        },
    };
    let whole = secs.trunc();
    let nanos = ((secs - whole) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
        .map(Some)
        .ok_or_else(|| TransportError::Schema(format!("snapshot timestamp out of range: {secs}")))
}

impl TryFrom<WireJob> for ImportJob {
    type Error = TransportError;

    fn try_from(wire: WireJob) -> Result<Self, Self::Error> {
        let progress = wire.progress.unwrap_or(WireJobProgress {
            status: None,
            steps: None,
        });
        let steps = progress
            .steps
            .unwrap_or_default()
            .into_iter()
            .map(|step| {
                let id = step.id.into_string();
                let name = step.name.unwrap_or_else(|| id.clone());
                let status = step
                    .status
                    .as_deref()
                    .map(StepStatus::from_server)
                    .unwrap_or(StepStatus::Pending);
                JobStep::new(id, name, status)
            })
            .collect();

        Ok(Self {
            id: wire.id.into_string(),
            created_at: job_time(wire.created_at)?,
            completed_at: job_time(wire.completed_at)?,
            status: JobStatus::from_server(progress.status.as_deref().unwrap_or("unknown")),
            steps,
        })
    }
}

impl TryFrom<WireSnapshotStep> for SnapshotStep {
    type Error = TransportError;

    fn try_from(wire: WireSnapshotStep) -> Result<Self, Self::Error> {
        let output = match wire.output {
            Some(WireOutput::One(line)) => vec![line],
            Some(WireOutput::Many(lines)) => lines,
            None => Vec::new(),
        };
        Ok(Self {
            name: wire.name,
            started_at: snapshot_time(wire.started_at)?,
            finished_at: snapshot_time(wire.finished_at)?,
            result: wire.result,
            output,
            error: wire.error,
        })
    }
}

impl TryFrom<WireImportStatus> for ImportStatusSnapshot {
    type Error = TransportError;

    fn try_from(wire: WireImportStatus) -> Result<Self, Self::Error> {
        let progress = wire.progress.unwrap_or(WireSnapshot {
            started_at: None,
            finished_at: None,
            steps: None,
        });
        Ok(Self {
            db_operation_in_progress: wire.db_operation_in_progress.unwrap_or(false),
            import_in_progress: wire.import_in_progress.unwrap_or(false),
            started_at: snapshot_time(progress.started_at)?,
            finished_at: snapshot_time(progress.finished_at)?,
            steps: progress
                .steps
                .unwrap_or_default()
                .into_iter()
                .map(SnapshotStep::try_from)
                .collect::<Result<_, _>>()?,
        })
    }
}

impl From<WireMediaStatus> for MediaImportStatus {
    fn from(wire: WireMediaStatus) -> Self {
        let failure_details = wire.failure_details.map(|details| FailureDetails {
            previous_status: details.previous_status.as_deref().map(MediaStatus::from_server),
            global_errors: details.global_errors.unwrap_or_default(),
            file_errors: details
                .file_errors
                .unwrap_or_default()
                .into_iter()
                .map(|file| FileError {
                    file_name: file.file_name,
                    errors: file.errors.unwrap_or_default(),
                })
                .collect(),
        });
        Self {
            import_id: wire.import_id,
            site_id: wire.site_id,
            status: wire
                .status
                .as_deref()
                .map(MediaStatus::from_server)
                .unwrap_or(MediaStatus::Unknown),
            files_total: wire.files_total.unwrap_or(0),
            files_processed: wire.files_processed.unwrap_or(0),
            failure_details,
        }
    }
}

fn sql_status(data: AppData<SqlEnvironment>) -> Result<SqlImportStatus, TransportError> {
    let environment = first_environment(data)?;
    // Newest job first.
    let job = environment
        .jobs
        .and_then(|jobs| jobs.into_iter().next())
        .map(ImportJob::try_from)
        .transpose()?;
    let snapshot = environment
        .import_status
        .map(ImportStatusSnapshot::try_from)
        .transpose()?;
    Ok(SqlImportStatus { job, snapshot })
}

fn media_status(data: AppData<MediaEnvironment>) -> Result<Option<MediaImportStatus>, TransportError> {
    let environment = first_environment(data)?;
    Ok(environment
        .media_import_status
        .filter(|status| status.status.is_some())
        .map(MediaImportStatus::from))
}

pub struct SqlStatusFetcher {
    client: ApiClient,
}

impl SqlStatusFetcher {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusFetcher for SqlStatusFetcher {
    type Status = SqlImportStatus;

    async fn fetch(&self, target: &ImportTarget) -> Result<SqlImportStatus, TransportError> {
        let data = self
            .client
            .graphql(SQL_STATUS_QUERY, AppEnvVars::of(target))
            .await?;
        sql_status(data)
    }
}

pub struct MediaStatusFetcher {
    client: ApiClient,
}

impl MediaStatusFetcher {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusFetcher for MediaStatusFetcher {
    type Status = Option<MediaImportStatus>;

    async fn fetch(&self, target: &ImportTarget) -> Result<Option<MediaImportStatus>, TransportError> {
        let data = self
            .client
            .graphql(MEDIA_STATUS_QUERY, AppEnvVars::of(target))
            .await?;
        media_status(data)
    }
}

/// Resolve app and environment ids to the names shown while watching.
pub async fn fetch_target(client: &ApiClient, app_id: i64, env_id: i64) -> Result<ImportTarget> {
    let data: AppData<TargetEnvironment> = client
        .graphql(TARGET_QUERY, AppEnvVars { app_id, env_id })
        .await?;
    target_from(data, app_id, env_id)
}

fn target_from(data: AppData<TargetEnvironment>, app_id: i64, env_id: i64) -> Result<ImportTarget> {
    let app = data
        .app
        .ok_or_else(|| anyhow!("app {app_id} not found or not accessible with this token"))?;
    let app_name = app.name.unwrap_or_else(|| app_id.to_string());
    let environment = app
        .environments
        .and_then(|envs| envs.into_iter().next())
        .ok_or_else(|| anyhow!("environment {env_id} not found for app {app_name}"))?;

    Ok(ImportTarget {
        app_id,
        app_name,
        env_id: environment.id.unwrap_or(env_id),
        env_type: environment.env_type.unwrap_or_else(|| "unknown".to_string()),
        primary_domain: environment.primary_domain.and_then(|domain| domain.name),
    })
}
