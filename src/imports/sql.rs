//! SQL import pipeline: reconciles the job record with the status snapshot.

use std::time::Duration;

use chrono::{DateTime, Local, SecondsFormat, Utc};
use dialoguer::console::style;

use super::job::{ImportJob, ImportTarget, JobStatus, JobStep, SqlImportStatus, StepStatus};
use super::localize::localize_failure;
use super::poll::{FailureReason, ImportFailure, Outcome, Reconciler, Tick};
use super::progress::{ProgressState, ProgressTracker};
use super::report::{DELIMITER, EXIT_PROMPT};
use crate::ui::{capitalize, format_environment};

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
enum SqlPhase {
    Checking,
    Running,
    Finished(JobStatus),
    Failed,
    NoJob,
}

#[derive(Clone)]
pub struct SqlImport {
    target: ImportTarget,
    phase: SqlPhase,
    created_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl SqlImport {
    pub fn new(target: ImportTarget) -> Self {
        Self {
            target,
            phase: SqlPhase::Checking,
            created_at: None,
            completed_at: None,
        }
    }

    fn status_message(&self, state: &ProgressState) -> String {
        match &self.phase {
            SqlPhase::Checking => "Checking...".to_string(),
            SqlPhase::Running if state.all_steps_succeeded() => {
                format!("Finishing up... {}", style(state.sprite()).blue().bright())
            }
            SqlPhase::Running => format!("Running {}", style(state.sprite()).blue().bright()),
            SqlPhase::Finished(JobStatus::Success) => match &self.target.primary_domain {
                Some(domain) => format!(
                    "Success {} imported data should be visible on your site {domain}.",
                    style("✓").green()
                ),
                None => format!("Success {}", style("✓").green()),
            },
            SqlPhase::Finished(other) => {
                format!("{} {}", capitalize(other.as_str()), style("✓").green())
            }
            SqlPhase::Failed => format!("Failed {}", style("✕").red()),
            SqlPhase::NoJob => "No import job found".to_string(),
        }
    }

    fn suffix(&self, state: &ProgressState) -> String {
        let mut suffix = format!(
            "\n{DELIMITER}\nStatus: {}\nSite: {} ({})",
            self.status_message(state),
            self.target.app_name,
            format_environment(&self.target.env_type),
        );

        if matches!(
            self.phase,
            SqlPhase::Running | SqlPhase::Finished(JobStatus::Success) | SqlPhase::Failed
        ) {
            let completed = self.created_at.and(self.completed_at);
            suffix.push_str(&format!(
                "\nSQL Import Started: {}\nSQL Import Completed: {}",
                format_timestamp(self.created_at),
                format_timestamp(completed),
            ));
        }

        suffix.push_str(&format!("\n{DELIMITER}\n"));
        if self.phase == SqlPhase::Running {
            suffix.push_str(EXIT_PROMPT);
        }
        suffix
    }

    /// The suffix is rebuilt on every draw so the spinner keeps turning
    /// between polls.
    fn refresh(&self, tracker: &ProgressTracker) {
        let view = self.clone();
        tracker.set_live_suffix(move |state| view.suffix(state));
    }
}

impl Reconciler for SqlImport {
    type Status = SqlImportStatus;
    type Job = ImportJob;

    fn reconcile(&mut self, status: SqlImportStatus, tracker: &ProgressTracker) -> Tick<ImportJob> {
        let Some(job) = status.job else {
            return Tick::Done(Outcome::NoJobFound);
        };
        tracing::debug!(
            job = %job.id,
            status = job.status.as_str(),
            steps = job.steps.len(),
            "sql import job"
        );
        if let Some(snapshot) = &status.snapshot {
            tracing::debug!(
                db_operation = snapshot.db_operation_in_progress,
                importing = snapshot.import_in_progress,
                started = ?snapshot.started_at,
                finished = ?snapshot.finished_at,
                "sql import snapshot"
            );
        }
        self.created_at = job.created_at;
        self.completed_at = job.completed_at;

        if job.steps.is_empty() {
            return Tick::Done(Outcome::Failure(ImportFailure::new(
                FailureReason::Unattributable,
                "Could not enumerate the import job steps",
            )));
        }

        // The job record can report a step as successful while the snapshot
        // shows it failed; the snapshot wins when it belongs to this job.
        let localized = match (job.created_at, status.snapshot.as_ref()) {
            (Some(created_at), Some(snapshot)) => localize_failure(snapshot, created_at),
            _ => None,
        };
        if let Some(step) = localized {
            tracker.replace_steps(demote_failed_step(job.steps, &step.name));
            let failure = ImportFailure::new(
                FailureReason::LocalizedStep,
                step.error.as_deref().unwrap_or("Import step failed"),
            )
            .with_step(&step.name)
            .with_output(step.output.clone());
            return Tick::Done(Outcome::Failure(failure));
        }

        tracker.replace_steps(job.steps.clone());

        if job.status == JobStatus::Error {
            let mut failure = ImportFailure::new(FailureReason::JobError, "Import job failed");
            if let Some(step) = job.steps.iter().find(|s| s.status == StepStatus::Failed) {
                failure = failure.with_step(&step.id);
            }
            return Tick::Done(Outcome::Failure(failure));
        }

        if job.status != JobStatus::Running && job.completed_at.is_some() {
            return Tick::Done(Outcome::Success { job });
        }

        self.phase = SqlPhase::Running;
        self.refresh(tracker);
        Tick::Pending
    }

    fn settle(&mut self, outcome: &Outcome<ImportJob>, tracker: &ProgressTracker) {
        self.phase = match outcome {
            Outcome::Success { job } => SqlPhase::Finished(job.status.clone()),
            Outcome::Failure(_) => SqlPhase::Failed,
            Outcome::NoJobFound => SqlPhase::NoJob,
        };
        self.refresh(tracker);
    }
}

/// Mark the job step matching a failed snapshot step as failed. Falls back to
/// the `import` step, then the first unfinished step, then the last step.
fn demote_failed_step(mut steps: Vec<JobStep>, snapshot_step: &str) -> Vec<JobStep> {
    let index = steps
        .iter()
        .position(|s| s.id == snapshot_step || s.name == snapshot_step)
        .or_else(|| steps.iter().position(|s| s.id == "import"))
        .or_else(|| steps.iter().position(|s| s.status != StepStatus::Success))
        .or(steps.len().checked_sub(1));
    if let Some(index) = index {
        steps[index].status = StepStatus::Failed;
    }
    steps
}

fn format_timestamp(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => format!(
            "{} ({})",
            at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        None => "TBD".to_string(),
    }
}

/// Follow-up text printed under the final frame. Success and "no job" are
/// already spelled out in the status line.
pub fn explain(outcome: &Outcome<ImportJob>) -> Option<String> {
    match outcome {
        Outcome::Failure(failure) => Some(failure_message(failure)),
        Outcome::Success { .. } | Outcome::NoJobFound => None,
    }
}

fn failure_message(failure: &ImportFailure) -> String {
    let rollback = format!(
        "Your site is {} to the last backup prior to your import job.\n",
        style("automatically being rolled back").blue()
    );
    let mut message = style(format!("Error: {}", failure.error)).red().to_string();

    let step = match failure.reason {
        FailureReason::LocalizedStep => failure.step_name.as_deref(),
        _ => None,
    };
    match (failure.reason, step) {
        (_, Some("import_preflights")) => {
            message.push_str(
                "\nThis error occurred prior to the mysql batch script processing of your SQL file.\n\n\
                 Your site content was not altered.\n\n\
                 If this error persists, please contact support.\n",
            );
        }
        (_, Some("importing_db")) => {
            message.push_str(
                "\nThis error occurred during the mysql batch script processing of your SQL file.\n\n",
            );
            message.push_str(&rollback);
            message.push_str(&server_said(&failure.server_output));
        }
        (_, Some("validating_db")) => {
            message.push_str(
                "\nThis error occurred during the post-import validation of the imported data.\n\n",
            );
            message.push_str(&rollback);
            message.push('\n');
            message.push_str(&server_said(&failure.server_output));
        }
        (FailureReason::FetchError, _) => {
            message.push_str(
                "\nUnable to read the import status. The import itself may still be running; \
                 check again in a few moments.\n",
            );
        }
        _ => {
            message.push_str(
                "\nIf this error persists and you are not sure how to fix it, please contact support.\n",
            );
        }
    }
    message
}

fn server_said(output: &[String]) -> String {
    if output.is_empty() {
        return "Please contact support and include this message along with your sql file."
            .to_string();
    }
    format!(
        "\nPlease inspect your input file and make the appropriate corrections before trying again.\n\
         The server said:\n> {}\n",
        style(output.join(";")).red()
    )
}
