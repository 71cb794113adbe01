//! Media import pipeline. The server reports a single status value; the
//! step list shown to the user is synthesized from it.

use std::time::Duration;

use dialoguer::console::style;

use super::job::{ImportTarget, JobStep, MediaImportStatus, MediaStatus, StepStatus};
use super::poll::{FailureReason, ImportFailure, Outcome, Reconciler, Tick};
use super::progress::{ProgressState, ProgressTracker};
use super::report::{DELIMITER, EXIT_PROMPT};
use crate::ui::{apply_column_padding, format_environment, header, styled_table, truncate};
use crate::utils::pluralize;

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

const MAX_FILE_ERRORS: usize = 10;

const PHASES: [(&str, &str); 4] = [
    ("initialize", "Initialize import"),
    ("import", "Import files"),
    ("validate", "Validate files"),
    ("complete", "Complete import"),
];

fn phase_index(status: MediaStatus) -> Option<usize> {
    match status {
        MediaStatus::Initializing | MediaStatus::Initialized => Some(0),
        MediaStatus::Running | MediaStatus::Completing | MediaStatus::Ran => Some(1),
        MediaStatus::Validating | MediaStatus::Validated => Some(2),
        MediaStatus::Completed => Some(3),
        MediaStatus::Failed | MediaStatus::Aborting | MediaStatus::Aborted | MediaStatus::Unknown => {
            None
        }
    }
}

/// Steps before `current` are done, `current` has `status`, the rest wait.
fn phase_steps(current: usize, status: StepStatus) -> Vec<JobStep> {
    PHASES
        .iter()
        .enumerate()
        .map(|(index, (id, name))| {
            let step_status = match index.cmp(&current) {
                std::cmp::Ordering::Less => StepStatus::Success,
                std::cmp::Ordering::Equal => status,
                std::cmp::Ordering::Greater => StepStatus::Pending,
            };
            JobStep::new(*id, *name, step_status)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaPhase {
    Checking,
    Active(MediaStatus),
    Failed,
    NoJob,
}

#[derive(Clone)]
pub struct MediaImport {
    target: ImportTarget,
    phase: MediaPhase,
    last_phase: usize,
    files_processed: u64,
    files_total: u64,
}

impl MediaImport {
    pub fn new(target: ImportTarget) -> Self {
        Self {
            target,
            phase: MediaPhase::Checking,
            last_phase: 0,
            files_processed: 0,
            files_total: 0,
        }
    }

    fn status_message(&self, state: &ProgressState) -> String {
        match self.phase {
            MediaPhase::Checking => "Checking...".to_string(),
            MediaPhase::Active(MediaStatus::Completed) => match &self.target.primary_domain {
                Some(domain) => format!(
                    "COMPLETED {} : The imported files should be visible on your site {domain}",
                    style("✓").green()
                ),
                None => format!("COMPLETED {}", style("✓").green()),
            },
            MediaPhase::Active(status @ (MediaStatus::Aborting | MediaStatus::Aborted)) => {
                format!("{} {}", status.as_str(), style("⚠").yellow())
            }
            MediaPhase::Active(status) => {
                format!("{} {}", status.as_str(), style(state.sprite()).blue().bright())
            }
            MediaPhase::Failed => format!("FAILED {}", style("✕").red()),
            MediaPhase::NoJob => "No media import found".to_string(),
        }
    }

    fn is_finished(&self) -> bool {
        matches!(
            self.phase,
            MediaPhase::Failed
                | MediaPhase::NoJob
                | MediaPhase::Active(MediaStatus::Completed | MediaStatus::Aborted)
        )
    }

    fn suffix(&self, state: &ProgressState) -> String {
        let mut suffix = format!(
            "\n{DELIMITER}\nStatus: {}\nApp: {} ({})\nImported Files: {}/{}\n{DELIMITER}\n",
            self.status_message(state),
            self.target.app_name,
            format_environment(&self.target.env_type),
            self.files_processed,
            self.files_total,
        );
        if !self.is_finished() {
            suffix.push_str(EXIT_PROMPT);
        }
        suffix
    }

    fn refresh(&self, tracker: &ProgressTracker) {
        let view = self.clone();
        tracker.set_live_suffix(move |state| view.suffix(state));
    }

    fn failure(&self, status: &MediaImportStatus) -> (ImportFailure, usize) {
        let details = status.failure_details.clone().unwrap_or_default();
        let failed_phase = details.previous_status.and_then(phase_index);

        let mut failure = match details.previous_status {
            Some(previous) => ImportFailure::new(
                FailureReason::LocalizedStep,
                format!("Import failed during {}", previous.as_str()),
            )
            .with_step(PHASES[failed_phase.unwrap_or(self.last_phase)].0),
            None => ImportFailure::new(FailureReason::JobError, "Import FAILED"),
        }
        .with_output(details.global_errors);
        failure.file_errors = details.file_errors;

        (failure, failed_phase.unwrap_or(self.last_phase))
    }
}

impl Reconciler for MediaImport {
    type Status = Option<MediaImportStatus>;
    type Job = MediaImportStatus;

    fn reconcile(
        &mut self,
        status: Option<MediaImportStatus>,
        tracker: &ProgressTracker,
    ) -> Tick<MediaImportStatus> {
        let Some(status) = status else {
            return Tick::Done(Outcome::NoJobFound);
        };
        tracing::debug!(
            import = ?status.import_id,
            site = ?status.site_id,
            status = status.status.as_str(),
            processed = status.files_processed,
            total = status.files_total,
            "media import status"
        );
        self.files_processed = status.files_processed;
        self.files_total = status.files_total;

        match status.status {
            MediaStatus::Failed => {
                let (failure, failed_phase) = self.failure(&status);
                tracker.replace_steps(phase_steps(failed_phase, StepStatus::Failed));
                Tick::Done(Outcome::Failure(failure))
            }
            MediaStatus::Completed => {
                tracker.replace_steps(phase_steps(PHASES.len(), StepStatus::Success));
                Tick::Done(Outcome::Success { job: status })
            }
            MediaStatus::Aborted => {
                tracker.replace_steps(phase_steps(self.last_phase, StepStatus::Pending));
                Tick::Done(Outcome::Success { job: status })
            }
            current => {
                if let Some(index) = phase_index(current) {
                    self.last_phase = index;
                }
                tracker.replace_steps(phase_steps(self.last_phase, StepStatus::Running));
                self.phase = MediaPhase::Active(current);
                self.refresh(tracker);
                Tick::Pending
            }
        }
    }

    fn settle(&mut self, outcome: &Outcome<MediaImportStatus>, tracker: &ProgressTracker) {
        self.phase = match outcome {
            Outcome::Success { job } => MediaPhase::Active(job.status),
            Outcome::Failure(_) => MediaPhase::Failed,
            Outcome::NoJobFound => MediaPhase::NoJob,
        };
        self.refresh(tracker);
    }
}

pub fn explain(outcome: &Outcome<MediaImportStatus>) -> Option<String> {
    match outcome {
        Outcome::Failure(failure) => Some(failure_message(failure)),
        Outcome::Success { job } if job.status == MediaStatus::Aborted => Some(
            style("The media import was aborted before all files were imported.")
                .yellow()
                .to_string(),
        ),
        Outcome::Success { .. } | Outcome::NoJobFound => None,
    }
}

fn failure_message(failure: &ImportFailure) -> String {
    let mut message = String::new();

    match (failure.reason, failure.step_name.as_deref()) {
        (FailureReason::LocalizedStep, Some(phase)) => {
            message.push_str(&format!(
                "{}{}\n",
                style("Import failed at phase: ").yellow(),
                style(phase).yellow().bright()
            ));
            message.push_str(&style(&failure.error).yellow().to_string());
        }
        _ => {
            message.push_str(&style(format!("Error: {}", failure.error)).red().to_string());
            message.push_str(
                "\nIf this error persists and you are not sure how to fix it, please contact support",
            );
        }
    }

    if !failure.server_output.is_empty() {
        message.push_str(&format!("\n{}", style("Errors:").yellow()));
        for error in &failure.server_output {
            message.push_str(&format!("\n\t- {}", style(error).yellow().bright()));
        }
    }

    if !failure.file_errors.is_empty() {
        let count = failure.file_errors.len();
        message.push_str(&format!(
            "\n\n{count} {} could not be imported:\n",
            pluralize(count, "file", None)
        ));

        let mut table = styled_table();
        table.set_header(vec![header("File"), header("Errors")]);
        apply_column_padding(&mut table, (0, 2));
        for file in failure.file_errors.iter().take(MAX_FILE_ERRORS) {
            table.add_row(vec![truncate(&file.file_name, 60), file.errors.join("; ")]);
        }
        message.push_str(&table.to_string());

        if count > MAX_FILE_ERRORS {
            message.push_str(&format!("\n... and {} more", count - MAX_FILE_ERRORS));
        }
    }

    message
}
