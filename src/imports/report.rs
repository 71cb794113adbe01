use serde::Serialize;

use super::poll::Outcome;
use super::progress::ProgressTracker;

pub const DELIMITER: &str = "=============================================================";

pub const EXIT_PROMPT: &str =
    "(Press ^C to hide progress. The import will continue in the background.)";

const INTERRUPTED: &str = "Import continues in the background.";

/// Process exit code for an outcome. Only failures are non-zero.
pub fn exit_code<J>(outcome: &Outcome<J>) -> i32 {
    match outcome {
        Outcome::Failure(_) => 1,
        Outcome::Success { .. } | Outcome::NoJobFound => 0,
    }
}

/// Final frame plus follow-up text, as one string.
pub fn render<J: Serialize>(
    tracker: &ProgressTracker,
    outcome: &Outcome<J>,
    explanation: Option<&str>,
    json: bool,
) -> anyhow::Result<Option<String>> {
    if json {
        return Ok(Some(serde_json::to_string_pretty(outcome)?));
    }
    if let Some(text) = explanation {
        tracker.append_suffix(text);
    }
    tracker.print(true);
    Ok(None)
}

/// Print the final result and end the process with the outcome's exit code.
pub fn conclude<J: Serialize>(
    tracker: &ProgressTracker,
    outcome: &Outcome<J>,
    explanation: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    if let Some(document) = render(tracker, outcome, explanation.as_deref(), json)? {
        println!("{document}");
    }
    let code = exit_code(outcome);
    tracing::debug!(code, "import watch exiting");
    std::process::exit(code);
}

/// Document printed when watching stops before the import settles.
fn render_interrupted(tracker: &ProgressTracker, json: bool) -> anyhow::Result<Option<String>> {
    if json {
        let document = serde_json::json!({ "outcome": "interrupted" });
        return Ok(Some(serde_json::to_string_pretty(&document)?));
    }
    tracker.print(true);
    Ok(None)
}

/// ^C while watching: leave the last frame on screen and exit cleanly.
pub fn interrupted(tracker: &ProgressTracker, json: bool) -> anyhow::Result<()> {
    if let Some(document) = render_interrupted(tracker, json)? {
        println!("{document}");
    }
    eprintln!("{INTERRUPTED}");
    std::process::exit(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imports::poll::{FailureReason, ImportFailure};
    use crate::imports::progress::testing::RecordingRenderer;

    #[test]
    fn only_failures_exit_non_zero() {
        assert_eq!(exit_code(&Outcome::Success { job: () }), 0);
        assert_eq!(exit_code(&Outcome::<()>::NoJobFound), 0);
        let failure = ImportFailure::new(FailureReason::FetchError, "timeout");
        assert_eq!(exit_code(&Outcome::<()>::Failure(failure)), 1);
    }

    #[test]
    fn explanation_is_appended_to_final_frame() {
        let renderer = RecordingRenderer::default();
        let tracker = ProgressTracker::new(renderer.clone());
        tracker.set_suffix("Status: Failed");

        let outcome = Outcome::<()>::Failure(ImportFailure::new(FailureReason::JobError, "boom"));
        let printed = render(&tracker, &outcome, Some("Error: boom"), false).unwrap();

        assert!(printed.is_none());
        assert_eq!(
            renderer.frames(),
            vec![("Status: Failed\nError: boom".to_string(), true)]
        );
    }

    #[test]
    fn interrupt_leaves_the_last_frame() {
        let renderer = RecordingRenderer::default();
        let tracker = ProgressTracker::new(renderer.clone());
        tracker.set_suffix("Status: Running");

        assert!(render_interrupted(&tracker, false).unwrap().is_none());
        assert_eq!(renderer.frames(), vec![("Status: Running".to_string(), true)]);
    }

    #[test]
    fn interrupt_in_json_mode_still_reports() {
        let renderer = RecordingRenderer::default();
        let tracker = ProgressTracker::new(renderer.clone());

        let printed = render_interrupted(&tracker, true).unwrap().unwrap();

        let value: serde_json::Value = serde_json::from_str(&printed).unwrap();
        assert_eq!(value, serde_json::json!({ "outcome": "interrupted" }));
        assert!(renderer.frames().is_empty());
    }

    #[test]
    fn json_mode_skips_the_terminal() {
        let renderer = RecordingRenderer::default();
        let tracker = ProgressTracker::new(renderer.clone());

        let printed = render(&tracker, &Outcome::<()>::NoJobFound, Some("ignored"), true)
            .unwrap()
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&printed).unwrap();
        assert_eq!(value["outcome"], "no_job_found");
        assert!(renderer.frames().is_empty());
    }
}
