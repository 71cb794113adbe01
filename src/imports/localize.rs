//! Attribution of snapshot step failures to the current import job.
//!
//! The snapshot and the job record are written by independent backend
//! processes, so the only safe join between them is time: a snapshot step
//! belongs to the current job only if it started at or after the job was
//! created. A snapshot with no start time of its own is never attributed.

use chrono::{DateTime, Utc};

use super::job::{ImportStatusSnapshot, SnapshotStep};

/// First failed step, in pipeline order, that belongs to the job created at
/// `created_at`. Failures left over from an earlier job are ignored.
pub fn localize_failure(
    snapshot: &ImportStatusSnapshot,
    created_at: DateTime<Utc>,
) -> Option<&SnapshotStep> {
    if !snapshot
        .started_at
        .is_some_and(|started| started >= created_at)
    {
        return None;
    }

    snapshot
        .steps
        .iter()
        .filter(|step| is_attributable(step, created_at))
        .find(|step| step.failed())
}

pub fn is_attributable(step: &SnapshotStep, created_at: DateTime<Utc>) -> bool {
    step.started_at.is_some_and(|started| started >= created_at)
}
