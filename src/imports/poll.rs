//! Import status poll loop.
//!
//! [`Poller::tick`] is the single transition function: fetch once, hand the
//! result to the pipeline's [`Reconciler`], and report whether the watch is
//! still pending or has reached its outcome. [`Poller::run`] drives ticks on
//! a fixed interval through a [`Scheduler`] and consumes the poller, so no
//! tick can follow a terminal one.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::job::{FileError, ImportTarget};
use super::progress::ProgressTracker;
use crate::http::TransportError;

#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// One non-cached status read for an app and environment.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    type Status: Send;

    async fn fetch(&self, target: &ImportTarget) -> Result<Self::Status, TransportError>;
}

/// Pipeline-specific interpretation of fetched status.
pub trait Reconciler: Send {
    type Status;
    type Job;

    /// Merge `status` into the tracker and decide whether the watch is over.
    fn reconcile(&mut self, status: Self::Status, tracker: &ProgressTracker) -> Tick<Self::Job>;

    /// Called exactly once with the final outcome, before it is returned.
    fn settle(&mut self, outcome: &Outcome<Self::Job>, tracker: &ProgressTracker);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Initializing,
    Polling,
    Succeeded,
    Failed,
    NoJob,
}

impl PollState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::NoJob)
    }

    fn after<J>(outcome: &Outcome<J>) -> Self {
        match outcome {
            Outcome::Success { .. } => Self::Succeeded,
            Outcome::Failure(_) => Self::Failed,
            Outcome::NoJobFound => Self::NoJob,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tick<J> {
    Pending,
    Done(Outcome<J>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome<J> {
    Success { job: J },
    Failure(ImportFailure),
    NoJobFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// The status query itself failed.
    FetchError,
    /// The server marked the whole job as errored.
    JobError,
    /// A specific pipeline step failed.
    LocalizedStep,
    /// Something is wrong but no step can be blamed.
    Unattributable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportFailure {
    pub reason: FailureReason,
    pub error: String,
    pub step_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub server_output: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_errors: Vec<FileError>,
}

impl ImportFailure {
    pub fn new(reason: FailureReason, error: impl Into<String>) -> Self {
        Self {
            reason,
            error: error.into(),
            step_name: None,
            server_output: Vec::new(),
            file_errors: Vec::new(),
        }
    }

    pub fn fetch(err: &TransportError) -> Self {
        Self::new(FailureReason::FetchError, err.to_string())
    }

    pub fn with_step(mut self, step_name: impl Into<String>) -> Self {
        self.step_name = Some(step_name.into());
        self
    }

    pub fn with_output(mut self, output: Vec<String>) -> Self {
        self.server_output = output;
        self
    }
}

pub struct Poller<F, R, S> {
    fetcher: F,
    reconciler: R,
    scheduler: S,
    tracker: ProgressTracker,
    target: ImportTarget,
    interval: Duration,
    state: PollState,
    ticks: u64,
}

impl<F, R, S> Poller<F, R, S>
where
    F: StatusFetcher,
    R: Reconciler<Status = F::Status>,
    S: Scheduler,
{
    pub fn new(
        fetcher: F,
        reconciler: R,
        scheduler: S,
        tracker: ProgressTracker,
        target: ImportTarget,
        interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            reconciler,
            scheduler,
            tracker,
            target,
            interval,
            state: PollState::Initializing,
            ticks: 0,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub async fn tick(&mut self) -> Tick<R::Job> {
        debug_assert!(!self.state.is_terminal(), "tick after a terminal state");
        self.ticks += 1;
        self.state = PollState::Polling;
        tracing::debug!(
            tick = self.ticks,
            app = self.target.app_id,
            env = self.target.env_id,
            "checking import status"
        );

        let tick = match self.fetcher.fetch(&self.target).await {
            Ok(status) => self.reconciler.reconcile(status, &self.tracker),
            Err(err) => {
                tracing::warn!(error = %err, "import status request failed");
                Tick::Done(Outcome::Failure(ImportFailure::fetch(&err)))
            }
        };

        if let Tick::Done(outcome) = &tick {
            self.state = PollState::after(outcome);
            self.reconciler.settle(outcome, &self.tracker);
            tracing::info!(state = ?self.state, ticks = self.ticks, "import watch finished");
        }
        tick
    }

    /// Poll until a terminal outcome. There is no overall timeout.
    pub async fn run(mut self) -> Outcome<R::Job> {
        loop {
            match self.tick().await {
                Tick::Done(outcome) => return outcome,
                Tick::Pending => self.scheduler.sleep(self.interval).await,
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Never waits; remembers what it was asked to sleep.
    #[derive(Clone, Default)]
    pub struct ManualScheduler {
        pub sleeps: Arc<Mutex<Vec<Duration>>>,
    }

    #[async_trait]
    impl Scheduler for ManualScheduler {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    /// Replays canned responses in order; the last one repeats.
    #[derive(Clone)]
    pub struct ScriptedFetcher<T> {
        responses: Arc<Mutex<VecDeque<Result<T, String>>>>,
        pub calls: Arc<AtomicUsize>,
    }

    impl<T: Clone> ScriptedFetcher<T> {
        pub fn new(responses: Vec<Result<T, String>>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(responses.into())),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl<T: Clone + Send + 'static> StatusFetcher for ScriptedFetcher<T> {
        type Status = T;

        async fn fetch(&self, _target: &ImportTarget) -> Result<T, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            let next = if responses.len() > 1 {
                responses.pop_front()
            } else {
                responses.front().cloned()
            };
            match next.expect("scripted fetcher has no responses") {
                Ok(status) => Ok(status),
                Err(message) => Err(TransportError::Schema(message)),
            }
        }
    }

    pub fn target() -> ImportTarget {
        ImportTarget {
            app_id: 1,
            app_name: "example-app".to_string(),
            env_id: 2,
            env_type: "production".to_string(),
            primary_domain: Some("example.com".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{target, ManualScheduler, ScriptedFetcher};
    use super::*;
    use crate::imports::progress::HiddenRenderer;

    /// Minimal pipeline: `Some(true)` finishes, `Some(false)` keeps polling,
    /// `None` means no job.
    #[derive(Default)]
    struct Flags {
        settled: Vec<PollStateSeen>,
    }

    #[derive(Debug, PartialEq)]
    enum PollStateSeen {
        Success,
        Failure,
        NoJob,
    }

    impl Reconciler for Flags {
        type Status = Option<bool>;
        type Job = u32;

        fn reconcile(&mut self, status: Option<bool>, _tracker: &ProgressTracker) -> Tick<u32> {
            match status {
                None => Tick::Done(Outcome::NoJobFound),
                Some(true) => Tick::Done(Outcome::Success { job: 7 }),
                Some(false) => Tick::Pending,
            }
        }

        fn settle(&mut self, outcome: &Outcome<u32>, _tracker: &ProgressTracker) {
            self.settled.push(match outcome {
                Outcome::Success { .. } => PollStateSeen::Success,
                Outcome::Failure(_) => PollStateSeen::Failure,
                Outcome::NoJobFound => PollStateSeen::NoJob,
            });
        }
    }

    fn poller(
        fetcher: ScriptedFetcher<Option<bool>>,
        scheduler: ManualScheduler,
    ) -> Poller<ScriptedFetcher<Option<bool>>, Flags, ManualScheduler> {
        Poller::new(
            fetcher,
            Flags::default(),
            scheduler,
            ProgressTracker::new(HiddenRenderer),
            target(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn no_job_resolves_on_first_tick_without_sleeping() {
        let fetcher = ScriptedFetcher::new(vec![Ok(None)]);
        let scheduler = ManualScheduler::default();
        let outcome = poller(fetcher.clone(), scheduler.clone()).run().await;

        assert_eq!(outcome, Outcome::NoJobFound);
        assert_eq!(fetcher.calls(), 1);
        assert!(scheduler.sleeps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sleeps_the_configured_interval_between_ticks() {
        let fetcher = ScriptedFetcher::new(vec![Ok(Some(false)), Ok(Some(false)), Ok(Some(true))]);
        let scheduler = ManualScheduler::default();
        let outcome = poller(fetcher.clone(), scheduler.clone()).run().await;

        assert_eq!(outcome, Outcome::Success { job: 7 });
        assert_eq!(fetcher.calls(), 3);
        assert_eq!(
            *scheduler.sleeps.lock().unwrap(),
            vec![Duration::from_secs(5), Duration::from_secs(5)]
        );
    }

    #[tokio::test]
    async fn fetch_error_fails_immediately_without_retry() {
        let fetcher = ScriptedFetcher::new(vec![Err("connection reset".to_string())]);
        let scheduler = ManualScheduler::default();
        let mut poller = poller(fetcher.clone(), scheduler.clone());

        let Tick::Done(Outcome::Failure(failure)) = poller.tick().await else {
            panic!("expected a terminal failure");
        };
        assert_eq!(failure.reason, FailureReason::FetchError);
        assert!(failure.error.contains("connection reset"));
        assert_eq!(poller.state(), PollState::Failed);
        assert_eq!(poller.reconciler.settled, vec![PollStateSeen::Failure]);
        assert_eq!(fetcher.calls(), 1);
        assert!(scheduler.sleeps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn states_progress_from_initializing() {
        let fetcher = ScriptedFetcher::new(vec![Ok(Some(false)), Ok(Some(true))]);
        let mut poller = poller(fetcher, ManualScheduler::default());
        assert_eq!(poller.state(), PollState::Initializing);

        assert_eq!(poller.tick().await, Tick::Pending);
        assert_eq!(poller.state(), PollState::Polling);
        assert!(poller.reconciler.settled.is_empty());

        assert_eq!(poller.tick().await, Tick::Done(Outcome::Success { job: 7 }));
        assert_eq!(poller.state(), PollState::Succeeded);
        assert_eq!(poller.reconciler.settled, vec![PollStateSeen::Success]);
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let failure = Outcome::<u32>::Failure(
            ImportFailure::new(FailureReason::LocalizedStep, "Import step failed")
                .with_step("importing_db"),
        );
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["outcome"], "failure");
        assert_eq!(json["reason"], "localized-step");
        assert_eq!(json["step_name"], "importing_db");
        assert!(json.get("server_output").is_none());

        let json = serde_json::to_value(Outcome::<u32>::NoJobFound).unwrap();
        assert_eq!(json["outcome"], "no_job_found");
    }
}
