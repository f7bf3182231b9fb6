//! Job status polling.
//!
//! A polling session is a small state machine:
//!
//! ```text
//! Idle ──start──▶ Polling ──terminal snapshot──▶ Completed
//!                    │ ──fetch error──────────▶ Failed
//!                    └──cancel────────────────▶ Cancelled
//! ```
//!
//! [`transition`] is the pure step function; [`JobPoller`] drives it on a
//! tokio interval and delivers callbacks to a [`JobObserver`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::classify::{ApiError, ErrorCategory};
use crate::error::Error;
use crate::jobs::JobSource;
use crate::types::{Job, JobId, JobStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// State of one polling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling { last_seen: Option<JobStatus> },
    /// A terminal snapshot (`completed` or `failed` job) was delivered.
    Completed,
    /// A fetch failed; the error was delivered.
    Failed,
    Cancelled,
}

impl PollState {
    /// No further fetches or callbacks happen from a finished state.
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvent {
    Started,
    Observed(JobStatus),
    FetchFailed,
    Cancelled,
}

/// What the driver must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Issue the first fetch.
    Fetch,
    /// Deliver `on_update` and wait for the next tick.
    Update,
    /// Deliver `on_update`, then `on_complete`, then stop.
    Finish,
    /// Deliver `on_error`, then stop.
    Fail,
    /// Stop without delivering anything.
    Halt,
    /// Drop the event: stale, regressed, or arrived after the session ended.
    Discard,
}

/// Pure transition function of the polling state machine.
#[must_use]
pub fn transition(state: PollState, event: PollEvent) -> (PollState, Step) {
    match (state, event) {
        (PollState::Idle, PollEvent::Started) => (PollState::Polling { last_seen: None }, Step::Fetch),
        (PollState::Idle | PollState::Polling { .. }, PollEvent::Cancelled) => {
            (PollState::Cancelled, Step::Halt)
        }
        (PollState::Polling { last_seen }, PollEvent::Observed(status)) => {
            if last_seen.is_some_and(|prev| !prev.can_advance_to(status)) {
                (state, Step::Discard)
            } else if status.is_terminal() {
                (PollState::Completed, Step::Finish)
            } else {
                (
                    PollState::Polling {
                        last_seen: Some(status),
                    },
                    Step::Update,
                )
            }
        }
        (PollState::Polling { .. }, PollEvent::FetchFailed) => (PollState::Failed, Step::Fail),
        _ => (state, Step::Discard),
    }
}

/// Receives polling callbacks.
///
/// For each session: `on_update` for every accepted snapshot, then at most
/// one of `on_complete` / `on_error`. Nothing is delivered after the
/// session's [`PollHandle`] is cancelled.
pub trait JobObserver: Send + 'static {
    fn on_update(&mut self, job: &Job);
    fn on_complete(&mut self, job: &Job);
    fn on_error(&mut self, error: Error);
}

/// Observer assembled from three closures.
pub struct Callbacks<U, C, E> {
    on_update: U,
    on_complete: C,
    on_error: E,
}

impl<U, C, E> Callbacks<U, C, E>
where
    U: FnMut(&Job) + Send + 'static,
    C: FnMut(&Job) + Send + 'static,
    E: FnMut(Error) + Send + 'static,
{
    /// Observer built from one closure per callback.
    pub fn new(on_update: U, on_complete: C, on_error: E) -> Self {
        Self {
            on_update,
            on_complete,
            on_error,
        }
    }
}

impl<U, C, E> JobObserver for Callbacks<U, C, E>
where
    U: FnMut(&Job) + Send + 'static,
    C: FnMut(&Job) + Send + 'static,
    E: FnMut(Error) + Send + 'static,
{
    fn on_update(&mut self, job: &Job) {
        (self.on_update)(job);
    }

    fn on_complete(&mut self, job: &Job) {
        (self.on_complete)(job);
    }

    fn on_error(&mut self, error: Error) {
        (self.on_error)(error);
    }
}

type SharedState = Arc<Mutex<PollState>>;

fn advance(state: &SharedState, event: PollEvent) -> Step {
    // A poisoned lock only means an observer panicked mid-delivery; the
    // state value itself is still consistent.
    let mut guard = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    let (next, step) = transition(*guard, event);
    *guard = next;
    step
}

/// Handle to a running polling session.
#[derive(Debug)]
pub struct PollHandle {
    job_id: JobId,
    token: CancellationToken,
    state: SharedState,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Stop the session. Idempotent; a fetch in flight is abandoned and its
    /// result never delivered.
    pub fn cancel(&self) {
        if advance(&self.state, PollEvent::Cancelled) == Step::Halt {
            tracing::debug!(job_id = %self.job_id, "Polling cancelled");
        }
        self.token.cancel();
    }

    /// The job being polled.
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> PollState {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Whether the session reached a finished state.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    /// Wait until the polling task has exited.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!(job_id = %self.job_id, error = %e, "Polling task panicked");
        }
    }
}

/// Polls job status until a terminal state, an error, or cancellation.
pub struct JobPoller<S> {
    source: Arc<S>,
    interval: Duration,
}

impl<S> Clone for JobPoller<S> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            interval: self.interval,
        }
    }
}

impl<S: JobSource> JobPoller<S> {
    /// Poller over `source` with the default interval.
    #[must_use]
    pub fn new(source: S) -> Self {
        Self::from_arc(Arc::new(source))
    }

    /// Poller over a source that is already shared.
    #[must_use]
    pub fn from_arc(source: Arc<S>) -> Self {
        Self {
            source,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Default interval for [`watch`](Self::watch) and [`wait_for`](Self::wait_for).
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Interval used by `watch` and `wait_for`.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling `job_id` every `interval`.
    ///
    /// The first fetch happens immediately. Fetches never overlap: the next
    /// one is issued on the first tick after the previous one finished, and
    /// ticks missed during a slow fetch are skipped rather than replayed.
    ///
    /// Must be called from within a tokio runtime. A zero interval is raised
    /// to one millisecond.
    pub fn start<O: JobObserver>(&self, job_id: JobId, observer: O, interval: Duration) -> PollHandle {
        let interval = interval.max(Duration::from_millis(1));
        let token = CancellationToken::new();
        let state: SharedState = Arc::new(Mutex::new(PollState::Idle));

        let task = tokio::spawn(run_session(
            self.source.clone(),
            job_id.clone(),
            observer,
            interval,
            token.clone(),
            state.clone(),
        ));

        PollHandle {
            job_id,
            token,
            state,
            task,
        }
    }

    /// [`start`](Self::start) with the poller's default interval.
    pub fn watch<O: JobObserver>(&self, job_id: JobId, observer: O) -> PollHandle {
        self.start(job_id, observer, self.interval)
    }

    /// Poll until the job reaches a terminal status and return that snapshot.
    ///
    /// # Errors
    ///
    /// Returns the first fetch error.
    pub async fn wait_for(&self, job_id: JobId) -> Result<Job, Error> {
        let (tx, rx) = oneshot::channel();
        let handle = self.watch(job_id, Completion { tx: Some(tx) });
        let outcome = rx.await;
        handle.join().await;
        outcome.map_err(|_| {
            Error::Api(ApiError::new(
                ErrorCategory::Unknown,
                "polling ended without a result",
            ))
        })?
    }
}

struct Completion {
    tx: Option<oneshot::Sender<Result<Job, Error>>>,
}

impl JobObserver for Completion {
    fn on_update(&mut self, _job: &Job) {}

    fn on_complete(&mut self, job: &Job) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Ok(job.clone()));
        }
    }

    fn on_error(&mut self, error: Error) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(error));
        }
    }
}

async fn run_session<S, O>(
    source: Arc<S>,
    job_id: JobId,
    mut observer: O,
    interval: Duration,
    token: CancellationToken,
    state: SharedState,
) where
    S: JobSource,
    O: JobObserver,
{
    if advance(&state, PollEvent::Started) != Step::Fetch {
        return;
    }
    tracing::debug!(job_id = %job_id, interval_ms = interval.as_millis() as u64, "Polling started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // First tick completes immediately.
        tokio::select! {
            biased;
            () = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            () = token.cancelled() => return,
            outcome = source.fetch_job(&job_id) => outcome,
        };

        match outcome {
            Ok(job) => match advance(&state, PollEvent::Observed(job.status)) {
                Step::Update => observer.on_update(&job),
                Step::Finish => {
                    observer.on_update(&job);
                    if !token.is_cancelled() {
                        observer.on_complete(&job);
                    }
                    tracing::debug!(job_id = %job_id, status = ?job.status, "Polling finished");
                    return;
                }
                Step::Discard if !current(&state).is_finished() => {
                    tracing::warn!(
                        job_id = %job_id,
                        status = ?job.status,
                        "Ignoring snapshot that regresses job status"
                    );
                }
                _ => return,
            },
            Err(error) => {
                if advance(&state, PollEvent::FetchFailed) == Step::Fail {
                    tracing::warn!(job_id = %job_id, error = %error, "Polling stopped on error");
                    observer.on_error(error);
                }
                return;
            }
        }
    }
}

fn current(state: &SharedState) -> PollState {
    *state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
