// src/core/poll.rs

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::models::ScanJob;

/// Poll cadence used when callers have no reason to pick another one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Error produced by a status fetch, delivered to the `on_error` callback.
///
/// The poller does not care what failed, only that this round produced no
/// job; the source is kept for logging.
#[derive(Debug)]
pub struct FetchError(Box<dyn std::error::Error + Send + Sync>);

impl FetchError {
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(source.into())
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// Callbacks driving one poll.
///
/// `on_update` receives every accepted job snapshot. `on_error` receives
/// fetch failures; the poll keeps running afterwards. `should_continue` is
/// consulted after each update and ends the poll when it returns false; the
/// default keeps polling while the job is pending or running.
pub struct PollCallbacks {
    on_update: Box<dyn FnMut(&ScanJob) + Send>,
    on_error: Box<dyn FnMut(&FetchError) + Send>,
    should_continue: Box<dyn FnMut(&ScanJob) -> bool + Send>,
}

impl PollCallbacks {
    pub fn new(on_update: impl FnMut(&ScanJob) + Send + 'static) -> Self {
        Self {
            on_update: Box::new(on_update),
            on_error: Box::new(|err| warn!(error = %err, "Status fetch failed, keeping poll alive.")),
            should_continue: Box::new(ScanJob::is_active),
        }
    }

    pub fn with_on_error(mut self, on_error: impl FnMut(&FetchError) + Send + 'static) -> Self {
        self.on_error = Box::new(on_error);
        self
    }

    pub fn with_should_continue(
        mut self,
        should_continue: impl FnMut(&ScanJob) -> bool + Send + 'static,
    ) -> Self {
        self.should_continue = Box::new(should_continue);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
}

struct ActivePoll {
    generation: u64,
    cancel: CancellationToken,
}

struct Inner {
    /// Monotonic counter; a poll only delivers updates while its generation
    /// is still the latest. Bumped on every start and stop.
    generation: AtomicU64,
    active: Mutex<Option<ActivePoll>>,
}

impl Inner {
    fn lock_active(&self) -> MutexGuard<'_, Option<ActivePoll>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_current(&self) {
        let mut active = self.lock_active();
        if let Some(current) = active.take() {
            // Bump first so a fetch already in flight can no longer deliver.
            self.generation.fetch_add(1, Ordering::AcqRel);
            current.cancel.cancel();
            debug!("Polling stopped.");
        }
    }

    /// Clear the active slot after a poll ends on its own, unless a newer
    /// poll already owns it.
    fn finish(&self, generation: u64) {
        let mut active = self.lock_active();
        if active
            .as_ref()
            .is_some_and(|poll| poll.generation == generation)
        {
            *active = None;
        }
    }
}

/// Drives periodic status fetches for at most one scan at a time.
///
/// `start` spawns a background task that fetches immediately and then on
/// every interval tick. The controller never overlaps fetches for the same
/// poll and never lets a cancelled poll deliver a late result: every
/// delivery is gated on the poll's generation still being current.
///
/// Callbacks run outside the controller's lock, so they may call `stop` on
/// the controller or a handle without deadlocking.
pub struct PollingController {
    inner: Arc<Inner>,
}

impl PollingController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                generation: AtomicU64::new(0),
                active: Mutex::new(None),
            }),
        }
    }

    /// Begin polling. If a poll is already active the existing poll keeps
    /// running untouched and its handle is returned.
    pub fn start<F, Fut>(
        &self,
        fetch: F,
        interval: Duration,
        callbacks: PollCallbacks,
    ) -> PollHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<ScanJob, FetchError>> + Send + 'static,
    {
        let mut active = self.inner.lock_active();
        if let Some(existing) = active.as_ref() {
            debug!("start() while already polling; returning the existing handle.");
            return PollHandle {
                inner: Arc::clone(&self.inner),
                generation: existing.generation,
                cancel: existing.cancel.clone(),
            };
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let cancel = CancellationToken::new();
        *active = Some(ActivePoll {
            generation,
            cancel: cancel.clone(),
        });
        drop(active);

        debug!(generation, interval_ms = interval.as_millis() as u64, "Polling started.");
        let inner = Arc::clone(&self.inner);
        let task_cancel = cancel.clone();
        tokio::spawn(poll_loop(inner, generation, task_cancel, fetch, interval, callbacks));

        PollHandle {
            inner: Arc::clone(&self.inner),
            generation,
            cancel,
        }
    }

    /// Stop the active poll, if any. Safe to call repeatedly and from
    /// within poll callbacks.
    pub fn stop(&self) {
        self.inner.stop_current();
    }

    pub fn state(&self) -> PollState {
        if self.inner.lock_active().is_some() {
            PollState::Polling
        } else {
            PollState::Idle
        }
    }

    pub fn is_polling(&self) -> bool {
        self.state() == PollState::Polling
    }
}

impl Default for PollingController {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PollingController {
    fn drop(&mut self) {
        self.inner.stop_current();
    }
}

/// Handle to one started poll. Clones refer to the same poll.
#[derive(Clone)]
pub struct PollHandle {
    inner: Arc<Inner>,
    generation: u64,
    cancel: CancellationToken,
}

impl PollHandle {
    /// Stop this poll. A handle left over from an earlier poll only cancels
    /// itself and never touches a newer poll occupying the controller.
    pub fn stop(&self) {
        let mut active = self.inner.lock_active();
        if active
            .as_ref()
            .is_some_and(|poll| poll.generation == self.generation)
        {
            *active = None;
            self.inner.generation.fetch_add(1, Ordering::AcqRel);
            debug!(generation = self.generation, "Polling stopped via handle.");
        }
        drop(active);
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

async fn poll_loop<F, Fut>(
    inner: Arc<Inner>,
    generation: u64,
    cancel: CancellationToken,
    mut fetch: F,
    interval: Duration,
    mut callbacks: PollCallbacks,
) where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<ScanJob, FetchError>> + Send + 'static,
{
    // The first tick completes immediately, giving callers an update right
    // away instead of after one full interval. Ticks that would fire while
    // a slow fetch is still outstanding are skipped, never queued.
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            outcome = fetch() => outcome,
        };

        // A stop or restart that happened while the fetch was in flight
        // invalidates this generation; the result is discarded unseen.
        if cancel.is_cancelled() || inner.generation.load(Ordering::Acquire) != generation {
            debug!(generation, "Discarding stale poll result.");
            break;
        }

        match outcome {
            Ok(job) => {
                (callbacks.on_update)(&job);
                if cancel.is_cancelled() {
                    // stop() was called from inside on_update.
                    break;
                }
                if !(callbacks.should_continue)(&job) {
                    debug!(state = %job.state, "Job no longer active; polling ends.");
                    inner.finish(generation);
                    break;
                }
            }
            Err(err) => (callbacks.on_error)(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::JobState;

    #[test]
    fn fetch_error_wraps_any_error_source() {
        let err = FetchError::new("connection refused");
        assert_eq!(err.to_string(), "connection refused");
        assert!(std::error::Error::source(&err).is_some());

        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        let wrapped = FetchError::new(io);
        assert_eq!(wrapped.to_string(), "timed out");
    }

    #[test]
    fn default_continue_predicate_follows_job_activity() {
        let mut callbacks = PollCallbacks::new(|_| {});
        let mut job = ScanJob {
            state: JobState::Running,
            ..ScanJob::default()
        };
        assert!((callbacks.should_continue)(&job));

        job.state = JobState::Pending;
        assert!((callbacks.should_continue)(&job));

        job.state = JobState::Completed;
        assert!(!(callbacks.should_continue)(&job));

        job.state = JobState::Unknown;
        assert!(!(callbacks.should_continue)(&job));
    }
}
