//! A tick scheduler with graceful shutdown.
//!
//! [`Scheduler::dispatch`] registers a [`Tick`] and runs it on its own
//! worker task; each invocation's reported delay governs when the next one
//! fires. [`Scheduler::shutdown`] cancels every worker and waits for them
//! all to return.

#![warn(missing_docs)]
#![warn(clippy::all)]

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use metrics::{describe_histogram, histogram};

#[cfg(feature = "tracing")]
use tracing::debug;

/// A unit of periodic work. `run` performs one cycle and reports the delay
/// before the next one should start.
#[async_trait]
pub trait Tick: Send + Sync {
    /// Performs one cycle and returns the delay before the next one.
    ///
    /// Implementations should observe `cancel` for any internal waits
    /// (HTTP calls, sleeps) so that [`Scheduler::shutdown`] doesn't have to
    /// wait for a cycle that ignores cancellation.
    async fn run(&self, cancel: &CancellationToken) -> Duration;
}

/// Dispatches [`Tick`]s onto their own worker tasks and coordinates
/// graceful shutdown.
pub struct Scheduler {
    cancel: CancellationToken,
    workers: Mutex<JoinSet<()>>,
    shutdown_started: AtomicBool,
}

impl Scheduler {
    /// Creates a new scheduler with no dispatched ticks.
    pub fn new() -> Self {
        #[cfg(feature = "metrics")]
        describe_histogram!(
            "scheduler_tick_duration_seconds",
            "Time spent running a single dispatched tick"
        );

        Self {
            cancel: CancellationToken::new(),
            workers: Mutex::new(JoinSet::new()),
            shutdown_started: AtomicBool::new(false),
        }
    }

    /// Returns a token cancelled exactly when the scheduler starts
    /// shutting down.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Registers `tick` and returns immediately; it begins running on its
    /// own worker task, first invocation as soon as possible.
    pub fn dispatch<T>(&self, tick: T)
    where
        T: Tick + 'static,
    {
        #[cfg(feature = "tracing")]
        debug!("dispatching tick onto its own worker");

        let cancel = self.cancel.clone();
        let mut guard = self.workers.lock().expect("scheduler worker set poisoned");
        guard.spawn(run_worker(tick, cancel));
    }

    /// Cancels the scheduler's token and blocks until every dispatched
    /// worker has returned. Safe to call more than once; later calls are
    /// no-ops.
    pub async fn shutdown(&self) {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            return;
        }

        #[cfg(feature = "tracing")]
        debug!("shutting down scheduler, waiting for dispatched workers");

        self.cancel.cancel();

        let mut workers = {
            let mut guard = self.workers.lock().expect("scheduler worker set poisoned");
            std::mem::take(&mut *guard)
        };

        while workers.join_next().await.is_some() {}
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_worker<T: Tick>(tick: T, cancel: CancellationToken) {
    // Initial delay is zero so the first invocation happens as soon as
    // possible; afterwards `delay` is whatever the previous run reported.
    let mut delay = Duration::ZERO;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        if !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => break,
            }
            if cancel.is_cancelled() {
                break;
            }
        }

        let started = Instant::now();
        let outcome = AssertUnwindSafe(tick.run(&cancel)).catch_unwind().await;
        let elapsed = started.elapsed();

        #[cfg(feature = "metrics")]
        histogram!("scheduler_tick_duration_seconds").record(elapsed.as_secs_f64());

        delay = match outcome {
            Ok(delay) => {
                #[cfg(feature = "tracing")]
                debug!(elapsed = ?elapsed, next_delay = ?delay, "tick finished");
                delay
            }
            Err(_panic) => {
                #[cfg(feature = "tracing")]
                tracing::error!("scheduler tick panicked; terminating its worker");
                break;
            }
        };
    }
}

/// Builds a [`Tick`] that runs `task` and then reports `delay` as the next
/// interval, unconditionally (the cadence drifts by however long `task`
/// takes).
pub fn after<F, Fut>(delay: Duration, task: F) -> impl Tick
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send,
{
    AfterTick { delay, task }
}

struct AfterTick<F> {
    delay: Duration,
    task: F,
}

#[async_trait]
impl<F, Fut> Tick for AfterTick<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send,
{
    async fn run(&self, _cancel: &CancellationToken) -> Duration {
        (self.task)().await;
        self.delay
    }
}

/// Builds a [`Tick`] that runs `task` and reports `max(0, delay - elapsed)`
/// so the cadence stays close to `delay` even when `task` takes a while.
pub fn every<F, Fut>(delay: Duration, task: F) -> impl Tick
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send,
{
    EveryTick { delay, task }
}

struct EveryTick<F> {
    delay: Duration,
    task: F,
}

#[async_trait]
impl<F, Fut> Tick for EveryTick<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send,
{
    async fn run(&self, _cancel: &CancellationToken) -> Duration {
        let start = Instant::now();
        (self.task)().await;
        self.delay.saturating_sub(start.elapsed())
    }
}

/// A synchronous scheduler variant for tests and single-shot execution:
/// `dispatch` runs the tick once inline and `shutdown` is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct Once;

impl Once {
    /// Creates a new `Once` scheduler.
    pub fn new() -> Self {
        Self
    }

    /// Runs `tick` once, inline, and returns its reported delay.
    pub async fn dispatch<T: Tick>(&self, tick: &T) -> Duration {
        let cancel = CancellationToken::new();
        tick.run(&cancel).await
    }

    /// No-op; `Once` has no background workers to stop.
    pub fn shutdown(&self) {}
}
