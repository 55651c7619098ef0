//! Scheduler for admitting work under a politeness budget
//!
//! This module handles:
//! - Concurrency limiting via a FIFO semaphore
//! - Minimum spacing between task starts (not completions)
//! - Optional carryover of idle start slots into a later burst
//! - Draining and graceful shutdown
//!
//! Two schedulers are composed by the coordinator: one admits categories,
//! and each admitted category opens its own scheduler for page fetches.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Scheduler limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of admitted tasks running at once
    pub concurrency: usize,

    /// Minimum time between successive task starts
    pub min_interval: Duration,

    /// Whether idle time banks up to `concurrency` start slots
    pub carryover: bool,
}

impl SchedulerConfig {
    pub fn new(concurrency: usize, min_interval: Duration, carryover: bool) -> Self {
        Self {
            concurrency: concurrency.max(1),
            min_interval,
            carryover,
        }
    }

    /// Number of starts that may happen back to back after an idle period
    fn burst(&self) -> u32 {
        if self.carryover {
            self.concurrency as u32
        } else {
            1
        }
    }
}

/// Why a submitted task did not produce a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("scheduler shut down before the task started")]
    Cancelled,

    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Start-to-start gate
///
/// Keeps a theoretical arrival time (`next_start`): a start may happen once
/// `now >= next_start - (burst - 1) * min_interval`, after which `next_start`
/// advances by one interval. With a burst of 1 this is plain spacing; with a
/// larger burst an idle scheduler lets `burst` tasks start together.
#[derive(Debug)]
struct IntervalGate {
    min_interval: Duration,
    burst: u32,
    next_start: Mutex<Option<Instant>>,
}

impl IntervalGate {
    fn new(config: &SchedulerConfig) -> Self {
        Self {
            min_interval: config.min_interval,
            burst: config.burst(),
            next_start: Mutex::new(None),
        }
    }

    /// Waits until a start slot is available and claims it
    ///
    /// The lock is held while waiting, so slots are handed out in arrival order.
    async fn admit(&self, shutdown: &CancellationToken) -> Result<Instant, SchedulerError> {
        if self.min_interval.is_zero() {
            return Ok(Instant::now());
        }

        let mut next_start = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(SchedulerError::Cancelled),
            guard = self.next_start.lock() => guard,
        };

        // Shutdown may have fired while another task held the lock
        if shutdown.is_cancelled() {
            return Err(SchedulerError::Cancelled);
        }

        let window = self
            .min_interval
            .saturating_mul(self.burst.saturating_sub(1));
        let now = Instant::now();

        let earliest = next_start
            .and_then(|tat| tat.checked_sub(window))
            .map_or(now, |earliest| earliest.max(now));

        if earliest > now {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(SchedulerError::Cancelled),
                _ = tokio::time::sleep_until(earliest) => {}
            }
        }

        let started = Instant::now();
        let tat = next_start.map_or(started, |tat| tat.max(started));
        *next_start = Some(tat.checked_add(self.min_interval).unwrap_or(tat));

        Ok(started)
    }
}

/// Handle to a submitted task
///
/// Resolves exactly once: with the task's output, or with the reason it
/// never produced one.
#[derive(Debug)]
pub struct TaskHandle<T> {
    inner: JoinHandle<Result<T, SchedulerError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, SchedulerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx).map(|joined| match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(SchedulerError::Panicked(e.to_string())),
            Err(_) => Err(SchedulerError::Cancelled),
        })
    }
}

/// Admits submitted tasks under a concurrency cap and start interval
///
/// Admission is FIFO. The scheduler never looks at task outcomes; retry and
/// failure handling belong to the caller.
pub struct Scheduler {
    permits: Arc<Semaphore>,
    gate: Arc<IntervalGate>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Creates a scheduler with its own shutdown token
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_shutdown(config, CancellationToken::new())
    }

    /// Creates a scheduler that stops admitting when `shutdown` is cancelled
    ///
    /// Pass a child token to tie a page scheduler to the run's shutdown.
    pub fn with_shutdown(config: SchedulerConfig, shutdown: CancellationToken) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.concurrency)),
            gate: Arc::new(IntervalGate::new(&config)),
            tracker: TaskTracker::new(),
            shutdown,
        }
    }

    /// Submits a task for admission
    ///
    /// Must be called from within a Tokio runtime. A task submitted after
    /// [`shutdown`](Self::shutdown) settles as [`SchedulerError::Cancelled`].
    pub fn submit<F, T>(&self, task: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let gate = Arc::clone(&self.gate);
        let shutdown = self.shutdown.clone();

        let inner = self.tracker.spawn(async move {
            if shutdown.is_cancelled() {
                return Err(SchedulerError::Cancelled);
            }

            let _permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(SchedulerError::Cancelled),
                permit = permits.acquire_owned() => {
                    permit.map_err(|_| SchedulerError::Cancelled)?
                }
            };

            let started = gate.admit(&shutdown).await?;
            tracing::trace!(?started, "Task admitted");

            Ok(task.await)
        });

        TaskHandle { inner }
    }

    /// Waits until every submitted task has settled
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stops admitting tasks
    ///
    /// Tasks still waiting for admission settle as cancelled; running tasks
    /// finish normally. Follow with [`drain`](Self::drain) to wait for them.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn record_start(starts: &Arc<StdMutex<Vec<Instant>>>) {
        starts.lock().unwrap().push(Instant::now());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_spacing_without_carryover() {
        let scheduler = Scheduler::new(SchedulerConfig::new(
            3,
            Duration::from_millis(1000),
            false,
        ));
        let starts = Arc::new(StdMutex::new(Vec::new()));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let starts = Arc::clone(&starts);
                scheduler.submit(async move {
                    record_start(&starts);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        let mut starts = starts.lock().unwrap().clone();
        starts.sort();
        assert_eq!(starts.len(), 5);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(1000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_cap() {
        let scheduler = Scheduler::new(SchedulerConfig::new(2, Duration::ZERO, false));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            scheduler.submit(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            });
        }

        scheduler.drain().await;

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_carryover_allows_burst_after_idle() {
        let scheduler = Scheduler::new(SchedulerConfig::new(
            3,
            Duration::from_millis(1000),
            true,
        ));
        let starts = Arc::new(StdMutex::new(Vec::new()));
        let origin = Instant::now();

        for _ in 0..5 {
            let starts = Arc::clone(&starts);
            scheduler.submit(async move { record_start(&starts) });
        }
        scheduler.drain().await;

        let mut offsets: Vec<_> = starts
            .lock()
            .unwrap()
            .iter()
            .map(|t| *t - origin)
            .collect();
        offsets.sort();

        assert_eq!(offsets[0], Duration::ZERO);
        assert_eq!(offsets[1], Duration::ZERO);
        assert_eq!(offsets[2], Duration::ZERO);
        assert!(offsets[3] >= Duration::from_millis(1000));
        assert!(offsets[4] - offsets[3] >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_six_tasks_take_at_least_three_waves() {
        for carryover in [false, true] {
            let scheduler = Scheduler::new(SchedulerConfig::new(
                2,
                Duration::from_millis(1000),
                carryover,
            ));
            let starts = Arc::new(StdMutex::new(Vec::new()));

            for _ in 0..6 {
                let starts = Arc::clone(&starts);
                scheduler.submit(async move {
                    record_start(&starts);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                });
            }
            scheduler.drain().await;

            let mut waves = starts.lock().unwrap().clone();
            waves.sort();
            waves.dedup();
            assert!(waves.len() >= 3, "carryover={}: {} waves", carryover, waves.len());
            for pair in waves.windows(2) {
                assert!(pair[1] - pair[0] >= Duration::from_millis(1000));
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_handles_settle_with_output() {
        let scheduler = Scheduler::new(SchedulerConfig::new(2, Duration::from_millis(50), false));

        let handles: Vec<_> = (0..4u32)
            .map(|i| scheduler.submit(async move { i * 10 }))
            .collect();

        let mut outputs = Vec::new();
        for handle in handles {
            outputs.push(handle.await.unwrap());
        }
        assert_eq!(outputs, vec![0, 10, 20, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_lets_running_task_finish() {
        let scheduler = Scheduler::new(SchedulerConfig::new(1, Duration::ZERO, false));
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();

        let running = scheduler.submit(async move {
            let _ = started_tx.send(());
            tokio::time::sleep(Duration::from_secs(1)).await;
            "finished"
        });
        let queued: Vec<_> = (0..3).map(|_| scheduler.submit(async { "queued" })).collect();

        started_rx.await.unwrap();
        scheduler.shutdown();

        let late = scheduler.submit(async { "late" });

        scheduler.drain().await;

        assert_eq!(running.await, Ok("finished"));
        for handle in queued {
            assert_eq!(handle.await, Err(SchedulerError::Cancelled));
        }
        assert_eq!(late.await, Err(SchedulerError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_interval_wait() {
        let scheduler = Scheduler::new(SchedulerConfig::new(
            4,
            Duration::from_secs(60),
            false,
        ));

        let first = scheduler.submit(async { 1 });
        let second = scheduler.submit(async { 2 });

        assert_eq!(first.await, Ok(1));
        scheduler.shutdown();
        assert_eq!(second.await, Err(SchedulerError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_waiting_for_gate_lock() {
        let config = SchedulerConfig::new(3, Duration::from_millis(1000), true);
        let gate = Arc::new(IntervalGate::new(&config));
        let shutdown = CancellationToken::new();

        // A start slot is free, but another task holds the gate
        let held = gate.next_start.lock().await;
        let waiting = {
            let gate = Arc::clone(&gate);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { gate.admit(&shutdown).await })
        };
        tokio::task::yield_now().await;

        shutdown.cancel();
        drop(held);

        assert_eq!(waiting.await.unwrap(), Err(SchedulerError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_interval_does_not_overflow() {
        let config = SchedulerConfig::new(4, Duration::MAX, true);
        let gate = IntervalGate::new(&config);
        let shutdown = CancellationToken::new();

        assert!(gate.admit(&shutdown).await.is_ok());

        shutdown.cancel();
        assert_eq!(gate.admit(&shutdown).await, Err(SchedulerError::Cancelled));
    }

    #[tokio::test]
    async fn test_panicking_task_settles() {
        let scheduler = Scheduler::new(SchedulerConfig::new(1, Duration::ZERO, false));

        let handle = scheduler.submit(async {
            panic!("extractor bug");
        });
        let after = scheduler.submit(async { 7 });

        assert!(matches!(handle.await, Err(SchedulerError::Panicked(_))));
        assert_eq!(after.await, Ok(7));
    }
}
