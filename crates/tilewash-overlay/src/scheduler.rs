//! Debounced rebuild scheduling.
//!
//! Domain recomputation is requested from three directions - viewport
//! move-end, map idle, and the new-statistics signal - each with its own
//! debounce window and a single pending timer per trigger class. Firing any
//! of them runs the same recompute pass; the pass itself throttles how
//! often a full rebuild may reach the renderer.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Delays for the scheduler's trigger classes.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Debounce after the viewport stops moving.
    pub move_delay: Duration,
    /// Debounce after the map goes idle.
    pub idle_delay: Duration,
    /// Debounce after new statistics arrive.
    pub stats_delay: Duration,
    /// Minimum interval between renderer rebuilds.
    pub rebuild_throttle: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            move_delay: Duration::from_millis(400),
            idle_delay: Duration::from_millis(800),
            stats_delay: Duration::from_millis(150),
            rebuild_throttle: Duration::from_secs(3),
        }
    }
}

/// What asked for a recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// The viewport finished moving.
    MoveEnd,
    /// The map went idle.
    Idle,
    /// A decoded tile deposited new column statistics.
    NewStats,
}

/// One pending timer; re-scheduling replaces it.
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Debouncer {
    /// Create a debouncer whose timers die with `cancel`.
    pub fn new(delay: Duration, cancel: CancellationToken) -> Self {
        Debouncer {
            delay,
            pending: Mutex::new(None),
            cancel,
        }
    }

    /// Run `task` after the delay, replacing any pending run.
    ///
    /// Must be called within a Tokio runtime. Timers are best effort: a
    /// missed tick delays a rebuild, it never corrupts state.
    pub fn schedule(&self, task: impl FnOnce() + Send + 'static) {
        let mut pending = self.pending.lock();
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        let delay = self.delay;
        let cancel = self.cancel.clone();
        *pending = Some(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => task(),
            }
        }));
    }

    /// Drop any pending run.
    pub fn abort(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }
}

/// The rebuild scheduler: one debouncer per trigger class, one shared
/// recompute task.
pub struct RebuildScheduler {
    move_end: Debouncer,
    idle: Debouncer,
    stats: Debouncer,
    task: Arc<dyn Fn() + Send + Sync>,
}

impl RebuildScheduler {
    /// Create a scheduler that runs `task` when any trigger fires.
    pub fn new(
        config: &SchedulerConfig,
        cancel: &CancellationToken,
        task: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        RebuildScheduler {
            move_end: Debouncer::new(config.move_delay, cancel.clone()),
            idle: Debouncer::new(config.idle_delay, cancel.clone()),
            stats: Debouncer::new(config.stats_delay, cancel.clone()),
            task,
        }
    }

    /// Request a recompute from one trigger class.
    pub fn trigger(&self, trigger: Trigger) {
        let debouncer = match trigger {
            Trigger::MoveEnd => &self.move_end,
            Trigger::Idle => &self.idle,
            Trigger::NewStats => &self.stats,
        };
        let task = Arc::clone(&self.task);
        debouncer.schedule(move || task());
    }

    /// Drop every pending timer.
    pub fn destroy(&self) {
        self.move_end.abort();
        self.idle.abort();
        self.stats.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_scheduler(counter: Arc<AtomicUsize>) -> RebuildScheduler {
        let config = SchedulerConfig {
            move_delay: Duration::from_millis(50),
            idle_delay: Duration::from_millis(100),
            stats_delay: Duration::from_millis(20),
            rebuild_throttle: Duration::from_secs(3),
        };
        RebuildScheduler::new(
            &config,
            &CancellationToken::new(),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_triggers_in_window_coalesce() {
        let runs = Arc::new(AtomicUsize::new(0));
        let scheduler = counting_scheduler(Arc::clone(&runs));

        scheduler.trigger(Trigger::MoveEnd);
        tokio::time::sleep(Duration::from_millis(10)).await;
        scheduler.trigger(Trigger::MoveEnd);
        scheduler.trigger(Trigger::MoveEnd);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_classes_are_independent() {
        let runs = Arc::new(AtomicUsize::new(0));
        let scheduler = counting_scheduler(Arc::clone(&runs));

        scheduler.trigger(Trigger::MoveEnd);
        scheduler.trigger(Trigger::NewStats);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_drops_pending_timers() {
        let runs = Arc::new(AtomicUsize::new(0));
        let scheduler = counting_scheduler(Arc::clone(&runs));

        scheduler.trigger(Trigger::Idle);
        scheduler.destroy();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_token_stops_timers() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let cancel = CancellationToken::new();
        let debouncer = Debouncer::new(Duration::from_millis(50), cancel.clone());
        debouncer.schedule(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
