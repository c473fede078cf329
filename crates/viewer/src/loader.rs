//! Bounded-concurrency progressive loader.
//!
//! Turns `(index, locator)` requests into loaded elements with at most
//! `max_concurrent` loads in flight. Waiting requests are admitted in FIFO
//! order, and a slot is refilled as soon as any load finishes.
//!
//! Per item:
//!
//! ```text
//! QUEUED -> LOADING -> done
//!                   -> failed -> RETRY_QUEUED -> LOADING -> done
//!                                                        -> PERMANENT_FAILURE
//! ```
//!
//! A permanently failed index is never admitted again until [`ProgressiveLoader::reset`].

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Range;
use std::sync::Arc;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;

/// Why one asset failed to load.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("load failed: {0}")]
    Failed(String),
}

/// Produces a presentation element for one asset locator.
#[async_trait]
pub trait AssetLoader: Send + Sync + 'static {
    type Element: Send + 'static;

    async fn load(&self, locator: &str) -> Result<Self::Element, LoadError>;
}

/// Completion reported by [`ProgressiveLoader::next_event`].
#[derive(Debug)]
pub enum LoadEvent<E> {
    Loaded { index: usize, element: E },
    /// First failure; the item went to the back of the queue.
    Retrying { index: usize, error: LoadError },
    /// Second failure; the index will not be tried again.
    Dropped { index: usize, error: LoadError },
    Cancelled { index: usize },
}

#[derive(Debug, Clone)]
struct Job {
    index: usize,
    locator: String,
    retried: bool,
    generation: u64,
}

struct Running {
    job: Job,
    cancel: CancellationToken,
}

/// FIFO admission into a fixed concurrency budget, with one retry per item.
pub struct ProgressiveLoader<L: AssetLoader> {
    loader: Arc<L>,
    max_concurrent: usize,
    session: CancellationToken,
    queue: VecDeque<Job>,
    tasks: JoinSet<Option<Result<L::Element, LoadError>>>,
    running: HashMap<Id, Running>,
    permanently_failed: HashSet<usize>,
    generation: u64,
    peak_in_flight: usize,
}

impl<L: AssetLoader> ProgressiveLoader<L> {
    /// Every load runs under a child of `session`; cancelling it stops them all.
    pub fn new(loader: Arc<L>, max_concurrent: usize, session: CancellationToken) -> Self {
        Self {
            loader,
            max_concurrent: max_concurrent.max(1),
            session,
            queue: VecDeque::new(),
            tasks: JoinSet::new(),
            running: HashMap::new(),
            permanently_failed: HashSet::new(),
            generation: 0,
            peak_in_flight: 0,
        }
    }

    /// Queue a load. Returns false if the index is already queued, loading,
    /// permanently failed, or the session is over.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&mut self, index: usize, locator: impl Into<String>) -> bool {
        if self.session.is_cancelled() || self.permanently_failed.contains(&index) || self.is_pending(index) {
            return false;
        }
        self.queue.push_back(Job { index, locator: locator.into(), retried: false, generation: self.generation });
        self.drain();
        true
    }

    /// Fill the concurrency budget from the front of the queue.
    fn drain(&mut self) {
        while self.running.len() < self.max_concurrent && !self.session.is_cancelled() {
            let Some(job) = self.queue.pop_front() else { break };
            self.spawn(job);
        }
    }

    fn spawn(&mut self, job: Job) {
        let cancel = self.session.child_token();
        let token = cancel.clone();
        let loader = Arc::clone(&self.loader);
        let locator = job.locator.clone();

        let handle = self.tasks.spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = loader.load(&locator) => Some(result),
            }
        });

        self.running.insert(handle.id(), Running { job, cancel });
        self.peak_in_flight = self.peak_in_flight.max(self.running.len());
    }

    /// Wait for the next completion. `None` once nothing is queued or running.
    pub async fn next_event(&mut self) -> Option<LoadEvent<L::Element>> {
        loop {
            self.drain();

            let (id, outcome) = match self.tasks.join_next_with_id().await? {
                Ok((id, outcome)) => (id, outcome),
                Err(err) if err.is_panic() => (err.id(), Some(Err(LoadError::Failed("loader panicked".into())))),
                Err(err) => (err.id(), None),
            };

            let Some(Running { job, cancel }) = self.running.remove(&id) else { continue };
            if job.generation != self.generation {
                continue;
            }

            let index = job.index;
            let event = match outcome {
                None => LoadEvent::Cancelled { index },
                // A failure racing its own cancellation is not a real attempt.
                Some(Err(_)) if cancel.is_cancelled() => LoadEvent::Cancelled { index },
                Some(Ok(element)) => LoadEvent::Loaded { index, element },
                Some(Err(error)) if !job.retried => {
                    tracing::debug!(index, %error, "load failed, queueing retry");
                    self.queue.push_back(Job { retried: true, ..job });
                    LoadEvent::Retrying { index, error }
                }
                Some(Err(error)) => {
                    tracing::debug!(index, %error, "load failed twice, dropping");
                    self.permanently_failed.insert(index);
                    LoadEvent::Dropped { index, error }
                }
            };

            self.drain();
            return Some(event);
        }
    }

    /// Cancel a queued or running load for `index`.
    pub fn cancel(&mut self, index: usize) -> bool {
        let before = self.queue.len();
        self.queue.retain(|job| job.index != index);
        let mut hit = self.queue.len() != before;
        for running in self.running.values().filter(|r| r.job.index == index) {
            running.cancel.cancel();
            hit = true;
        }
        hit
    }

    /// Cancel every queued or running load whose index falls outside `keep`.
    pub fn cancel_outside(&mut self, keep: Range<usize>) -> usize {
        let before = self.queue.len();
        self.queue.retain(|job| keep.contains(&job.index));
        let mut cancelled = before - self.queue.len();
        for running in self.running.values().filter(|r| !keep.contains(&r.job.index)) {
            if !running.cancel.is_cancelled() {
                running.cancel.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Forget all indices: cancel outstanding work and clear failure bookkeeping.
    ///
    /// Completions of loads started before the reset are discarded silently.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.queue.clear();
        for running in self.running.values() {
            running.cancel.cancel();
        }
        self.permanently_failed.clear();
    }

    /// Record `index` as permanently failed without loading it.
    pub fn mark_failed(&mut self, index: usize) {
        self.queue.retain(|job| job.index != index);
        self.permanently_failed.insert(index);
    }

    /// Cancel the session and wait for every task to wind down.
    pub async fn shutdown(&mut self) {
        self.session.cancel();
        self.queue.clear();
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
        self.running.clear();
    }

    pub fn is_pending(&self, index: usize) -> bool {
        self.queue.iter().any(|job| job.index == index)
            || self.running.values().any(|r| {
                r.job.index == index && r.job.generation == self.generation && !r.cancel.is_cancelled()
            })
    }

    pub fn in_flight(&self) -> usize {
        self.running.len()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Highest number of simultaneous loads observed so far.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn permanently_failed(&self) -> &HashSet<usize> {
        &self.permanently_failed
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.running.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Loader that sleeps, tracks concurrency, and fails on request.
    #[derive(Default)]
    struct Probe {
        current: AtomicUsize,
        peak: AtomicUsize,
        started: Mutex<Vec<String>>,
        fail_always: Mutex<HashSet<String>>,
        fail_once: Mutex<HashSet<String>>,
    }

    impl Probe {
        fn attempts(&self, locator: &str) -> usize {
            self.started.lock().unwrap().iter().filter(|l| *l == locator).count()
        }
    }

    #[async_trait]
    impl AssetLoader for Probe {
        type Element = String;

        async fn load(&self, locator: &str) -> Result<String, LoadError> {
            self.started.lock().unwrap().push(locator.to_string());
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            if self.fail_always.lock().unwrap().contains(locator) || self.fail_once.lock().unwrap().remove(locator) {
                return Err(LoadError::Failed(locator.to_string()));
            }
            Ok(format!("<img {locator}>"))
        }
    }

    async fn run_to_idle<L: AssetLoader>(loader: &mut ProgressiveLoader<L>) -> Vec<LoadEvent<L::Element>> {
        let mut events = Vec::new();
        while let Some(event) = loader.next_event().await {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_budget() {
        let probe = Arc::new(Probe::default());
        let mut loader = ProgressiveLoader::new(probe.clone(), 4, CancellationToken::new());

        for i in 0..20 {
            assert!(loader.enqueue(i, format!("a{i}")));
            assert!(loader.in_flight() <= 4);
        }
        assert_eq!(loader.in_flight(), 4);
        assert_eq!(loader.queued(), 16);

        let events = run_to_idle(&mut loader).await;

        let loaded = events.iter().filter(|e| matches!(e, LoadEvent::Loaded { .. })).count();
        assert_eq!(loaded, 20);
        assert_eq!(loader.peak_in_flight(), 4);
        assert_eq!(probe.peak.load(Ordering::SeqCst), 4);
        assert!(loader.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_admission() {
        let probe = Arc::new(Probe::default());
        let mut loader = ProgressiveLoader::new(probe.clone(), 1, CancellationToken::new());
        for i in [7, 3, 9, 1] {
            loader.enqueue(i, format!("a{i}"));
        }

        run_to_idle(&mut loader).await;

        assert_eq!(*probe.started.lock().unwrap(), vec!["a7", "a3", "a9", "a1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_once_then_drop() {
        let probe = Arc::new(Probe::default());
        probe.fail_always.lock().unwrap().insert("bad".into());
        probe.fail_once.lock().unwrap().insert("flaky".into());
        let mut loader = ProgressiveLoader::new(probe.clone(), 2, CancellationToken::new());
        loader.enqueue(0, "bad");
        loader.enqueue(1, "flaky");
        loader.enqueue(2, "good");

        let events = run_to_idle(&mut loader).await;

        assert_eq!(probe.attempts("bad"), 2);
        assert_eq!(probe.attempts("flaky"), 2);
        assert!(events.iter().any(|e| matches!(e, LoadEvent::Dropped { index: 0, .. })));
        assert!(events.iter().any(|e| matches!(e, LoadEvent::Loaded { index: 1, .. })));
        assert!(!events.iter().any(|e| matches!(e, LoadEvent::Loaded { index: 0, .. })));
        assert!(loader.permanently_failed().contains(&0));

        assert!(!loader.enqueue(0, "bad"));
        run_to_idle(&mut loader).await;
        assert_eq!(probe.attempts("bad"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_enqueue_rejected() {
        let probe = Arc::new(Probe::default());
        let mut loader = ProgressiveLoader::new(probe.clone(), 1, CancellationToken::new());
        assert!(loader.enqueue(0, "a"));
        assert!(loader.enqueue(1, "b"));
        assert!(!loader.enqueue(0, "a"));
        assert!(!loader.enqueue(1, "b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_running_and_queued() {
        let probe = Arc::new(Probe::default());
        let mut loader = ProgressiveLoader::new(probe.clone(), 1, CancellationToken::new());
        loader.enqueue(0, "a");
        loader.enqueue(1, "b");

        assert!(loader.cancel(0));
        assert!(loader.cancel(1));
        let events = run_to_idle(&mut loader).await;

        assert!(matches!(events.as_slice(), [LoadEvent::Cancelled { index: 0 }]));
        assert_eq!(probe.attempts("b"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_outside_range() {
        let probe = Arc::new(Probe::default());
        let mut loader = ProgressiveLoader::new(probe.clone(), 2, CancellationToken::new());
        for i in 0..6 {
            loader.enqueue(i, format!("a{i}"));
        }

        assert_eq!(loader.cancel_outside(1..4), 3);
        let events = run_to_idle(&mut loader).await;

        let loaded: HashSet<usize> = events
            .iter()
            .filter_map(|e| match e {
                LoadEvent::Loaded { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(loaded, HashSet::from([1, 2, 3]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_index_can_be_requeued_before_join() {
        let probe = Arc::new(Probe::default());
        let mut loader = ProgressiveLoader::new(probe.clone(), 2, CancellationToken::new());
        loader.enqueue(0, "a");
        loader.cancel_outside(5..10);

        assert!(!loader.is_pending(0));
        assert!(loader.enqueue(0, "a"));
        assert!(!loader.enqueue(0, "a"));

        let events = run_to_idle(&mut loader).await;
        assert!(events.iter().any(|e| matches!(e, LoadEvent::Loaded { index: 0, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_discards_stale_completions() {
        let probe = Arc::new(Probe::default());
        let mut loader = ProgressiveLoader::new(probe.clone(), 2, CancellationToken::new());
        loader.enqueue(0, "a");
        loader.enqueue(1, "b");

        loader.reset();
        assert!(loader.enqueue(0, "c"));
        let events = run_to_idle(&mut loader).await;

        assert!(matches!(events.as_slice(), [LoadEvent::Loaded { index: 0, element }] if element == "<img c>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_cancel_stops_everything() {
        let probe = Arc::new(Probe::default());
        let session = CancellationToken::new();
        let mut loader = ProgressiveLoader::new(probe.clone(), 2, session.clone());
        for i in 0..5 {
            loader.enqueue(i, format!("a{i}"));
        }

        session.cancel();
        let events = run_to_idle(&mut loader).await;

        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| matches!(e, LoadEvent::Cancelled { .. })));
        assert!(probe.started.lock().unwrap().len() <= 2);
        assert!(!loader.enqueue(9, "late"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_failed_blocks_enqueue() {
        let probe = Arc::new(Probe::default());
        let mut loader = ProgressiveLoader::new(probe, 2, CancellationToken::new());
        loader.mark_failed(3);
        assert!(!loader.enqueue(3, "a"));
    }
}
