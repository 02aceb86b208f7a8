//! Bounded worker pool
//!
//! A fixed set of OS threads drains a shared FIFO of tasks. Tasks may submit
//! further tasks through the [`PoolHandle`] they are given, which is how the
//! tree walk grows its own backlog. Extraction uses the same pool with a
//! backlog that is complete before the first task runs.
//!
//! # Completion
//!
//! The pool counts *pending* tasks: incremented on submit, decremented when a
//! task finishes (or is discarded). A parent always submits its children
//! before its own count is released, so the count only reaches zero when the
//! whole transitive backlog has drained. [`WorkerPool::wait`] blocks on a
//! condition variable for that moment instead of polling the queue.
//!
//! ```text
//!   submit ──► pending += 1 ──► [ FIFO ] ──► worker N ──► handler(task, &handle)
//!                                                │               │
//!                                                │          handle.submit(child)
//!                                                ▼
//!                                     WorkGuard drop: pending -= 1
//!                                     (notify waiters when it hits 0)
//! ```

use crate::error::WorkerError;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, trace};

/// Pending/active bookkeeping shared by a pool and all of its handles
#[derive(Debug, Default)]
pub struct PendingTracker {
    /// Submitted tasks not yet finished (queued + running)
    pending: Mutex<usize>,

    /// Signalled when `pending` drops to zero
    idle: Condvar,

    /// Tasks currently executing
    active: AtomicUsize,

    /// Tasks dropped because the pool was cancelled
    discarded: AtomicU64,

    /// Tasks whose handler panicked
    panicked: AtomicU64,
}

impl PendingTracker {
    fn begin(&self) {
        *self.pending.lock() += 1;
    }

    fn finish(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }

    /// Queued plus running tasks
    pub fn pending(&self) -> usize {
        *self.pending.lock()
    }

    /// Running tasks
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn wait(&self) {
        let mut pending = self.pending.lock();
        while *pending > 0 {
            self.idle.wait(&mut pending);
        }
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = self.pending.lock();
        while *pending > 0 {
            if self.idle.wait_until(&mut pending, deadline).timed_out() {
                return *pending == 0;
            }
        }
        true
    }
}

/// RAII guard for a dequeued task
///
/// Marks the task active while it runs and releases its pending slot on drop,
/// including when the handler unwinds.
pub struct WorkGuard<'a> {
    tracker: &'a PendingTracker,
}

impl<'a> WorkGuard<'a> {
    /// Create a new work guard (marks the task as active)
    pub fn new(tracker: &'a PendingTracker) -> Self {
        tracker.active.fetch_add(1, Ordering::SeqCst);
        Self { tracker }
    }
}

impl Drop for WorkGuard<'_> {
    fn drop(&mut self) {
        self.tracker.active.fetch_sub(1, Ordering::SeqCst);
        self.tracker.finish();
    }
}

/// Submission handle, given to every task and cloneable for outside use
pub struct PoolHandle<T> {
    sender: Sender<T>,
    tracker: Arc<PendingTracker>,
    cancelled: Arc<AtomicBool>,
}

impl<T> Clone for PoolHandle<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            tracker: Arc::clone(&self.tracker),
            cancelled: Arc::clone(&self.cancelled),
        }
    }
}

impl<T> PoolHandle<T> {
    /// Queue a task
    ///
    /// Fails once the pool has been cancelled or shut down.
    pub fn submit(&self, task: T) -> Result<(), WorkerError> {
        if self.is_cancelled() {
            return Err(WorkerError::PoolClosed);
        }

        self.tracker.begin();
        if self.sender.send(task).is_err() {
            self.tracker.finish();
            return Err(WorkerError::PoolClosed);
        }
        Ok(())
    }

    /// Whether the owning pool was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct PoolWorker {
    id: usize,
    handle: Option<JoinHandle<()>>,
}

/// Fixed-size thread pool with a dynamic backlog
pub struct WorkerPool<T: Send + 'static> {
    name: String,
    handle: PoolHandle<T>,

    /// Dropping this disconnects every worker's close receiver
    close_tx: Option<Sender<()>>,

    workers: Vec<PoolWorker>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawn `size` workers (at least one) running `handler` for every task
    pub fn new<F>(name: &str, size: usize, handler: F) -> Result<Self, WorkerError>
    where
        F: Fn(T, &PoolHandle<T>) + Send + Sync + 'static,
    {
        let size = size.max(1);
        let (sender, receiver) = unbounded::<T>();
        let (close_tx, close_rx) = bounded::<()>(0);
        let handler = Arc::new(handler);

        let handle = PoolHandle {
            sender,
            tracker: Arc::new(PendingTracker::default()),
            cancelled: Arc::new(AtomicBool::new(false)),
        };

        let mut pool = Self {
            name: name.to_string(),
            handle,
            close_tx: Some(close_tx),
            workers: Vec::with_capacity(size),
        };

        for id in 0..size {
            let receiver = receiver.clone();
            let close_rx = close_rx.clone();
            let handle = pool.handle.clone();
            let handler = Arc::clone(&handler);

            // On error the partially built pool is dropped, which joins
            // the workers already started.
            let thread = thread::Builder::new()
                .name(format!("{}-{}", name, id))
                .spawn(move || worker_loop(id, receiver, close_rx, handle, handler))
                .map_err(|e| WorkerError::SpawnFailed {
                    id,
                    reason: e.to_string(),
                })?;

            pool.workers.push(PoolWorker {
                id,
                handle: Some(thread),
            });
        }

        debug!(pool = %pool.name, workers = size, "Worker pool started");
        Ok(pool)
    }

    /// Queue a task
    pub fn submit(&self, task: T) -> Result<(), WorkerError> {
        self.handle.submit(task)
    }

    /// Block until every submitted task, including transitively submitted
    /// ones, has finished
    pub fn wait(&self) {
        self.handle.tracker.wait();
    }

    /// Like [`wait`](Self::wait) with a deadline; `true` if the pool is idle
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.handle.tracker.wait_timeout(timeout)
    }

    /// Stop accepting work and discard queued tasks as workers reach them.
    /// Tasks already running complete normally.
    pub fn cancel(&self) {
        if !self.handle.cancelled.swap(true, Ordering::SeqCst) {
            debug!(pool = %self.name, pending = self.pending(), "Worker pool cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    /// Queued plus running tasks
    pub fn pending(&self) -> usize {
        self.handle.tracker.pending()
    }

    /// Running tasks
    pub fn active(&self) -> usize {
        self.handle.tracker.active()
    }

    /// Tasks dropped by cancellation so far
    pub fn discarded(&self) -> u64 {
        self.handle.tracker.discarded.load(Ordering::Relaxed)
    }

    /// Tasks whose handler panicked so far
    pub fn panicked(&self) -> u64 {
        self.handle.tracker.panicked.load(Ordering::Relaxed)
    }

    /// Worker thread count
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Stop the workers and join them
    ///
    /// Call [`wait`](Self::wait) first for a graceful drain; tasks still
    /// queued at this point are never run.
    pub fn shutdown(mut self) -> Result<(), WorkerError> {
        self.close_and_join()
    }

    fn close_and_join(&mut self) -> Result<(), WorkerError> {
        drop(self.close_tx.take());

        let mut first_error = None;
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    error!(pool = %self.name, worker = worker.id, "Worker thread panicked");
                    first_error.get_or_insert(WorkerError::Panicked {
                        id: worker.id,
                        message: "worker thread panicked".into(),
                    });
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<T: Send + 'static> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        if self.close_tx.is_some() {
            let _ = self.close_and_join();
        }
    }
}

/// Main worker loop
fn worker_loop<T, F>(
    id: usize,
    receiver: Receiver<T>,
    close_rx: Receiver<()>,
    handle: PoolHandle<T>,
    handler: Arc<F>,
) where
    F: Fn(T, &PoolHandle<T>),
{
    trace!(worker = id, "Worker starting");

    loop {
        select! {
            recv(receiver) -> msg => {
                let Ok(task) = msg else { break };
                let _guard = WorkGuard::new(&handle.tracker);

                if handle.is_cancelled() {
                    handle.tracker.discarded.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                if panic::catch_unwind(AssertUnwindSafe(|| (*handler)(task, &handle))).is_err() {
                    handle.tracker.panicked.fetch_add(1, Ordering::Relaxed);
                    error!(worker = id, "Task panicked; worker continues");
                }
            }
            recv(close_rx) -> _ => break,
        }
    }

    trace!(worker = id, "Worker shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_runs_every_task() {
        let sum = Arc::new(AtomicU64::new(0));
        let sum_clone = Arc::clone(&sum);
        let pool = WorkerPool::new("test", 4, move |n: u64, _: &PoolHandle<u64>| {
            sum_clone.fetch_add(n, Ordering::SeqCst);
        })
        .unwrap();

        for n in 1..=100 {
            pool.submit(n).unwrap();
        }
        pool.wait();

        assert_eq!(sum.load(Ordering::SeqCst), 5050);
        assert_eq!(pool.pending(), 0);
        pool.shutdown().unwrap();
    }

    #[test]
    fn test_pool_transitive_submission() {
        // Each task n > 0 spawns two tasks n - 1: 2^(d+1) - 1 tasks in total
        let count = Arc::new(AtomicU64::new(0));
        let count_clone = Arc::clone(&count);
        let pool = WorkerPool::new("tree", 3, move |depth: u32, handle: &PoolHandle<u32>| {
            count_clone.fetch_add(1, Ordering::SeqCst);
            if depth > 0 {
                handle.submit(depth - 1).unwrap();
                handle.submit(depth - 1).unwrap();
            }
        })
        .unwrap();

        pool.submit(9).unwrap();
        pool.wait();

        assert_eq!(count.load(Ordering::SeqCst), 1023);
    }

    #[test]
    fn test_pool_bounds_concurrency() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));

        let pool = WorkerPool::new("bound", 3, move |_: (), _: &PoolHandle<()>| {
            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            r.fetch_sub(1, Ordering::SeqCst);
        })
        .unwrap();

        for _ in 0..30 {
            pool.submit(()).unwrap();
        }
        pool.wait();

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.size(), 3);
        assert_eq!(pool.active(), 0);
    }

    #[test]
    fn test_single_worker_is_fifo() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let order_clone = Arc::clone(&order);
        let pool = WorkerPool::new("seq", 1, move |n: u32, _: &PoolHandle<u32>| {
            order_clone.lock().push(n);
        })
        .unwrap();

        for n in 0..10 {
            pool.submit(n).unwrap();
        }
        pool.wait();

        assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancel_discards_queued_tasks() {
        let ran = Arc::new(AtomicU64::new(0));
        let ran_clone = Arc::clone(&ran);
        let pool = WorkerPool::new("cancel", 1, move |_: (), _: &PoolHandle<()>| {
            thread::sleep(Duration::from_millis(50));
            ran_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        for _ in 0..20 {
            pool.submit(()).unwrap();
        }
        thread::sleep(Duration::from_millis(10));
        pool.cancel();
        pool.wait();

        let ran = ran.load(Ordering::SeqCst);
        assert!(ran < 20);
        assert_eq!(ran + pool.discarded(), 20);
        assert!(matches!(pool.submit(()), Err(WorkerError::PoolClosed)));
    }

    #[test]
    fn test_panicking_task_does_not_stall_pool() {
        let done = Arc::new(AtomicU64::new(0));
        let done_clone = Arc::clone(&done);
        let pool = WorkerPool::new("panic", 2, move |n: u32, _: &PoolHandle<u32>| {
            if n == 3 {
                panic!("task 3 fails");
            }
            done_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        for n in 0..10 {
            pool.submit(n).unwrap();
        }
        pool.wait();

        assert_eq!(done.load(Ordering::SeqCst), 9);
        assert_eq!(pool.panicked(), 1);
        pool.shutdown().unwrap();
    }

    #[test]
    fn test_wait_timeout_reports_busy() {
        let pool = WorkerPool::new("slow", 1, |_: (), _: &PoolHandle<()>| {
            thread::sleep(Duration::from_millis(200));
        })
        .unwrap();

        pool.submit(()).unwrap();
        assert!(!pool.wait_timeout(Duration::from_millis(50)));
        assert_eq!(pool.active(), 1);
        assert!(pool.wait_timeout(Duration::from_secs(5)));
    }

    #[test]
    fn test_empty_pool_is_idle() {
        let pool = WorkerPool::new("idle", 2, |_: (), _: &PoolHandle<()>| {}).unwrap();
        assert!(pool.wait_timeout(Duration::ZERO));
        pool.wait();
        drop(pool);
    }
}
