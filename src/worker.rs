//! Dispatch execution units: the per-key ordered queue and the shared
//! unordered pool.
//!
//! A `Worker` backs every non-concurrent subscription: one background
//! consumer draining a FIFO, so callbacks for one key never overlap and run
//! in exactly the order their strokes arrived. A `Pool` backs concurrent
//! subscriptions: jobs run on whichever pool thread is free, with no
//! ordering guarantee.
//!
//! Both isolate subscriber failures: a panicking callback is caught and
//! logged, and dispatch of subsequent jobs continues.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};

/// A unit of subscriber-visible work.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

fn run_isolated(label: &str, job: Job) {
    if catch_unwind(AssertUnwindSafe(job)).is_err() {
        log::warn!("subscriber callback panicked on {label}; dispatch continues");
    }
}

/// Single-consumer FIFO execution unit bound to one subscription key.
///
/// Created the instant a non-concurrent subscription is added and torn down
/// the instant it is removed. Queues are never pooled or reused across keys:
/// reuse would intermix unrelated ordering domains.
pub(crate) struct Worker {
    tx: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
    label: String,
}

impl Worker {
    /// Spawn the consumer thread. Construction is cheap.
    pub(crate) fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let (tx, rx): (Sender<Job>, Receiver<Job>) = unbounded();
        let thread_label = label.clone();
        let handle = std::thread::Builder::new()
            .name(format!("interflow-worker-{label}"))
            .spawn(move || {
                // Drains until every sender is dropped, then exits.
                for job in rx {
                    run_isolated(&thread_label, job);
                }
            })
            .ok();
        if handle.is_none() {
            log::warn!("failed to spawn dispatch worker for {label}");
        }
        Self {
            tx: handle.as_ref().map(|_| tx),
            handle,
            label,
        }
    }

    /// Queue a job for in-order execution. Returns immediately; after
    /// `dispose` has begun, jobs are rejected silently.
    pub(crate) fn enqueue(&self, job: Job) {
        if let Some(tx) = &self.tx {
            if tx.send(job).is_err() {
                log::warn!("dispatch worker for {} is gone; job dropped", self.label);
            }
        }
    }

    /// Stop accepting jobs, let anything already queued finish, and join the
    /// consumer thread. No callback runs after this returns, except one
    /// already mid-execution when it was called.
    pub(crate) fn dispose(&mut self) {
        self.tx = None;
        let Some(handle) = self.handle.take() else {
            return;
        };
        // A callback unsubscribing its own key disposes the worker from the
        // worker's own thread; it cannot join itself, so the thread is left
        // to exit on its own once the queue drains.
        if handle.thread().id() == std::thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::warn!("dispatch worker thread for {} panicked", self.label);
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Shared unordered pool for concurrent subscriptions.
///
/// Jobs execute exactly once on some pool thread; there is no ordering or
/// backpressure guarantee relative to other jobs or the dispatch loop.
pub(crate) struct Pool {
    tx: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl Pool {
    /// Spawn a pool with the given number of threads (at least one).
    pub(crate) fn new(threads: usize) -> Self {
        let (tx, rx): (Sender<Job>, Receiver<Job>) = unbounded();
        let mut handles = Vec::new();
        for i in 0..threads.max(1) {
            let rx = rx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("interflow-pool-{i}"))
                .spawn(move || {
                    for job in rx {
                        run_isolated("concurrent pool", job);
                    }
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => log::warn!("failed to spawn pool thread {i}: {e}"),
            }
        }
        Self {
            tx: Some(tx),
            handles,
        }
    }

    /// Submit a job for unordered execution.
    pub(crate) fn execute(&self, job: Job) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(job);
        }
    }

    fn shutdown(&mut self) {
        self.tx = None;
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn test_worker_executes_in_fifo_order() {
        let worker = Worker::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..200usize {
            let seen = seen.clone();
            worker.enqueue(Box::new(move || {
                seen.lock().unwrap().push(i);
            }));
        }

        drop(worker); // dispose drains the queue
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn test_worker_dispose_joins_and_rejects_later_jobs() {
        let mut worker = Worker::new("test");
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = counter.clone();
            worker.enqueue(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        worker.dispose();
        assert_eq!(counter.load(Ordering::SeqCst), 10);

        // Enqueues after dispose are rejected without executing.
        let counter2 = counter.clone();
        worker.enqueue(Box::new(move || {
            counter2.fetch_add(100, Ordering::SeqCst);
        }));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_worker_survives_panicking_job() {
        let mut worker = Worker::new("test");
        let counter = Arc::new(AtomicUsize::new(0));

        worker.enqueue(Box::new(|| panic!("subscriber bug")));
        let after = counter.clone();
        worker.enqueue(Box::new(move || {
            after.fetch_add(1, Ordering::SeqCst);
        }));

        worker.dispose();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pool_runs_every_job_exactly_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = Pool::new(4);
            for _ in 0..500 {
                let counter = counter.clone();
                pool.execute(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }));
            }
            // Drop joins the pool after the queue drains.
        }
        assert_eq!(counter.load(Ordering::SeqCst), 500);
    }

    #[test]
    fn test_pool_survives_panicking_job() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = Pool::new(2);
            pool.execute(Box::new(|| panic!("subscriber bug")));
            for _ in 0..20 {
                let counter = counter.clone();
                pool.execute(Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }));
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }
}
