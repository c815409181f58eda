// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Fixed worker pool with longest-task-first dispatch and a completion
//! latch.
//!
//! Tasks flow through one shared channel; workers and the driving thread
//! take from the same queue. Submission sorts each batch by descending
//! estimated cost so a single large task cannot start late and dominate tail
//! latency. The latch counts outstanding tasks; a guard decrements it on
//! drop, so a task that fails or panics still releases the barrier.

use crate::cancel::CancellationToken;
use ahash::AHashMap;
use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};
use crossbeam::select;
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How often blocked waits re-check the cancellation token.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// One unit of work: a label for diagnostics, an estimated cost for
/// dispatch ordering, and the closure to run.
pub struct Job {
    label: String,
    cost: u64,
    work: Box<dyn FnOnce() + Send + 'static>,
}

impl Job {
    pub fn new(label: impl Into<String>, cost: u64, work: impl FnOnce() + Send + 'static) -> Self {
        Self {
            label: label.into(),
            cost,
            work: Box::new(work),
        }
    }

    pub fn cost(&self) -> u64 {
        self.cost
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Counts outstanding task results; generation completion is simply "no
/// results outstanding".
struct CompletionLatch {
    remaining: Mutex<usize>,
    drained: Condvar,
}

impl CompletionLatch {
    fn new() -> Self {
        Self {
            remaining: Mutex::new(0),
            drained: Condvar::new(),
        }
    }

    fn add(&self, count: usize) {
        *self.remaining.lock() += count;
    }

    fn complete_one(&self) {
        let mut remaining = self.remaining.lock();
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.drained.notify_all();
        }
    }

    fn outstanding(&self) -> usize {
        *self.remaining.lock()
    }

    /// Block until drained or cancelled. True when drained.
    fn wait_until_drained(&self, token: &CancellationToken) -> bool {
        let mut remaining = self.remaining.lock();
        loop {
            if *remaining == 0 {
                return true;
            }
            if token.is_cancelled() {
                return false;
            }
            self.drained.wait_for(&mut remaining, WAIT_SLICE);
        }
    }

    /// Block until drained or the deadline passes. True when drained.
    fn wait_with_deadline(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.drained.wait_for(&mut remaining, deadline - now);
        }
        true
    }
}

/// Guard ensuring completion registration runs on every exit path.
struct LatchGuard<'a>(&'a CompletionLatch);

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.0.complete_one();
    }
}

struct PoolShared {
    tasks: Receiver<Job>,
    wakeup: Receiver<()>,
    token: CancellationToken,
    latch: CompletionLatch,
    /// worker index -> label of the task currently executing
    busy: Mutex<AHashMap<usize, String>>,
}

/// Fixed pool of long-lived worker threads. The driving thread participates
/// in task execution through [`WorkerPool::drive_until_complete`].
pub struct WorkerPool {
    shared: Arc<PoolShared>,
    task_tx: Option<Sender<Job>>,
    // Held only to close the wakeup channel on shutdown, releasing any
    // worker blocked in select
    wakeup_tx: Option<Sender<()>>,
    handles: Vec<thread::JoinHandle<()>>,
    worker_count: usize,
}

impl WorkerPool {
    pub fn new(worker_count: usize, token: CancellationToken) -> Self {
        let (task_tx, task_rx) = unbounded();
        let (wakeup_tx, wakeup_rx) = unbounded();
        let shared = Arc::new(PoolShared {
            tasks: task_rx,
            wakeup: wakeup_rx,
            token,
            latch: CompletionLatch::new(),
            busy: Mutex::new(AHashMap::new()),
        });

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let shared = shared.clone();
            let handle = thread::Builder::new()
                .name(format!("evograph-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, shared))
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }
        info!("[POOL] started {} worker threads", worker_count);

        Self {
            shared,
            task_tx: Some(task_tx),
            wakeup_tx: Some(wakeup_tx),
            handles,
            worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Submit a batch, sorted by descending estimated cost. Returns the
    /// dispatch order (labels) for diagnostics and testing.
    pub fn submit(&self, mut jobs: Vec<Job>) -> Vec<String> {
        jobs.sort_by(|a, b| b.cost.cmp(&a.cost));
        let order: Vec<String> = jobs.iter().map(|j| j.label.clone()).collect();
        self.shared.latch.add(jobs.len());
        if let Some(tx) = &self.task_tx {
            for job in jobs {
                if let Err(e) = tx.send(job) {
                    // Queue closed mid-shutdown: the result will never
                    // arrive, release its latch slot
                    warn!("[POOL] task '{}' dropped: queue closed", e.0.label);
                    self.shared.latch.complete_one();
                }
            }
        } else {
            for job in jobs {
                warn!("[POOL] task '{}' dropped: pool shut down", job.label);
                self.shared.latch.complete_one();
            }
        }
        order
    }

    /// The driving thread executes queued tasks alongside the workers, then
    /// blocks until every submitted task's result is recorded or the token
    /// cancels. True when the batch fully drained.
    pub fn drive_until_complete(&self) -> bool {
        let driver_id = self.worker_count;
        while !self.shared.token.is_cancelled() {
            match self.shared.tasks.try_recv() {
                Ok(job) => run_job(driver_id, &self.shared, job),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        self.shared.latch.wait_until_drained(&self.shared.token)
    }

    /// Bounded wait for in-flight tasks to finish (no preemption exists).
    /// True when everything drained within the grace period.
    pub fn await_quiescence(&self, grace: Duration) -> bool {
        self.shared.latch.wait_with_deadline(grace)
    }

    /// Discard tasks that were queued but never picked up; their results
    /// will never arrive, so their latch slots are released. Called on the
    /// shutdown path before waiting for in-flight work.
    pub fn discard_queued(&self) -> usize {
        let mut discarded = 0usize;
        while let Ok(job) = self.shared.tasks.try_recv() {
            debug!("[POOL] discarding queued task '{}'", job.label);
            self.shared.latch.complete_one();
            discarded += 1;
        }
        discarded
    }

    /// Live-thread diagnostics: what every busy worker is running, and how
    /// many results are still outstanding.
    pub fn dump_diagnostics(&self) {
        let busy = self.shared.busy.lock();
        warn!(
            "[POOL] diagnostics: {} tasks outstanding, {} workers busy",
            self.shared.latch.outstanding(),
            busy.len()
        );
        for (worker_id, label) in busy.iter() {
            let name = if *worker_id == self.worker_count {
                "driver".to_string()
            } else {
                format!("evograph-worker-{}", worker_id)
            };
            warn!("[POOL]   {} executing '{}'", name, label);
        }
    }

    /// Cooperative shutdown: cancel, close the queue, wake blocked workers,
    /// then wait (bounded) for the threads to exit. On timeout, dumps
    /// diagnostics and proceeds without the stragglers.
    pub fn shutdown(&mut self, grace: Duration) {
        if self.task_tx.is_none() {
            return; // already shut down
        }
        info!("[POOL] shutting down");
        self.shared.token.cancel();
        self.task_tx.take();
        self.wakeup_tx.take();
        let discarded = self.discard_queued();
        if discarded > 0 {
            warn!("[POOL] {} queued tasks discarded at shutdown", discarded);
        }

        let handles: Vec<thread::JoinHandle<()>> = self.handles.drain(..).collect();
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            for handle in handles {
                if handle.join().is_err() {
                    warn!("[POOL] worker thread panicked during shutdown");
                }
            }
            let _ = tx.send(());
        });

        match rx.recv_timeout(grace) {
            Ok(()) => info!("[POOL] all workers stopped cleanly"),
            Err(_) => {
                warn!(
                    "[POOL] workers did not stop within {:?}, proceeding with shutdown",
                    grace
                );
                self.dump_diagnostics();
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown(Duration::from_secs(2));
    }
}

fn worker_loop(worker_id: usize, shared: Arc<PoolShared>) {
    debug!("[WORKER-{}] started", worker_id);
    loop {
        if shared.token.is_cancelled() {
            break;
        }
        select! {
            recv(shared.tasks) -> msg => match msg {
                Ok(job) => {
                    // Exit flag is checked at task pickup too
                    if shared.token.is_cancelled() {
                        debug!("[WORKER-{}] dropping '{}' at pickup: shutting down", worker_id, job.label);
                        shared.latch.complete_one();
                        break;
                    }
                    run_job(worker_id, &shared, job);
                }
                // Queue closed: no task will ever arrive again
                Err(_) => break,
            },
            recv(shared.wakeup) -> _msg => {
                // Only closes (or fires) on shutdown; loop re-checks the token
            }
        }
    }
    debug!("[WORKER-{}] exiting", worker_id);
}

fn run_job(worker_id: usize, shared: &PoolShared, job: Job) {
    // Registered before execution: even a panicking task completes the latch
    let _guard = LatchGuard(&shared.latch);
    shared.busy.lock().insert(worker_id, job.label.clone());
    let label = job.label;
    let outcome = catch_unwind(AssertUnwindSafe(job.work));
    if outcome.is_err() {
        error!(
            "[POOL] task '{}' panicked; its result is absent from this generation",
            label
        );
    }
    shared.busy.lock().remove(&worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(workers: usize) -> (WorkerPool, CancellationToken) {
        let token = CancellationToken::new();
        (WorkerPool::new(workers, token.clone()), token)
    }

    #[test]
    fn dispatches_longest_task_first() {
        let (pool, _token) = pool(4);
        let (tx, rx) = unbounded();
        let mut jobs = Vec::new();
        for (i, cost) in [1u64, 1, 5, 1, 1, 1, 1, 1, 1, 1].iter().enumerate() {
            let tx = tx.clone();
            let cost = *cost;
            jobs.push(Job::new(format!("task-{}", i), cost, move || {
                tx.send(cost).unwrap();
            }));
        }
        drop(tx);
        let order = pool.submit(jobs);
        // The cost-5 task is dispatched first
        assert_eq!(order[0], "task-2");

        assert!(pool.drive_until_complete());
        // The barrier unblocks only once all 10 results are recorded
        let results: Vec<u64> = rx.try_iter().collect();
        assert_eq!(results.len(), 10);
        assert_eq!(results.iter().sum::<u64>(), 14);
    }

    #[test]
    fn panicking_task_does_not_wedge_the_barrier() {
        let (pool, _token) = pool(2);
        let completed = Arc::new(AtomicUsize::new(0));
        let mut jobs = Vec::new();
        jobs.push(Job::new("bad", 3, || panic!("task failure")));
        for i in 0..4 {
            let completed = completed.clone();
            jobs.push(Job::new(format!("good-{}", i), 1, move || {
                completed.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.submit(jobs);
        assert!(pool.drive_until_complete());
        assert_eq!(completed.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn cancellation_unblocks_the_wait() {
        let (pool, token) = pool(1);
        let jobs = vec![Job::new("slow", 1, || {
            thread::sleep(Duration::from_millis(300));
        })];
        pool.submit(jobs);
        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                token.cancel();
            })
        };
        // Driver does not take the task (worker grabbed it); wait is cut
        // short by cancellation before the sleep finishes
        let start = Instant::now();
        let drained = pool.drive_until_complete();
        canceller.join().unwrap();
        if !drained {
            assert!(start.elapsed() < Duration::from_millis(300));
        }
        // The in-flight task still finishes within the grace period
        assert!(pool.await_quiescence(Duration::from_secs(2)));
    }

    #[test]
    fn submit_after_shutdown_releases_latch_slots() {
        let (mut pool, _token) = pool(1);
        pool.shutdown(Duration::from_secs(1));
        pool.submit(vec![Job::new("late", 1, || {})]);
        assert_eq!(pool.shared.latch.outstanding(), 0);
    }

    #[test]
    fn second_wave_after_primary_drains() {
        let (pool, _token) = pool(2);
        let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let mut primary = Vec::new();
        for _ in 0..4 {
            let log = log.clone();
            primary.push(Job::new("primary", 2, move || {
                log.lock().push("primary");
            }));
        }
        pool.submit(primary);
        assert!(pool.drive_until_complete());

        let mut secondary = Vec::new();
        for _ in 0..2 {
            let log = log.clone();
            secondary.push(Job::new("secondary", 1, move || {
                log.lock().push("secondary");
            }));
        }
        pool.submit(secondary);
        assert!(pool.drive_until_complete());

        let log = log.lock();
        assert_eq!(log.len(), 6);
        // The swap happened only after the primary source fully drained
        assert!(log[..4].iter().all(|s| *s == "primary"));
        assert!(log[4..].iter().all(|s| *s == "secondary"));
    }
}
