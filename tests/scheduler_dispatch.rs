// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Dispatch-order and completion-barrier behavior of the worker pool:
//! four workers plus the driving thread, one batch with a single large task
//! among nine small ones.

use evograph::engine::{CancellationToken, Job, WorkerPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn large_task_dispatches_first_and_barrier_waits_for_all() {
    let token = CancellationToken::new();
    let pool = WorkerPool::new(4, token);

    let recorded = Arc::new(AtomicUsize::new(0));
    let costs = [5u64, 1, 1, 1, 1, 1, 1, 1, 1, 1];
    let mut jobs = Vec::new();
    for (i, cost) in costs.iter().enumerate() {
        let recorded = recorded.clone();
        let cost = *cost;
        jobs.push(Job::new(format!("task-{}", i), cost, move || {
            // Small tasks linger so the barrier has something to wait on
            std::thread::sleep(Duration::from_millis(10 * cost));
            recorded.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let order = pool.submit(jobs);
    // Longest-estimated-cost-first: the cost-5 task leads the queue
    assert_eq!(order[0], "task-0");
    assert_eq!(order.len(), 10);

    assert!(pool.drive_until_complete());
    // The completion wait released only once every result was recorded
    assert_eq!(recorded.load(Ordering::SeqCst), 10);
}

#[test]
fn equal_costs_have_no_ordering_guarantee_but_all_complete() {
    let token = CancellationToken::new();
    let pool = WorkerPool::new(4, token);

    let recorded = Arc::new(AtomicUsize::new(0));
    let mut jobs = Vec::new();
    for i in 0..20 {
        let recorded = recorded.clone();
        jobs.push(Job::new(format!("flat-{}", i), 1, move || {
            recorded.fetch_add(1, Ordering::SeqCst);
        }));
    }
    pool.submit(jobs);
    assert!(pool.drive_until_complete());
    assert_eq!(recorded.load(Ordering::SeqCst), 20);
}
