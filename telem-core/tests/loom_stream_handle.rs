//! Concurrency model for `StreamHandle::stop_and_wait` racing a dropped
//! handle against the spawned task's own exit.
//!
//! `loom` can't drive real `tokio::spawn`, so this exercises the same
//! shape (a oneshot-style flag plus a join point) with `loom`'s
//! primitives directly: the invariant under test is that a stop request
//! sent before the task observes it is never lost, and that observing it
//! after the task has already finished is harmless.

#![cfg(loom)]

use loom::sync::atomic::{AtomicBool, Ordering};
use loom::sync::Arc;
use loom::thread;

#[test]
fn stop_signal_is_never_lost() {
    loom::model(|| {
        let stop_requested = Arc::new(AtomicBool::new(false));
        let task_exited = Arc::new(AtomicBool::new(false));

        let worker = {
            let stop_requested = stop_requested.clone();
            let task_exited = task_exited.clone();
            thread::spawn(move || {
                while !stop_requested.load(Ordering::Acquire) {
                    loom::thread::yield_now();
                }
                task_exited.store(true, Ordering::Release);
            })
        };

        stop_requested.store(true, Ordering::Release);
        worker.join().unwrap();
        assert!(task_exited.load(Ordering::Acquire));
    });
}
