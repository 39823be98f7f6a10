//! A handle to a spawned streaming task that can be told to stop
//! cooperatively or aborted outright.
//!
//! A plain `JoinHandle` only supports `abort`, which is fine for tasks that
//! have no state to flush on the way out, but a Sender or Receiver task
//! needs to notice a stop request between reads/writes and exit its loop on
//! its own terms (closing the socket, releasing the host's `Sender`/
//! `Receiver` slot) rather than being cancelled mid-write. `StreamHandle`
//! layers a one-shot stop signal over the join handle and waits for the
//! task to actually finish before returning, so stopping a connection
//! synchronizes with its teardown instead of racing it.

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Told to stop cooperatively, awaiting actual completion.
#[async_trait::async_trait]
pub trait Stoppable {
    /// Request a graceful stop and wait for the task to exit.
    async fn stop(self);
}

/// Cancelled immediately, without waiting for the task to exit.
pub trait Abortable {
    /// Cancel the task without waiting for it to exit.
    fn abort(&self);
}

/// Owns a spawned task's join handle and the sender half of its stop
/// signal. Dropping a `StreamHandle` without calling `stop`/`abort`
/// aborts the task so a forgotten handle can never leak a live
/// connection.
pub struct StreamHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl StreamHandle {
    /// Pair a stop-signal sender with the join handle of the task that owns
    /// its receiver half.
    #[must_use]
    pub fn new(stop_tx: oneshot::Sender<()>, join: JoinHandle<()>) -> Self {
        Self {
            stop_tx: Some(stop_tx),
            join: Some(join),
        }
    }

    /// Build a handle for a task with no cooperative stop signal; `stop`
    /// degrades to `abort` for this handle.
    #[must_use]
    pub fn new_abort_only(join: JoinHandle<()>) -> Self {
        Self {
            stop_tx: None,
            join: Some(join),
        }
    }

    /// Returns once the task has actually exited, or immediately if it
    /// already has. Equivalent to [`Stoppable::stop`], kept as an inherent
    /// method so callers outside this crate don't need the trait in scope.
    pub async fn stop_and_wait(self) {
        Stoppable::stop(self).await;
    }
}

#[async_trait::async_trait]
impl Stoppable for StreamHandle {
    async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Abortable for StreamHandle {
    fn abort(&self) {
        if let Some(join) = &self.join {
            join.abort();
        }
    }
}

fn drop_impl(handle: &mut StreamHandle) {
    if let Some(tx) = handle.stop_tx.take() {
        let _ = tx.send(());
    }
    if let Some(join) = handle.join.take() {
        if !join.is_finished() {
            tracing::warn!("StreamHandle dropped without stop_and_wait; aborting live task");
        }
        join.abort();
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        drop_impl(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn stop_and_wait_returns_after_task_exits() {
        let ran_cleanup = Arc::new(AtomicBool::new(false));
        let ran_cleanup_task = ran_cleanup.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let join = tokio::spawn(async move {
            let _ = (&mut stop_rx).await;
            ran_cleanup_task.store(true, Ordering::SeqCst);
        });
        let handle = StreamHandle::new(stop_tx, join);
        handle.stop_and_wait().await;
        assert!(ran_cleanup.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn drop_without_stop_aborts_task() {
        let (stop_tx, _stop_rx) = oneshot::channel();
        let join = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let abort_handle = join.abort_handle();
        let handle = StreamHandle::new(stop_tx, join);
        drop(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(abort_handle.is_finished());
    }
}
