// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Asynchronous result dispatch backed by Tokio.
//!
//! # Design
//!
//! [`DispatchQueue`] owns a bounded [`tokio::sync::mpsc`] channel and a fixed
//! number of worker tasks.  The workers share the single receiver behind a
//! [`tokio::sync::Mutex`], so messages leave the queue in the order they were
//! submitted, and at most `workers` action bodies run at once.
//!
//! Action bodies are synchronous closures.  Each one runs on Tokio's blocking
//! pool, so a slow or panicking body cannot stall or kill its worker.
//!
//! Backpressure: [`DispatchQueue::submit`] waits up to the configured enqueue
//! timeout for room in a full queue, then fails with
//! [`DispatchError::QueueFull`].  Delivery is at-most-once; nothing is
//! retried.

use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::action::Action;
use crate::config::EngineConfig;
use crate::error::{ActionError, DispatchError};
use crate::types::Outcome;

/// Actions visible to the dispatch workers, keyed by name.
pub type ActionTable = HashMap<String, Action>;

// ---------------------------------------------------------------------------
// Messages and reports
// ---------------------------------------------------------------------------

/// A unit of work for the dispatch workers.
#[derive(Debug, Clone, PartialEq)]
pub enum QueuedMessage {
    /// A native outcome.
    Outcome(Outcome),
    /// The JSON encoding of an outcome, as produced by [`Outcome::to_bytes`].
    Encoded(Vec<u8>),
}

impl QueuedMessage {
    pub fn decode(self) -> Result<Outcome, DispatchError> {
        match self {
            QueuedMessage::Outcome(outcome) => Ok(outcome),
            QueuedMessage::Encoded(bytes) => Outcome::from_bytes(&bytes),
        }
    }
}

impl From<Outcome> for QueuedMessage {
    fn from(outcome: Outcome) -> Self {
        QueuedMessage::Outcome(outcome)
    }
}

/// What the router did with one outcome slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The action ran inline; `result` is what its body returned.
    Executed {
        action: String,
        result: Result<bool, ActionError>,
    },
    /// The outcome was accepted by the dispatch queue.
    Queued { action: String },
    /// The queue refused the outcome.  It will not be delivered.
    Dropped { action: String, error: DispatchError },
    /// The slot held no outcome.
    Skipped,
}

impl Dispatch {
    /// Name of the routed action, if any.
    pub fn action(&self) -> Option<&str> {
        match self {
            Dispatch::Executed { action, .. }
            | Dispatch::Queued { action }
            | Dispatch::Dropped { action, .. } => Some(action),
            Dispatch::Skipped => None,
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchQueue
// ---------------------------------------------------------------------------

/// Bounded worker pool that runs asynchronous actions.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use sigact_core::action::Action;
/// use sigact_core::config::EngineConfig;
/// use sigact_core::dispatch::{ActionTable, DispatchQueue};
/// use sigact_core::types::Outcome;
///
/// #[tokio::main]
/// async fn main() {
///     let mut actions = ActionTable::new();
///     actions.insert("log".into(), Action::new("log", false, |_| Ok(true)));
///
///     let queue = DispatchQueue::start(&EngineConfig::default(), Arc::new(actions)).unwrap();
///     queue.submit(Outcome::fallback("log")).await.unwrap();
///     queue.shutdown().await;
/// }
/// ```
#[derive(Debug)]
pub struct DispatchQueue {
    sender: mpsc::Sender<QueuedMessage>,
    workers: Vec<JoinHandle<()>>,
    enqueue_timeout: Duration,
}

impl DispatchQueue {
    /// Spawn the workers on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NoRuntime`] when called outside a Tokio runtime.
    pub fn start(config: &EngineConfig, actions: Arc<ActionTable>) -> Result<Self, DispatchError> {
        let handle = Handle::try_current().map_err(|_| DispatchError::NoRuntime)?;

        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..config.workers.max(1))
            .map(|id| handle.spawn(worker(id, Arc::clone(&receiver), Arc::clone(&actions))))
            .collect::<Vec<_>>();

        debug!(
            workers = workers.len(),
            capacity = config.queue_capacity,
            "dispatch queue started"
        );

        Ok(Self {
            sender,
            workers,
            enqueue_timeout: config.enqueue_timeout(),
        })
    }

    /// Enqueue a message, waiting up to the enqueue timeout for room.
    pub async fn submit(&self, message: impl Into<QueuedMessage>) -> Result<(), DispatchError> {
        self.sender
            .send_timeout(message.into(), self.enqueue_timeout)
            .await
            .map_err(|error| match error {
                SendTimeoutError::Timeout(_) => DispatchError::QueueFull {
                    timeout_ms: u64::try_from(self.enqueue_timeout.as_millis()).unwrap_or(u64::MAX),
                },
                SendTimeoutError::Closed(_) => DispatchError::ShutDown,
            })
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// How long [`submit`](Self::submit) waits for room in a full queue.
    pub fn enqueue_timeout(&self) -> Duration {
        self.enqueue_timeout
    }

    /// Free slots in the queue right now.
    pub fn available(&self) -> usize {
        self.sender.capacity()
    }

    /// Close the queue, let the workers drain every accepted message and
    /// wait for them to exit.
    pub async fn shutdown(self) {
        let Self {
            sender, workers, ..
        } = self;
        drop(sender);
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "dispatch worker terminated abnormally");
            }
        }
        debug!("dispatch queue drained");
    }

    /// Like [`shutdown`](Self::shutdown), but abort workers still running
    /// after `grace`.  Returns `true` if the queue drained in time.
    pub async fn shutdown_timeout(self, grace: Duration) -> bool {
        let Self {
            sender,
            mut workers,
            ..
        } = self;
        drop(sender);

        let drained = tokio::time::timeout(grace, async {
            for handle in workers.iter_mut() {
                if let Err(e) = handle.await {
                    error!(error = %e, "dispatch worker terminated abnormally");
                }
            }
        })
        .await
        .is_ok();

        if !drained {
            for handle in &workers {
                handle.abort();
            }
            warn!(?grace, "dispatch queue aborted before draining");
        }
        drained
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

async fn worker(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<QueuedMessage>>>,
    actions: Arc<ActionTable>,
) {
    loop {
        let message = receiver.lock().await.recv().await;
        let Some(message) = message else { break };
        handle(id, message, &actions).await;
    }
    debug!(worker = id, "dispatch worker stopped");
}

async fn handle(id: usize, message: QueuedMessage, actions: &ActionTable) {
    let outcome = match message.decode() {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(worker = id, error = %e, "dropping undecodable message");
            return;
        }
    };

    let Some(action) = actions.get(&outcome.matched_policy).cloned() else {
        let e = ActionError::NotRegistered(outcome.matched_policy);
        warn!(worker = id, error = %e, "dropping outcome");
        return;
    };

    let name = action.name.clone();
    let verdict = outcome.verdict;
    match tokio::task::spawn_blocking(move || action.run(&outcome)).await {
        Ok(Ok(result)) => info!(worker = id, action = %name, verdict, result, "async action completed"),
        Ok(Err(e)) => warn!(worker = id, action = %name, verdict, error = %e, "async action failed"),
        Err(e) => error!(worker = id, action = %name, error = %e, "async action panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(workers: usize, queue_capacity: usize, enqueue_timeout_ms: u64) -> EngineConfig {
        EngineConfig {
            workers,
            queue_capacity,
            enqueue_timeout_ms,
            ..EngineConfig::default()
        }
    }

    fn counting(name: &str, counter: &Arc<AtomicUsize>) -> Action {
        let counter = Arc::clone(counter);
        Action::new(name, false, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        })
    }

    fn table(actions: Vec<Action>) -> Arc<ActionTable> {
        Arc::new(
            actions
                .into_iter()
                .map(|action| (action.name.clone(), action))
                .collect(),
        )
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let error = DispatchQueue::start(&EngineConfig::default(), table(vec![]))
            .expect_err("no runtime");
        assert_eq!(error, DispatchError::NoRuntime);
    }

    #[test]
    fn test_decode_encoded_message() {
        let outcome = Outcome::fallback("log");
        let message = QueuedMessage::Encoded(outcome.to_bytes());
        assert_eq!(message.decode(), Ok(outcome));
        assert!(matches!(
            QueuedMessage::Encoded(b"{".to_vec()).decode(),
            Err(DispatchError::Decode(_))
        ));
    }

    #[test]
    fn test_dispatch_action_name() {
        assert_eq!(Dispatch::Queued { action: "log".into() }.action(), Some("log"));
        assert_eq!(Dispatch::Skipped.action(), None);
    }

    #[tokio::test]
    async fn test_workers_run_native_and_encoded_messages() {
        let counter = Arc::new(AtomicUsize::new(0));
        let queue = DispatchQueue::start(&config(2, 8, 250), table(vec![counting("log", &counter)]))
            .expect("runtime present");
        assert_eq!(queue.workers(), 2);

        queue.submit(Outcome::fallback("log")).await.expect("accepted");
        queue
            .submit(QueuedMessage::Encoded(Outcome::fallback("log").to_bytes()))
            .await
            .expect("accepted");
        queue
            .submit(QueuedMessage::Encoded(b"garbage".to_vec()))
            .await
            .expect("accepted, then dropped by the worker");
        queue.submit(Outcome::fallback("missing")).await.expect("accepted");

        queue.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_worker_runs_in_submission_order() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recording = |name: &str| {
            let seen = Arc::clone(&seen);
            Action::new(name, false, move |outcome| {
                seen.lock()
                    .expect("order lock")
                    .push(outcome.matched_policy.clone());
                Ok(true)
            })
        };
        let actions = table(vec![recording("first"), recording("second"), recording("third")]);
        let queue = DispatchQueue::start(&config(1, 16, 250), actions).expect("runtime present");

        let order = ["second", "first", "third", "first", "third", "second"];
        for name in order {
            queue.submit(Outcome::fallback(name)).await.expect("accepted");
        }

        queue.shutdown().await;
        assert_eq!(*seen.lock().expect("order lock"), order);
    }

    #[tokio::test]
    async fn test_failing_and_panicking_bodies_do_not_kill_workers() {
        let counter = Arc::new(AtomicUsize::new(0));
        let actions = table(vec![
            Action::new("fail", false, |_| Err(ActionError::Failed("boom".into()))),
            Action::new("panic", false, |_| panic!("body panicked")),
            counting("log", &counter),
        ]);
        let queue = DispatchQueue::start(&config(1, 8, 250), actions).expect("runtime present");

        queue.submit(Outcome::fallback("fail")).await.expect("accepted");
        queue.submit(Outcome::fallback("panic")).await.expect("accepted");
        queue.submit(Outcome::fallback("log")).await.expect("accepted");

        queue.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_after_timeout() {
        let (started_tx, mut started_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Arc::new(std::sync::Mutex::new(release_rx));
        let counter = Arc::new(AtomicUsize::new(0));

        let blocking = {
            let counter = Arc::clone(&counter);
            Action::new("slow", false, move |_| {
                let _ = started_tx.send(());
                if let Ok(rx) = release_rx.lock() {
                    let _ = rx.recv();
                }
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            })
        };
        let queue = DispatchQueue::start(&config(1, 1, 20), table(vec![blocking]))
            .expect("runtime present");

        // First message occupies the only worker, second fills the buffer.
        queue.submit(Outcome::fallback("slow")).await.expect("accepted");
        started_rx.recv().await.expect("worker started");
        queue.submit(Outcome::fallback("slow")).await.expect("buffered");
        assert_eq!(queue.available(), 0);

        let error = queue
            .submit(Outcome::fallback("slow"))
            .await
            .expect_err("queue is full");
        assert_eq!(error, DispatchError::QueueFull { timeout_ms: 20 });
        assert_eq!(queue.enqueue_timeout(), Duration::from_millis(20));

        release_tx.send(()).expect("release first");
        release_tx.send(()).expect("release second");
        queue.shutdown().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_timeout_aborts_stuck_workers() {
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Arc::new(std::sync::Mutex::new(release_rx));
        let stuck = Action::new("stuck", false, move |_| {
            if let Ok(rx) = release_rx.lock() {
                let _ = rx.recv();
            }
            Ok(true)
        });
        let queue = DispatchQueue::start(&config(1, 4, 250), table(vec![stuck]))
            .expect("runtime present");
        queue.submit(Outcome::fallback("stuck")).await.expect("accepted");

        let drained = queue.shutdown_timeout(Duration::from_millis(50)).await;
        assert!(!drained);
        // Unblock the orphaned blocking task so the runtime can exit.
        let _ = release_tx.send(());
    }

    #[tokio::test]
    async fn test_shutdown_timeout_on_idle_queue_drains() {
        let queue = DispatchQueue::start(&config(2, 4, 250), table(vec![])).expect("runtime present");
        assert!(queue.shutdown_timeout(Duration::from_secs(1)).await);
    }
}
