//! Per-actor FIFO operation queue.
//!
//! An [`OpQueue`] serializes async operations: entries run strictly in
//! arrival order, at most one at a time, and a failing entry does not block
//! the entries behind it. Operations enqueued with
//! [`enqueue_superseding`](OpQueue::enqueue_superseding) first reject every
//! not-yet-started entry with [`DisplayError::Aborted`]; a running entry is
//! never touched and always runs to completion.
//!
//! This exists so a single display actor can expose several public async
//! operations (load content, reload, stop, close) that never interleave
//! against the underlying surface, which is not safe to drive concurrently.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use crate::errors::DisplayError;

type BoxedOp = Pin<Box<dyn Future<Output = Result<(), DisplayError>> + Send>>;

struct Entry {
    op: BoxedOp,
    done_tx: oneshot::Sender<Result<(), DisplayError>>,
}

struct QueueInner {
    waiting: VecDeque<Entry>,
    running: bool,
}

#[derive(Clone)]
pub struct OpQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl OpQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                waiting: VecDeque::new(),
                running: false,
            })),
        }
    }

    /// Appends an operation. The returned future resolves with the
    /// operation's outcome; dropping it does not cancel the operation.
    pub fn enqueue<F>(&self, op: F) -> impl Future<Output = Result<(), DisplayError>>
    where
        F: Future<Output = Result<(), DisplayError>> + Send + 'static,
    {
        self.push(None, Box::pin(op))
    }

    /// Rejects every waiting entry with `Aborted(reason)`, then appends the
    /// operation. The currently running entry (if any) is unaffected.
    pub fn enqueue_superseding<F>(
        &self,
        reason: &str,
        op: F,
    ) -> impl Future<Output = Result<(), DisplayError>>
    where
        F: Future<Output = Result<(), DisplayError>> + Send + 'static,
    {
        self.push(Some(reason), Box::pin(op))
    }

    fn push(
        &self,
        supersede_reason: Option<&str>,
        op: BoxedOp,
    ) -> impl Future<Output = Result<(), DisplayError>> {
        let (done_tx, done_rx) = oneshot::channel();
        {
            let mut queue = self.inner.lock().unwrap();
            if let Some(reason) = supersede_reason {
                for entry in queue.waiting.drain(..) {
                    let _ = entry
                        .done_tx
                        .send(Err(DisplayError::Aborted(reason.to_string())));
                }
            }
            queue.waiting.push_back(Entry { op, done_tx });
        }
        Self::pump(self.inner.clone());

        async move {
            match done_rx.await {
                Ok(result) => result,
                Err(_) => Err(DisplayError::ChannelClosed),
            }
        }
    }

    /// Starts the head entry unless one is already running.
    fn pump(inner: Arc<Mutex<QueueInner>>) {
        let entry = {
            let mut queue = inner.lock().unwrap();
            if queue.running {
                return;
            }
            match queue.waiting.pop_front() {
                Some(entry) => {
                    queue.running = true;
                    entry
                }
                None => return,
            }
        };

        tokio::spawn(async move {
            let result = entry.op.await;
            let _ = entry.done_tx.send(result);
            inner.lock().unwrap().running = false;
            Self::pump(inner);
        });
    }
}

impl Default for OpQueue {
    fn default() -> Self {
        Self::new()
    }
}
