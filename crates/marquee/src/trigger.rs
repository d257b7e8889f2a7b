//! Coalescing trigger: a debounce primitive for bursty async work.
//!
//! Calling [`CoalescingTrigger::trigger`] is always non-blocking. The first
//! call of a burst arms a delay timer with that call's arguments; calls
//! arriving while the timer is armed are dropped. When the timer fires the
//! action runs; calls arriving *during* execution are remembered (last call
//! wins, a single slot) and replayed through the trigger once execution
//! finishes. This guarantees at most one in-flight execution at any time
//! while still eventually applying the latest arguments.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type BoxedAction<T> =
    Box<dyn Fn(T) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>> + Send + Sync>;
type ErrorSink = Box<dyn Fn(anyhow::Error) + Send + Sync>;

struct TriggerState<T> {
    timer_armed: bool,
    running: bool,
    rerun_with: Option<T>,
}

struct Inner<T> {
    delay: Duration,
    action: BoxedAction<T>,
    on_error: ErrorSink,
    state: Mutex<TriggerState<T>>,
}

pub struct CoalescingTrigger<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for CoalescingTrigger<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> CoalescingTrigger<T> {
    /// Wraps `action` so that bursts of [`trigger`](Self::trigger) calls
    /// collapse into a bounded number of executions, `delay` apart.
    /// Errors from `action` are routed to `on_error` and never propagate.
    pub fn new<A, F, E>(delay: Duration, action: A, on_error: E) -> Self
    where
        A: Fn(T) -> F + Send + Sync + 'static,
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
        E: Fn(anyhow::Error) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                delay,
                action: Box::new(move |args| Box::pin(action(args))),
                on_error: Box::new(on_error),
                state: Mutex::new(TriggerState {
                    timer_armed: false,
                    running: false,
                    rerun_with: None,
                }),
            }),
        }
    }

    /// Requests an execution with `args`. Never blocks and never fails.
    pub fn trigger(&self, args: T) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.running {
                // Remember only the latest call made during execution.
                state.rerun_with = Some(args);
                return;
            }
            if state.timer_armed {
                // A call is already scheduled; this one's args are dropped.
                return;
            }
            state.timer_armed = true;
        }

        let trigger = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(trigger.inner.delay).await;

            {
                let mut state = trigger.inner.state.lock().unwrap();
                state.timer_armed = false;
                state.running = true;
            }

            if let Err(err) = (trigger.inner.action)(args).await {
                (trigger.inner.on_error)(err);
            }

            let rerun = {
                let mut state = trigger.inner.state.lock().unwrap();
                state.running = false;
                state.rerun_with.take()
            };
            if let Some(args) = rerun {
                trigger.trigger(args);
            }
        });
    }
}
