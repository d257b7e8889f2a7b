use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Default timeout for waiting for a component to shut down gracefully.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A signal indicating that a component should shut down.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {}

/// Controller that can broadcast shutdown signals to multiple receivers.
pub struct ShutdownController {
    sender: broadcast::Sender<ShutdownSignal>,
}

impl ShutdownController {
    /// Create a new ShutdownController and a ShutdownReceiver.
    pub fn new() -> (Self, ShutdownReceiver) {
        let (sender, receiver) = broadcast::channel(8);
        (Self { sender }, ShutdownReceiver { receiver })
    }

    /// Get a new receiver for this controller.
    pub fn subscribe(&self) -> ShutdownReceiver {
        ShutdownReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Signal all receivers to shut down.
    pub fn signal_shutdown(&self) {
        debug!(
            "broadcasting shutdown signal to {} receivers",
            self.sender.receiver_count()
        );
        let _ = self.sender.send(ShutdownSignal {});
    }
}

impl Clone for ShutdownController {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Receiver that can wait for shutdown signals.
pub struct ShutdownReceiver {
    receiver: broadcast::Receiver<ShutdownSignal>,
}

impl ShutdownReceiver {
    /// Wait for a shutdown signal to be received.
    pub async fn wait_for_shutdown(&mut self) -> ShutdownSignal {
        match self.receiver.recv().await {
            Ok(signal) => signal,
            Err(err) => {
                debug!("shutdown channel error: {err}, using default signal");
                ShutdownSignal {}
            }
        }
    }
}
