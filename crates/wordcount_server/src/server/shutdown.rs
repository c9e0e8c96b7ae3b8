//! Shutdown coordination for graceful server shutdown.
//!
//! The application and the server share one [`ShutdownState`]. Initiating
//! shutdown stops the accept loop; the server marks shutdown complete once
//! every session has confirmed its exit and the Directory has stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Shared shutdown state for coordinating graceful shutdown across components.
#[derive(Debug, Clone)]
pub struct ShutdownState {
    /// Set once shutdown begins; no new connections are accepted
    shutdown_initiated: Arc<AtomicBool>,
    /// Set once every session has exited and the Directory has stopped
    shutdown_complete: Arc<AtomicBool>,
    notifier: broadcast::Sender<()>,
}

impl ShutdownState {
    /// Creates a new shutdown state with both flags set to false.
    pub fn new() -> Self {
        let (notifier, _) = broadcast::channel(1);
        Self {
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            shutdown_complete: Arc::new(AtomicBool::new(false)),
            notifier,
        }
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.shutdown_complete.load(Ordering::Acquire)
    }

    /// Initiates shutdown and wakes every subscriber. Repeated calls are
    /// no-ops.
    pub fn initiate_shutdown(&self) {
        if self.shutdown_initiated.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.notifier.send(());
        info!("🛑 Shutdown initiated - no new connections will be accepted");
    }

    /// Marks shutdown as complete.
    pub fn complete_shutdown(&self) {
        self.shutdown_complete.store(true, Ordering::Release);
        info!("✅ All sessions terminated - ready for final cleanup");
    }

    /// Receiver woken by [`initiate_shutdown`](Self::initiate_shutdown).
    ///
    /// Check [`is_shutdown_initiated`](Self::is_shutdown_initiated) after
    /// subscribing; a shutdown initiated earlier is not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notifier.subscribe()
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initiating_wakes_subscribers_once() {
        let state = ShutdownState::new();
        let mut waiter = state.subscribe();
        assert!(!state.is_shutdown_initiated());

        state.initiate_shutdown();
        state.initiate_shutdown();
        assert!(state.is_shutdown_initiated());
        assert!(waiter.recv().await.is_ok());
        assert!(waiter.try_recv().is_err());

        assert!(!state.is_shutdown_complete());
        state.clone().complete_shutdown();
        assert!(state.is_shutdown_complete());
    }
}
