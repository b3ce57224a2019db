//! Signal handling for the daemon.
//!
//! SIGTERM and SIGINT (Ctrl+C elsewhere) request a graceful shutdown. The
//! request is broadcast through a watch channel so that both the async link
//! task and the blocking mixing loop can observe it.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Signal handler that turns process signals into a shutdown flag.
pub struct SignalHandler {
    /// Channel to signal shutdown.
    shutdown_tx: Arc<watch::Sender<bool>>,
    /// Channel to receive shutdown signal.
    shutdown_rx: watch::Receiver<bool>,
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalHandler {
    /// Creates a new signal handler.
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Spawns the signal listener task.
    ///
    /// This should be called once at startup, from within a tokio runtime.
    #[cfg(unix)]
    pub fn spawn_listener(&self) {
        let shutdown_tx = self.shutdown_tx.clone();

        tokio::spawn(async move {
            use tokio::signal::unix::{SignalKind, signal};

            let (mut sigterm, mut sigint) = match (
                signal(SignalKind::terminate()),
                signal(SignalKind::interrupt()),
            ) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "Failed to install signal handlers, falling back to Ctrl+C");
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("Received Ctrl+C, initiating shutdown");
                        let _ = shutdown_tx.send(true);
                    }
                    return;
                }
            };

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating shutdown");
                }
            }
            let _ = shutdown_tx.send(true);

            debug!("Signal listener stopped");
        });
    }

    /// Non-Unix implementation: Ctrl+C only.
    #[cfg(not(unix))]
    pub fn spawn_listener(&self) {
        let shutdown_tx = self.shutdown_tx.clone();

        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received Ctrl+C, initiating shutdown");
                let _ = shutdown_tx.send(true);
            }
        });
    }

    /// Returns a future that completes when a shutdown signal is received.
    pub fn shutdown(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.shutdown_rx.clone(),
        }
    }

    /// Returns true if shutdown has been signaled.
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Programmatically triggers a shutdown.
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Creates a shutdown handle that can be passed to other components.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
            rx: self.shutdown_rx.clone(),
        }
    }
}

/// A signal that completes when shutdown is signaled.
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Waits for the shutdown signal.
    ///
    /// Also completes if every sender is gone, since nothing could trigger
    /// shutdown anymore.
    pub async fn wait(mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// A handle for triggering or checking shutdown status.
///
/// Checking is synchronous, so the blocking mixing loop can poll it.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    /// Creates a standalone handle, not tied to process signals.
    pub fn new() -> Self {
        SignalHandler::new().shutdown_handle()
    }

    /// Triggers a shutdown.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Returns true if shutdown has been triggered.
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Returns a future that completes when shutdown is triggered.
    pub fn wait(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
        }
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_handler_shutdown() {
        let handler = SignalHandler::new();

        assert!(!handler.is_shutdown());

        handler.trigger_shutdown();

        assert!(handler.is_shutdown());
    }

    #[tokio::test]
    async fn shutdown_signal_wait() {
        let handler = SignalHandler::new();
        let shutdown = handler.shutdown();

        let tx = handler.shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = tx.send(true);
        });

        let result = tokio::time::timeout(Duration::from_millis(100), shutdown.wait()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn shutdown_handle() {
        let handler = SignalHandler::new();
        let handle = handler.shutdown_handle();

        assert!(!handle.is_shutdown());

        handle.trigger();

        assert!(handle.is_shutdown());
        assert!(handler.is_shutdown());
    }

    #[tokio::test]
    async fn shutdown_handle_wait() {
        let handle = ShutdownHandle::new();

        let wait_handle = handle.clone();
        let wait_task = tokio::spawn(async move {
            wait_handle.wait().wait().await;
            true
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.trigger();

        let result = tokio::time::timeout(Duration::from_millis(100), wait_task).await;
        assert!(result.is_ok());
        assert!(result.unwrap().unwrap());
    }

    #[test]
    fn shutdown_visible_from_other_threads() {
        let handle = ShutdownHandle::new();
        let observer = handle.clone();

        let thread = std::thread::spawn(move || {
            while !observer.is_shutdown() {
                std::thread::yield_now();
            }
        });
        handle.trigger();
        thread.join().unwrap();
    }
}
