//! Graceful shutdown.
//!
//! [`Shutdown`] listens for SIGTERM and SIGINT (Ctrl+C on Windows) on a
//! background task and cancels a [`CancellationToken`] when one arrives. The
//! server stops accepting connections on cancellation, then
//! [`drain`](Shutdown::drain) waits for detached request work, such as a drip
//! between claiming an address and releasing a failed claim, to finish.

use std::time::Duration;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Upper bound on waiting for detached request tasks.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shutdown coordination for the server.
#[allow(missing_debug_implementations)] // TaskTracker doesn't impl Debug
pub struct Shutdown {
    signals: TaskTracker,
    requests: TaskTracker,
    token: CancellationToken,
}

impl Shutdown {
    /// Installs the signal handlers.
    ///
    /// # Errors
    ///
    /// Returns an [`std::io::Error`] if signal registration fails.
    #[allow(clippy::unnecessary_wraps)] // Result needed on Unix for signal registration
    pub fn listen() -> Result<Self, std::io::Error> {
        let shutdown = Self::manual();
        let inner = shutdown.token.clone();

        #[cfg(unix)]
        {
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            shutdown.signals.spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
                    _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down"),
                    () = inner.cancelled() => return,
                }
                inner.cancel();
            });
        }

        #[cfg(windows)]
        {
            shutdown.signals.spawn(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => tracing::info!("Received Ctrl-C, shutting down"),
                    () = inner.cancelled() => return,
                }
                inner.cancel();
            });
        }

        Ok(shutdown)
    }

    /// Coordination without OS signal handling; cancel through [`token`](Self::token).
    #[must_use]
    pub fn manual() -> Self {
        let signals = TaskTracker::new();
        // Spawning still works after close; wait() resolves once it is empty.
        signals.close();
        Self {
            signals,
            requests: TaskTracker::new(),
            token: CancellationToken::new(),
        }
    }

    /// Token cancelled when shutdown begins.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tracker for request work that must outlive its connection.
    #[must_use]
    pub fn requests(&self) -> TaskTracker {
        self.requests.clone()
    }

    /// Waits up to `limit` for tracked request tasks to finish.
    ///
    /// Returns `false` if tasks were still running when the limit elapsed.
    pub async fn drain(self, limit: Duration) -> bool {
        self.token.cancel();
        self.requests.close();
        self.signals.wait().await;
        let pending = self.requests.len();
        if pending > 0 {
            tracing::info!(pending, "Waiting for in-flight requests");
        }
        tokio::time::timeout(limit, self.requests.wait()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_drain_waits_for_tracked_tasks() {
        let shutdown = Shutdown::manual();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        shutdown.requests().spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::SeqCst);
        });
        assert!(shutdown.drain(Duration::from_secs(5)).await);
        assert!(done.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_drain_gives_up_after_limit() {
        let shutdown = Shutdown::manual();
        shutdown.requests().spawn(std::future::pending::<()>());
        assert!(!shutdown.drain(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_drain_without_requests_returns_promptly() {
        let shutdown = Shutdown::manual();
        let token = shutdown.token();
        let drained = tokio::time::timeout(Duration::from_secs(5), shutdown.drain(DRAIN_TIMEOUT))
            .await
            .unwrap();
        assert!(drained);
        assert!(token.is_cancelled());
    }
}
