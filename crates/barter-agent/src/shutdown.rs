//! Cooperative shutdown.
//!
//! The round loop checks [`ShutdownSignal::is_requested`] between stages and
//! waits only through [`ShutdownSignal::pause`], so a request takes effect
//! at the next pause or stage boundary without interrupting an in-flight
//! transfer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    requested: AtomicBool,
    notify: Notify,
}

/// Cloneable handle shared by the binary's Ctrl-C handler and the agent.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    /// A signal that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the agent to stop. Wakes any pending [`pause`](Self::pause).
    pub fn request(&self) {
        self.inner.requested.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Whether a stop has been requested.
    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    /// Sleep for `duration` unless a stop is requested first.
    ///
    /// Returns `true` if the full pause elapsed, `false` if it was cut short.
    pub async fn pause(&self, duration: Duration) -> bool {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent request is not lost.
        notified.as_mut().enable();
        if self.is_requested() {
            return false;
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => true,
            () = &mut notified => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn pause_runs_to_completion() {
        let signal = ShutdownSignal::new();
        let start = tokio::time::Instant::now();
        assert!(signal.pause(Duration::from_secs(30)).await);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn request_cuts_pause_short() {
        let signal = ShutdownSignal::new();
        let remote = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            remote.request();
        });
        let start = tokio::time::Instant::now();
        assert!(!signal.pause(Duration::from_secs(30)).await);
        assert!(start.elapsed() < Duration::from_secs(30));
        assert!(signal.is_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn pause_after_request_returns_at_once() {
        let signal = ShutdownSignal::new();
        signal.request();
        let start = tokio::time::Instant::now();
        assert!(!signal.pause(Duration::from_secs(30)).await);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
