//! Debouncing of bursty triggers.
//!
//! Each call to [`Debouncer::debounce`] cancels the action scheduled by the
//! previous call and schedules its own after the quiet interval. Only the last
//! action submitted inside the window runs.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::observability::{LogEntry, SharedLog, WarningLevel};

const SENDER: &str = "Debouncer";

/// Collapses rapid successive triggers into one delayed action.
pub struct Debouncer {
    delay: Duration,
    log: SharedLog,
    parent: CancellationToken,
    pending: Mutex<Option<CancellationToken>>,
}

impl Debouncer {
    pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

    /// Create a debouncer. `None` uses [`Self::DEFAULT_DELAY`].
    pub fn new(delay: Option<Duration>, log: SharedLog) -> Self {
        Self {
            delay: delay.unwrap_or(Self::DEFAULT_DELAY),
            log,
            parent: CancellationToken::new(),
            pending: Mutex::new(None),
        }
    }

    /// Tie every scheduled action to an external cancellation signal.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.parent = token;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `action` after the quiet interval, cancelling the pending one.
    ///
    /// The returned task resolves to `true` if the action ran and `false` if it
    /// was superseded or cancelled.
    pub fn debounce<F>(&self, action: F) -> JoinHandle<bool>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.parent.child_token();
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let delay = self.delay;
        let log = self.log.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    log.write(LogEntry::warning(
                        WarningLevel::Low,
                        SENDER,
                        "Pending action was cancelled before the quiet interval elapsed.",
                    ));
                    false
                }
                _ = tokio::time::sleep(delay) => {
                    action.await;
                    true
                }
            }
        })
    }

    /// Cancel the pending action without running it.
    pub fn cancel(&self) {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(token) = pending {
            token.cancel();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemoryLog;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn recorder(
        fired: &Arc<Mutex<Vec<(u32, Duration)>>>,
        start: Instant,
        id: u32,
    ) -> impl Future<Output = ()> + Send + 'static {
        let fired = fired.clone();
        async move {
            fired.lock().unwrap().push((id, start.elapsed()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_last_action_runs() {
        let log = MemoryLog::new();
        let debouncer = Debouncer::new(None, log.clone());
        let fired = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();

        let h1 = debouncer.debounce(recorder(&fired, start, 1));
        tokio::time::sleep(Duration::from_millis(300)).await;
        let h2 = debouncer.debounce(recorder(&fired, start, 2));
        tokio::time::sleep(Duration::from_millis(300)).await;
        let h3 = debouncer.debounce(recorder(&fired, start, 3));

        assert!(!h1.await.unwrap());
        assert!(!h2.await.unwrap());
        assert!(h3.await.unwrap());

        let fired = fired.lock().unwrap().clone();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, 3);
        assert!(fired[0].1 >= Duration::from_millis(1600));
        assert!(fired[0].1 < Duration::from_millis(1700));

        // Superseded delays are routine, not errors.
        assert_eq!(log.warnings().len(), 2);
        assert!(log.errors().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_action() {
        let debouncer = Debouncer::new(Some(Duration::from_millis(200)), MemoryLog::new());
        let fired = Arc::new(Mutex::new(Vec::new()));

        let handle = debouncer.debounce(recorder(&fired, Instant::now(), 1));
        debouncer.cancel();

        assert!(!handle.await.unwrap());
        assert!(fired.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_cancellation() {
        let token = CancellationToken::new();
        let debouncer =
            Debouncer::new(None, MemoryLog::new()).with_cancellation(token.clone());

        let handle = debouncer.debounce(async {});
        token.cancel();
        assert!(!handle.await.unwrap());
    }
}
