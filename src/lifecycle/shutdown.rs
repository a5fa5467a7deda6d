//! Shutdown coordination for the relay.

use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
///
/// Wraps a cancellation token that every long-running task either holds
/// directly or through a child token.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled together with this coordinator.
    pub fn subscribe(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown is triggered.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_cancels_subscribers() {
        let shutdown = Shutdown::new();
        let child = shutdown.subscribe();
        assert!(!child.is_cancelled());

        shutdown.trigger();
        child.cancelled().await;
        assert!(shutdown.is_triggered());
    }
}
