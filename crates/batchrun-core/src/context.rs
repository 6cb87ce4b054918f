//! Per-invocation processing context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation signal passed through the engine to executors.
///
/// Clones share the same flag: the driver keeps one copy and requests
/// cancellation on it while the engine and executor read another.
#[derive(Debug, Clone, Default)]
pub struct ProcessingContext {
    cancelled: Arc<AtomicBool>,
}

impl ProcessingContext {
    /// Create a context with no cancellation requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that is already cancelled.
    pub fn cancelled() -> Self {
        let ctx = Self::new();
        ctx.cancel();
        ctx
    }

    /// Request cancellation. Takes effect at the next `process` call boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_is_not_cancelled() {
        assert!(!ProcessingContext::new().is_cancelled());
        assert!(!ProcessingContext::default().is_cancelled());
    }

    #[test]
    fn test_cancelled_constructor() {
        assert!(ProcessingContext::cancelled().is_cancelled());
    }

    #[test]
    fn test_clones_share_flag() {
        let driver = ProcessingContext::new();
        let engine = driver.clone();
        assert!(!engine.is_cancelled());

        driver.cancel();
        assert!(engine.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_visible_across_tasks() {
        let ctx = ProcessingContext::new();
        let remote = ctx.clone();
        tokio::spawn(async move { remote.cancel() }).await.unwrap();
        assert!(ctx.is_cancelled());
    }
}
