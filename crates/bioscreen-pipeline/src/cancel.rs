//! Cooperative cancellation for a pipeline run.

use std::sync::Arc;

use bioscreen_common::PipelineError;
use tokio::sync::watch;

/// Cloneable cancel flag. Stages poll [`check`](Self::check) between steps
/// and race long waits against [`cancelled`](Self::cancelled).
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as self, so wait_for only fails if it is dropped.
        let _ = rx.wait_for(|flag| *flag).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
