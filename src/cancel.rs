use std::sync::Arc;
use tokio::sync::watch;

/// A flag that is set at most once and can be awaited by any number of tasks.
///
/// Clones share the same flag. Setting it wakes every task parked in
/// [`Cancellation::cancelled`], including ones that start waiting afterwards.
#[derive(Clone, Debug)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Sets the flag. Returns `true` only for the call that actually set it.
    pub fn cancel(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the flag is set.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns once set.
        let _ = rx.wait_for(|set| *set).await;
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}
