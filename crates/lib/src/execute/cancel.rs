//! Shared cancellation for a run.

use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable cancel flag. Once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
  tx: Arc<watch::Sender<bool>>,
  rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
  fn default() -> Self {
    Self::new()
  }
}

impl CancelToken {
  pub fn new() -> Self {
    let (tx, rx) = watch::channel(false);
    Self { tx: Arc::new(tx), rx }
  }

  pub fn cancel(&self) {
    self.tx.send_replace(true);
  }

  pub fn is_cancelled(&self) -> bool {
    *self.rx.borrow()
  }

  /// Resolves once the token is cancelled.
  pub async fn cancelled(&self) {
    let mut rx = self.rx.clone();
    // the sender lives as long as any token clone, so this only ends on cancel
    let _ = rx.wait_for(|cancelled| *cancelled).await;
  }
}
