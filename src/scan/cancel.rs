//! Cooperative cancellation for scans.
//!
//! A cloneable token backed by a watch channel. Children created with
//! `child()` observe the parent's cancellation but can also be cancelled on
//! their own without affecting the parent.

use std::sync::Arc;

use tokio::sync::watch;

/// Hierarchical cancellation token.
#[derive(Debug, Clone)]
pub struct CancelToken {
    parent: Option<Arc<CancelToken>>,
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            parent: None,
            tx: Arc::new(tx),
            rx,
        }
    }

    /// A child token: cancelled when either it or any ancestor is cancelled.
    pub fn child(&self) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            parent: Some(Arc::new(self.clone())),
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Signal cancellation to this token and all its children.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
            || self
                .parent
                .as_ref()
                .map(|p| p.is_cancelled())
                .unwrap_or(false)
    }

    /// Suspend until cancelled.
    pub async fn cancelled(&self) {
        let mut own = self.rx.clone();
        match &self.parent {
            Some(parent) => {
                let parent = Arc::clone(parent);
                tokio::select! {
                    _ = wait(&mut own) => {}
                    _ = Box::pin(parent.cancelled()) => {}
                }
            }
            None => wait(&mut own).await,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            // Sender dropped without cancelling; never resolves.
            std::future::pending::<()>().await;
        }
    }
}
