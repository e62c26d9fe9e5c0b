use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Host facility for work that must outlive the request that started it.
///
/// Futures are spawned onto the runtime immediately; the handles are kept so
/// shutdown can wait for in-flight runners instead of dropping them.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        if let Ok(mut handles) = self.handles.lock() {
            handles.retain(|h| !h.is_finished());
            handles.push(handle);
        }
    }

    /// Tasks not yet finished.
    pub fn pending(&self) -> usize {
        self.handles
            .lock()
            .map(|h| h.iter().filter(|h| !h.is_finished()).count())
            .unwrap_or(0)
    }

    /// Wait for every tracked task, including ones spawned while waiting.
    pub async fn drain(&self) {
        loop {
            let batch: Vec<JoinHandle<()>> = match self.handles.lock() {
                Ok(mut h) => std::mem::take(&mut *h),
                Err(_) => return,
            };
            if batch.is_empty() {
                return;
            }
            for handle in batch {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "background task ended abnormally");
                }
            }
        }
    }

    /// [`drain`](Self::drain) bounded by `limit`. Returns `false` on timeout.
    pub async fn drain_for(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.drain()).await.is_ok()
    }
}
