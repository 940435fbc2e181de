//! Shutdown coordination for the proxy.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use mio::Waker;

/// Cancellation token shared by the supervisor and every worker.
///
/// Workers check the flag once per loop iteration; triggering also wakes
/// each registered loop so none waits out its poll timeout.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    triggered: AtomicBool,
    wakers: Mutex<Vec<Waker>>,
}

impl ShutdownToken {
    /// Create a new, untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker's waker. Wakes it immediately if shutdown has
    /// already been triggered.
    pub fn register_waker(&self, waker: Waker) {
        let mut wakers = self.inner.wakers.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_triggered() {
            let _ = waker.wake();
        }
        wakers.push(waker);
    }

    /// Trigger the shutdown signal. Repeated calls are no-ops.
    pub fn trigger(&self) {
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            return;
        }
        let wakers = self.inner.wakers.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::info!(workers = wakers.len(), "Shutdown triggered");
        for waker in wakers.iter() {
            if let Err(e) = waker.wake() {
                tracing::warn!(error = %e, "Failed to wake worker");
            }
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Number of registered workers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.wakers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
