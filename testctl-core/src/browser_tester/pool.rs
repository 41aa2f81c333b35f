use std::sync::Arc;

use tokio::sync::{Semaphore, TryAcquireError};

use super::error::BrowserError;

/// Bounds the number of concurrently open browser contexts at
/// `max_concurrent_contexts`. Acquisition fails fast with
/// [`BrowserError::LimitReached`] rather than queuing — callers (the
/// orchestrator) are expected to retry or back off.
pub struct ContextPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

pub struct ContextPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl ContextPool {
    pub fn new(max_concurrent_contexts: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent_contexts)),
            capacity: max_concurrent_contexts,
        }
    }

    pub fn try_acquire(&self) -> Result<ContextPermit, BrowserError> {
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(ContextPermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => Err(BrowserError::LimitReached(self.capacity)),
            Err(TryAcquireError::Closed) => Err(BrowserError::Configuration(
                "context pool semaphore closed".to_string(),
            )),
        }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausting_the_pool_fails_fast() {
        let pool = ContextPool::new(1);
        let first = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_err());
        drop(first);
        assert!(pool.try_acquire().is_ok());
    }

    #[test]
    fn available_reflects_outstanding_permits() {
        let pool = ContextPool::new(3);
        assert_eq!(pool.available(), 3);
        let _permit = pool.try_acquire().unwrap();
        assert_eq!(pool.available(), 2);
    }
}
