use crate::database::KvStore;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("client pool exhausted, all {capacity} handles checked out")]
    Exhausted { capacity: usize },
}

/// Hands out a bounded number of handles to the shared store. A worker that
/// cannot check one out has nothing to run against and must bail.
pub struct ClientPool {
    store: Arc<dyn KvStore>,
    capacity: usize,
    available: AtomicUsize,
}

impl ClientPool {
    pub fn new(store: Arc<dyn KvStore>, capacity: usize) -> Self {
        ClientPool {
            store,
            capacity,
            available: AtomicUsize::new(capacity),
        }
    }

    pub fn checkout(pool: &Arc<ClientPool>) -> Result<ClientGuard, PoolError> {
        pool.available
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .map_err(|_| PoolError::Exhausted {
                capacity: pool.capacity,
            })?;
        Ok(ClientGuard {
            store: Arc::clone(&pool.store),
            pool: Arc::clone(pool),
        })
    }
}

/// Checked-out handle; returns its slot to the pool on drop.
pub struct ClientGuard {
    store: Arc<dyn KvStore>,
    pool: Arc<ClientPool>,
}

impl std::fmt::Debug for ClientGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientGuard").finish_non_exhaustive()
    }
}

impl Deref for ClientGuard {
    type Target = dyn KvStore;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref()
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.pool.available.fetch_add(1, Ordering::Release);
    }
}
