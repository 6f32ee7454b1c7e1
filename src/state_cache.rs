//! Bounded `state_root -> State` cache.
//!
//! The State Cache is the sole strong owner of regenerated states; every other index (the
//! Checkpoint State Cache excepted) holds only [`std::sync::Weak`] references so eviction here is
//! the only thing that can actually free a state.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::types::{EthSpec, Hash256};

pub struct StateCache<E, S> {
    inner: Mutex<LruCache<Hash256, Arc<S>>>,
    _marker: std::marker::PhantomData<E>,
}

impl<E: EthSpec, S> StateCache<E, S> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            _marker: std::marker::PhantomData,
        }
    }

    /// Synchronous, non-suspending lookup: the facade's fast-path cache reads never suspend the
    /// caller, even on a miss.
    pub fn get(&self, state_root: &Hash256) -> Option<Arc<S>> {
        self.inner.lock().get(state_root).cloned()
    }

    pub fn put(&self, state_root: Hash256, state: Arc<S>) {
        self.inner.lock().put(state_root, state);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
