//! Bounded `(block_root, epoch) -> State` cache with a "latest <= epoch" query. Checkpoint states
//! are the most reusable regen artifact, so they are indexed separately from the State Cache
//! rather than only by `state_root`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::{Checkpoint, ConsensusState, Epoch, EthSpec, Hash256};

struct Inner<S> {
    by_root: HashMap<Hash256, BTreeMap<Epoch, Arc<S>>>,
    /// Insertion order, for FIFO eviction once `capacity` is exceeded.
    order: VecDeque<(Hash256, Epoch)>,
    capacity: usize,
}

pub struct CheckpointStateCache<E, S> {
    inner: Mutex<Inner<S>>,
    _marker: std::marker::PhantomData<E>,
}

impl<E: EthSpec, S> CheckpointStateCache<E, S> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                by_root: HashMap::new(),
                order: VecDeque::new(),
                capacity: capacity.get(),
            }),
            _marker: std::marker::PhantomData,
        }
    }

    /// Exact `(block_root, epoch)` lookup.
    pub fn get(&self, checkpoint: &Checkpoint) -> Option<Arc<S>> {
        self.inner
            .lock()
            .by_root
            .get(&checkpoint.root)
            .and_then(|by_epoch| by_epoch.get(&checkpoint.epoch))
            .cloned()
    }

    /// The state for the latest epoch `<= max_epoch` cached under `block_root`, if any.
    pub fn latest(&self, block_root: Hash256, max_epoch: Epoch) -> Option<Arc<S>> {
        self.inner.lock().by_root.get(&block_root).and_then(|by_epoch| {
            by_epoch
                .range(..=max_epoch)
                .next_back()
                .map(|(_, state)| state.clone())
        })
    }

    pub fn put(&self, block_root: Hash256, epoch: Epoch, state: Arc<S>) {
        let mut inner = self.inner.lock();
        let is_new = inner
            .by_root
            .get(&block_root)
            .is_none_or(|by_epoch| !by_epoch.contains_key(&epoch));

        inner
            .by_root
            .entry(block_root)
            .or_default()
            .insert(epoch, state);

        if is_new {
            inner.order.push_back((block_root, epoch));
            while inner.order.len() > inner.capacity {
                if let Some((old_root, old_epoch)) = inner.order.pop_front() {
                    if let Some(by_epoch) = inner.by_root.get_mut(&old_root) {
                        by_epoch.remove(&old_epoch);
                        if by_epoch.is_empty() {
                            inner.by_root.remove(&old_root);
                        }
                    }
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: EthSpec, S: ConsensusState<E>> CheckpointStateCache<E, S> {
    /// Linear scan for a cached checkpoint state with the given `state_root`, used by
    /// [`crate::regen_engine::RegenEngine::regen_state`] to resolve an arbitrary state root that
    /// isn't a fresh parent post-state. The cache is small and bounded, so this stays cheap.
    pub fn find_by_state_root(&self, state_root: Hash256) -> Option<Arc<S>> {
        self.inner
            .lock()
            .by_root
            .values()
            .flat_map(|by_epoch| by_epoch.values())
            .find(|state| state.state_root() == state_root)
            .cloned()
    }
}
