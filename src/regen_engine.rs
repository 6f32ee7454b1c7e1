//! Regeneration engine: combines cache reads, the persistent reader and the transition engine to
//! satisfy a regen request. Each facade operation first tries a synchronous fast path against the
//! appropriate cache; the engine only runs once that fast path has missed and a job has been
//! dequeued. In-epoch pre-states are reusable as-is, but cross-epoch pre-states cost an epoch
//! transition and so must not be short-circuited from cache.

use std::sync::Arc;

use crate::checkpoint_cache::CheckpointStateCache;
use crate::errors::Error;
use crate::fork_choice_adapter::ForkChoiceStore;
use crate::persistent_reader::PersistentReader;
use crate::regen_types::RegenTypes;
use crate::state_cache::StateCache;
use crate::state_transition::StateTransition;
use crate::types::{BlockSummary, Checkpoint, ConsensusState, EthSpec, Hash256, Slot};

pub type RegenError<T> = Error<
    crate::persistent_reader::PersistentReaderError,
    crate::state_transition::TransitionError,
>;

/// A metrics/logging label identifying the subsystem that issued a request, e.g. `"http_api"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Caller(pub &'static str);

/// Identifies which facade operation a [`crate::job_queue::RegenRequest`] came from, for metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::IntoStaticStr)]
pub enum Entrypoint {
    GetPreState,
    GetCheckpointState,
    GetBlockSlotState,
    GetState,
}

pub struct RegenEngine<T: RegenTypes> {
    pub fork_choice: Arc<T::ForkChoice>,
    pub persistent_reader: Arc<T::PersistentReader>,
    pub state_transition: Arc<T::StateTransition>,
    pub state_cache: Arc<StateCache<T::EthSpec, T::State>>,
    pub checkpoint_cache: Arc<CheckpointStateCache<T::EthSpec, T::State>>,
}

impl<T: RegenTypes> RegenEngine<T> {
    pub fn new(
        fork_choice: Arc<T::ForkChoice>,
        persistent_reader: Arc<T::PersistentReader>,
        state_transition: Arc<T::StateTransition>,
        state_cache: Arc<StateCache<T::EthSpec, T::State>>,
        checkpoint_cache: Arc<CheckpointStateCache<T::EthSpec, T::State>>,
    ) -> Self {
        Self {
            fork_choice,
            persistent_reader,
            state_transition,
            state_cache,
            checkpoint_cache,
        }
    }

    /// Non-suspending fast path for `get_pre_state`. `Ok(None)` means the caller should enqueue a
    /// regen job.
    pub fn try_pre_state(
        &self,
        block: &BlockSummary,
    ) -> Result<Option<Arc<T::State>>, RegenError<T>> {
        let parent_root = block
            .parent_root
            .ok_or(Error::BlockNotInForkChoice { root: block.block_root })?;
        let parent = self
            .fork_choice
            .get_block(&parent_root)
            .ok_or(Error::BlockNotInForkChoice { root: parent_root })?;

        let block_epoch = block.epoch::<T::EthSpec>();
        let parent_epoch = parent.epoch::<T::EthSpec>();

        if parent_epoch.as_u64() < block_epoch.as_u64() {
            Ok(self.checkpoint_cache.latest(parent.block_root, block_epoch))
        } else if parent_epoch == block_epoch {
            Ok(self.state_cache.get(&parent.state_root))
        } else {
            Ok(None)
        }
    }

    /// Full regeneration of the pre-state for `block`, used once the fast path has missed.
    pub async fn regen_pre_state(
        &self,
        block: &BlockSummary,
    ) -> Result<Arc<T::State>, RegenError<T>> {
        let parent_root = block
            .parent_root
            .ok_or(Error::BlockNotInForkChoice { root: block.block_root })?;
        let parent = self
            .fork_choice
            .get_block(&parent_root)
            .ok_or(Error::BlockNotInForkChoice { root: parent_root })?;

        let block_epoch = block.epoch::<T::EthSpec>();
        let parent_epoch = parent.epoch::<T::EthSpec>();

        let parent_state = self.regen_state_for_block(&parent).await?;

        if parent_epoch.as_u64() < block_epoch.as_u64() {
            let target_slot = block_epoch.start_slot::<T::EthSpec>();
            let advanced = self
                .state_transition
                .process_slots_to((*parent_state).clone(), target_slot)
                .await
                .map_err(Error::Transition)?;
            let advanced = Arc::new(advanced);
            self.state_cache.put(advanced.state_root(), advanced.clone());
            self.checkpoint_cache
                .put(parent.block_root, block_epoch, advanced.clone());
            Ok(advanced)
        } else {
            // Same epoch: the pre-state is exactly the parent's own post-state, unadvanced.
            Ok(parent_state)
        }
    }

    /// Fetches or regenerates the post-state of `block` itself (its `state_root`).
    async fn regen_state_for_block(
        &self,
        block: &BlockSummary,
    ) -> Result<Arc<T::State>, RegenError<T>> {
        if let Some(state) = self.state_cache.get(&block.state_root) {
            return Ok(state);
        }
        self.regen_block_slot_state(block.block_root, block.slot).await
    }

    /// `get_checkpoint_state`: exact `(epoch, dependant_root)` lookup on a cache miss, regenerated
    /// from the persistent reader.
    pub async fn regen_checkpoint_state(
        &self,
        checkpoint: Checkpoint,
    ) -> Result<Arc<T::State>, RegenError<T>> {
        let state = self
            .persistent_reader
            .read_checkpoint_state(checkpoint.epoch, checkpoint.root)
            .await
            .map_err(Error::Persistent)?;
        let state = Arc::new(state);
        self.state_cache.put(state.state_root(), state.clone());
        self.checkpoint_cache
            .put(checkpoint.root, checkpoint.epoch, state.clone());
        Ok(state)
    }

    /// `get_block_slot_state`: the state at `slot` descending from `block_root`. Regenerates the
    /// block's own post-state (replaying it on top of its pre-state if necessary) and then
    /// advances empty slots up to `slot`.
    pub async fn regen_block_slot_state(
        &self,
        block_root: Hash256,
        slot: Slot,
    ) -> Result<Arc<T::State>, RegenError<T>> {
        let block = self
            .fork_choice
            .get_block(&block_root)
            .ok_or(Error::BlockNotInForkChoice { root: block_root })?;

        let block_state = if let Some(state) = self.state_cache.get(&block.state_root) {
            state
        } else {
            let pre_state = self.regen_pre_state(&block).await?;
            let post_state = self
                .state_transition
                .replay_block((*pre_state).clone(), &block)
                .await
                .map_err(Error::Transition)?;
            let post_state = Arc::new(post_state);
            self.state_cache.put(post_state.state_root(), post_state.clone());
            post_state
        };

        if slot.as_u64() == block_state.slot().as_u64() {
            return Ok(block_state);
        }

        let advanced = self
            .state_transition
            .process_slots_to((*block_state).clone(), slot)
            .await
            .map_err(Error::Transition)?;
        let advanced = Arc::new(advanced);
        self.state_cache.put(advanced.state_root(), advanced.clone());
        Ok(advanced)
    }

    /// `get_state`: resolves an arbitrary `state_root` once the State Cache has missed. The
    /// persistent reader exposes no raw `state_root -> state` lookup, so a miss here can only be
    /// served by a state this engine already knows how to derive: the Checkpoint State Cache is
    /// scanned for a matching root before giving up (see DESIGN.md's resolution of this
    /// ambiguity).
    pub async fn regen_state(&self, state_root: Hash256) -> Result<Arc<T::State>, RegenError<T>> {
        if let Some(state) = self.checkpoint_cache.find_by_state_root(state_root) {
            self.state_cache.put(state_root, state.clone());
            return Ok(state);
        }
        Err(Error::Unresolvable { block: state_root, slot: Slot::new(0) })
    }
}
