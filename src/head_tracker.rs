//! Head tracking: holds the current head summary and its cached state, serving `get_head_state*`
//! synchronously when available and degrading to `HeadUnavailable` rather than stalling when it
//! is not.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::dependant_root::dependant_root_at_epoch;
use crate::errors::Error;
use crate::job_queue::{JobQueue, RegenRequest};
use crate::regen_engine::{Caller, RegenEngine, RegenError};
use crate::regen_types::RegenTypes;
use crate::types::{BlockSummary, ConsensusState, Epoch, EthSpec, HeadSummary, Slot};

struct Inner<T: RegenTypes> {
    head: Option<HeadSummary>,
    state: Option<Arc<T::State>>,
}

impl<T: RegenTypes> Default for Inner<T> {
    fn default() -> Self {
        Self { head: None, state: None }
    }
}

pub struct HeadTracker<T: RegenTypes> {
    engine: Arc<RegenEngine<T>>,
    queue: JobQueue<T>,
    inner: RwLock<Inner<T>>,
}

impl<T: RegenTypes> HeadTracker<T> {
    pub fn new(engine: Arc<RegenEngine<T>>, queue: JobQueue<T>) -> Arc<Self> {
        Arc::new(Self { engine, queue, inner: RwLock::new(Inner::default()) })
    }

    /// Replaces the head summary, computing its three dependant roots, and resolves `head_state`:
    /// `candidate_state` if it matches, else a cache fallback, else an asynchronous regen that
    /// installs only if this is still the current head when it completes.
    pub fn set_head(
        self: &Arc<Self>,
        block: BlockSummary,
        candidate_state: Option<Arc<T::State>>,
    ) -> Result<(), RegenError<T>> {
        let epoch = block.epoch::<T::EthSpec>();
        let fork_choice = &*self.engine.fork_choice;

        let dependant_root_next = dependant_root_at_epoch::<_, T::EthSpec>(fork_choice, block.block_root, epoch)
            .map_err(Self::map_dependant_root_err)?;
        let one_back = epoch.saturating_previous();
        let dependant_root_curr = dependant_root_at_epoch::<_, T::EthSpec>(fork_choice, block.block_root, one_back)
            .map_err(Self::map_dependant_root_err)?;
        let two_back = one_back.saturating_previous();
        let dependant_root_prev = dependant_root_at_epoch::<_, T::EthSpec>(fork_choice, block.block_root, two_back)
            .map_err(Self::map_dependant_root_err)?;

        let head = HeadSummary {
            block_root: block.block_root,
            state_root: block.state_root,
            slot: block.slot,
            epoch,
            target_root: block.target_root,
            dependant_root_next,
            dependant_root_curr,
            dependant_root_prev,
        };

        // A fallback candidate is only accepted if it actually satisfies
        // `head_state.slot == head.slot && head_state.state_root() == head.state_root`;
        // `checkpoint_cache.latest` in particular can return a state from an earlier epoch,
        // which this guard rejects rather than installing a stale head state (see DESIGN.md).
        let matches = |state: &Arc<T::State>| {
            state.slot().as_u64() == head.slot.as_u64() && state.state_root() == head.state_root
        };

        let resolved = candidate_state
            .filter(matches)
            .or_else(|| self.engine.checkpoint_cache.latest(head.block_root, Epoch::new(u64::MAX)).filter(matches))
            .or_else(|| self.engine.state_cache.get(&head.state_root).filter(matches));

        {
            let mut inner = self.inner.write();
            inner.head = Some(head);
            inner.state = resolved.clone();
        }

        if resolved.is_some() {
            return Ok(());
        }

        let this = self.clone();
        tokio::spawn(async move {
            let result = this
                .queue
                .submit_and_wait(RegenRequest::GetState { state_root: head.state_root, caller: Caller("head_tracker") })
                .await;
            match result {
                Ok(state) => {
                    let mut inner = this.inner.write();
                    // Compare-and-set: only install if `set_head` hasn't moved on since.
                    if inner.head.map(|h| h.state_root) == Some(head.state_root) {
                        inner.state = Some(state);
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "head state recovery failed, leaving head unavailable");
                }
            }
        });

        Ok(())
    }

    fn map_dependant_root_err(err: crate::dependant_root::DependantRootError) -> RegenError<T> {
        match err {
            crate::dependant_root::DependantRootError::BeforeFinalized { epoch } => Error::BeforeFinalized { epoch },
            crate::dependant_root::DependantRootError::Unresolvable { block, slot } => Error::Unresolvable { block, slot },
        }
    }

    /// Synchronous: the installed head state, falling back to a direct State Cache lookup.
    pub fn get_head_state(&self) -> Option<Arc<T::State>> {
        let inner = self.inner.read();
        if let Some(state) = &inner.state {
            return Some(state.clone());
        }
        let head = inner.head?;
        drop(inner);
        self.engine.state_cache.get(&head.state_root)
    }

    pub fn head(&self) -> Option<HeadSummary> {
        self.inner.read().head
    }

    pub async fn get_head_state_at_slot(&self, slot: Slot) -> Result<Arc<T::State>, RegenError<T>> {
        let head_state = self.get_head_state().ok_or(Error::HeadUnavailable)?;
        if slot.as_u64() >= head_state.slot().as_u64() {
            return Ok(head_state);
        }
        let advanced = self
            .engine
            .state_transition
            .process_slots_to_nearest_checkpoint((*head_state).clone(), slot)
            .await
            .map_err(Error::Transition)?;
        Ok(Arc::new(advanced))
    }

    pub async fn get_head_state_at_epoch(&self, epoch: Epoch) -> Result<Arc<T::State>, RegenError<T>> {
        self.get_head_state_at_slot(epoch.start_slot::<T::EthSpec>()).await
    }
}
