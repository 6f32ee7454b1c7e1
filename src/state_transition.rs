//! Interface onto the external state-transition function: slot processing and block replay.
//! The transition logic itself — epoch processing, block processing — lives outside this crate;
//! this crate only calls through the trait.

use crate::types::{BlockSummary, EthSpec, Slot};
use std::future::Future;

#[derive(Debug)]
pub enum TransitionError {
    /// The requested target slot precedes the state's current slot.
    TargetBeforeCurrent { state_slot: Slot, target_slot: Slot },
    Other(String),
}

pub trait StateTransition<E, S>: Send + Sync
where
    E: EthSpec,
    S: crate::types::ConsensusState<E>,
{
    /// Advance `state` to `target_slot` via empty-slot processing (no block applied).
    fn process_slots_to(
        &self,
        state: S,
        target_slot: Slot,
    ) -> impl Future<Output = Result<S, TransitionError>> + Send;

    /// Apply `block` on top of `pre_state`.
    fn replay_block(
        &self,
        pre_state: S,
        block: &BlockSummary,
    ) -> impl Future<Output = Result<S, TransitionError>> + Send;

    /// Advance `state` to the nearest checkpoint boundary at or after `target_slot`, used by the
    /// Head Tracker to serve `get_head_state_at_epoch`/`_at_slot` without going through the queue.
    fn process_slots_to_nearest_checkpoint(
        &self,
        state: S,
        target_slot: Slot,
    ) -> impl Future<Output = Result<S, TransitionError>> + Send;
}
