//! In-memory doubles for the four collaborator traits, shared by unit tests across the crate.
//! Hand-built fixtures rather than a mocking framework, since each double only needs to satisfy a
//! narrow trait.

#![cfg(test)]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::fork_choice_adapter::ForkChoiceStore;
use crate::persistent_reader::{PersistentReader, PersistentReaderError};
use crate::state_transition::{StateTransition, TransitionError};
use crate::types::{BlockSummary, Checkpoint, ConsensusState, Epoch, EthSpec, Hash256, Shuffling, Slot};

/// A deterministic, fully-owned stand-in for a consensus state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockState {
    pub slot: Slot,
    pub state_root: Hash256,
    pub proposers: Vec<u64>,
    pub current_shuffling: Shuffling,
    pub next_shuffling: Shuffling,
    pub previous_shuffling: Shuffling,
}

impl MockState {
    pub fn at_slot(slot: u64) -> Self {
        Self::at_slot_with_root(slot, state_root_for_slot(slot))
    }

    pub fn at_slot_with_root(slot: u64, state_root: Hash256) -> Self {
        Self {
            slot: Slot::new(slot),
            state_root,
            proposers: Vec::new(),
            current_shuffling: Arc::from(Vec::new().into_boxed_slice()),
            next_shuffling: Arc::from(Vec::new().into_boxed_slice()),
            previous_shuffling: Arc::from(Vec::new().into_boxed_slice()),
        }
    }

    pub fn with_proposers(mut self, proposers: Vec<u64>) -> Self {
        self.proposers = proposers;
        self
    }

    pub fn with_current_shuffling(mut self, shuffling: Vec<u64>) -> Self {
        self.current_shuffling = Arc::from(shuffling.into_boxed_slice());
        self
    }

    pub fn slot_value(&self) -> u64 {
        self.slot.as_u64()
    }
}

/// A stable, slot-derived root so tests can assert equality without threading hashes around.
pub fn state_root_for_slot(slot: u64) -> Hash256 {
    let mut bytes = [0u8; 32];
    bytes[0] = 0xAA;
    bytes[24..].copy_from_slice(&slot.to_be_bytes());
    Hash256::from(bytes)
}

impl<E: EthSpec> ConsensusState<E> for MockState {
    fn slot(&self) -> Slot {
        self.slot
    }

    fn state_root(&self) -> Hash256 {
        self.state_root
    }

    fn proposers(&self) -> &[u64] {
        &self.proposers
    }

    fn current_shuffling(&self) -> &Shuffling {
        &self.current_shuffling
    }

    fn next_shuffling(&self) -> &Shuffling {
        &self.next_shuffling
    }

    fn previous_shuffling(&self) -> &Shuffling {
        &self.previous_shuffling
    }
}

/// A hand-rolled fork-choice DAG double: callers build a chain with [`Self::add_block`] and the
/// resolver/engine exercise it exactly as they would the real fork-choice store.
pub struct InMemoryForkChoice {
    blocks: Mutex<HashMap<Hash256, BlockSummary>>,
    finalized: Checkpoint,
    next_id: Mutex<u64>,
}

impl InMemoryForkChoice {
    pub fn new(finalized: Checkpoint) -> Self {
        let mut blocks = HashMap::new();
        blocks.insert(
            finalized.root,
            BlockSummary {
                block_root: finalized.root,
                parent_root: None,
                state_root: finalized.root,
                slot: Slot::new(0),
                target_root: finalized.root,
            },
        );
        Self {
            blocks: Mutex::new(blocks),
            finalized,
            next_id: Mutex::new(1),
        }
    }

    pub fn genesis_root(&self) -> Hash256 {
        self.finalized.root
    }

    /// Appends a block with a fresh, unique root.
    pub fn add_block(&self, parent_root: Hash256, slot: Slot, target_root: Hash256) -> Hash256 {
        let mut id = self.next_id.lock();
        let mut bytes = [0u8; 32];
        bytes[0] = 0xBB;
        bytes[24..].copy_from_slice(&id.to_be_bytes());
        *id += 1;
        let block_root = Hash256::from(bytes);

        self.blocks.lock().insert(
            block_root,
            BlockSummary {
                block_root,
                parent_root: Some(parent_root),
                state_root: block_root,
                slot,
                target_root,
            },
        );
        block_root
    }

    pub fn block(&self, root: Hash256) -> BlockSummary {
        self.blocks.lock().get(&root).copied().expect("block must exist")
    }
}

impl ForkChoiceStore for InMemoryForkChoice {
    fn get_block(&self, root: &Hash256) -> Option<BlockSummary> {
        self.blocks.lock().get(root).copied()
    }

    fn get_finalized_checkpoint(&self) -> Checkpoint {
        self.finalized
    }
}

/// A persistent-reader double backed by a plain map, populated by tests ahead of time.
#[derive(Default)]
pub struct MockPersistentReader {
    states: Mutex<HashMap<(Epoch, Hash256), MockState>>,
}

impl MockPersistentReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, epoch: Epoch, dependant_root: Hash256, state: MockState) {
        self.states.lock().insert((epoch, dependant_root), state);
    }
}

impl<E: EthSpec> PersistentReader<E, MockState> for MockPersistentReader {
    async fn read_checkpoint_state(
        &self,
        epoch: Epoch,
        dependant_root: Hash256,
    ) -> Result<MockState, PersistentReaderError> {
        self.states
            .lock()
            .get(&(epoch, dependant_root))
            .cloned()
            .ok_or(PersistentReaderError::NotFound { epoch, dependant_root })
    }
}

/// A state-transition double: `process_slots_to` simply moves the slot forward; `replay_block`
/// sets the state root to the block's and bumps the slot to the block's slot. A [`tokio::sync::Notify`]
/// lets tests gate an in-flight job open to exercise cancellation of work the worker has already
/// started executing.
#[derive(Default)]
pub struct MockStateTransition {
    pub gate: Option<Arc<tokio::sync::Notify>>,
}

impl MockStateTransition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Arc<tokio::sync::Notify>) -> Self {
        Self { gate: Some(gate) }
    }
}

impl<E: EthSpec> StateTransition<E, MockState> for MockStateTransition {
    async fn process_slots_to(
        &self,
        mut state: MockState,
        target_slot: Slot,
    ) -> Result<MockState, TransitionError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if target_slot.as_u64() < state.slot.as_u64() {
            return Err(TransitionError::TargetBeforeCurrent {
                state_slot: state.slot,
                target_slot,
            });
        }
        state.slot = target_slot;
        state.state_root = state_root_for_slot(target_slot.as_u64());
        Ok(state)
    }

    async fn replay_block(
        &self,
        mut state: MockState,
        block: &BlockSummary,
    ) -> Result<MockState, TransitionError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        state.slot = block.slot;
        state.state_root = block.state_root;
        Ok(state)
    }

    async fn process_slots_to_nearest_checkpoint(
        &self,
        state: MockState,
        target_slot: Slot,
    ) -> Result<MockState, TransitionError> {
        <Self as StateTransition<E, MockState>>::process_slots_to(self, state, target_slot).await
    }
}

/// Ties the doubles together into a concrete [`crate::regen_types::RegenTypes`] for tests.
pub struct TestTypes;

impl crate::regen_types::RegenTypes for TestTypes {
    type EthSpec = crate::types::MainnetEthSpec;
    type State = MockState;
    type ForkChoice = InMemoryForkChoice;
    type PersistentReader = MockPersistentReader;
    type StateTransition = MockStateTransition;
}
