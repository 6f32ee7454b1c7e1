//! Dependant-root resolution: walks fork-choice ancestors to compute the block root whose
//! post-state determines the shuffling used at a given epoch.
//!
//! The `target_root` pointer on each [`BlockSummary`] lets the traversal skip an entire epoch of
//! blocks per hop, giving O(epochs-back) behavior instead of O(slots-back).

use crate::fork_choice_adapter::ForkChoiceStore;
use crate::types::{Epoch, EthSpec, Hash256, Slot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependantRootError {
    BeforeFinalized { epoch: Epoch },
    Unresolvable { block: Hash256, slot: Slot },
}

/// `dependant_root_at_epoch(from_block, epoch)`: the root of the last block with
/// `slot < first_slot_of_epoch(epoch)` on the ancestor chain of `from_block`.
pub fn dependant_root_at_epoch<F: ForkChoiceStore, E: EthSpec>(
    fork_choice: &F,
    from_block: Hash256,
    epoch: Epoch,
) -> Result<Hash256, DependantRootError> {
    let finalized = fork_choice.get_finalized_checkpoint();

    if epoch.as_u64() == 0 {
        return if finalized.epoch.as_u64() == 0 {
            Ok(finalized.root)
        } else {
            Err(DependantRootError::BeforeFinalized { epoch })
        };
    }

    let target_slot = epoch.start_slot::<E>();
    let mut current_root = from_block;

    loop {
        let unresolvable = || DependantRootError::Unresolvable {
            block: from_block,
            slot: target_slot,
        };

        let block = match fork_choice.get_block(&current_root) {
            Some(block) => block,
            None => {
                return if epoch < finalized.epoch {
                    Err(DependantRootError::BeforeFinalized { epoch })
                } else {
                    Err(unresolvable())
                };
            }
        };

        if block.slot.as_u64() == target_slot.as_u64() {
            return block.parent_root.ok_or_else(unresolvable);
        }

        if block.slot.as_u64() < target_slot.as_u64() {
            return Ok(block.block_root);
        }

        current_root = if block.is_epoch_boundary() {
            block.parent_root.ok_or_else(unresolvable)?
        } else {
            block.target_root
        };
    }
}
