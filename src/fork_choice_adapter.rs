//! Read-only interface onto the external fork-choice DAG.
//!
//! The DAG itself — vote accounting, weight computation, reorg logic — lives outside this crate;
//! this crate only ever walks ancestors and reads finality through this trait.

use crate::types::{BlockSummary, Checkpoint};

pub trait ForkChoiceStore: Send + Sync {
    /// Look up a block's metadata by root. `None` if the root is unknown to fork choice.
    fn get_block(&self, root: &crate::types::Hash256) -> Option<BlockSummary>;

    /// The current finalized checkpoint.
    fn get_finalized_checkpoint(&self) -> Checkpoint;
}
