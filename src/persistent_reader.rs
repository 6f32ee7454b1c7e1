//! Read-only interface onto the persistent block/state database. The database itself — its
//! storage format, indexing and write path — is an external collaborator this crate only reads
//! through this trait.

use crate::types::{Epoch, EthSpec, Hash256};
use std::future::Future;

/// Error surfaced by a [`PersistentReader`]. The only variant this crate's control flow cares
/// about is "not found"; anything else is an opaque wrapped failure.
#[derive(Debug)]
pub enum PersistentReaderError {
    NotFound { epoch: Epoch, dependant_root: Hash256 },
    Other(String),
}

pub trait PersistentReader<E, S>: Send + Sync
where
    E: EthSpec,
    S: crate::types::ConsensusState<E>,
{
    /// Read the checkpoint state for `(epoch, dependant_root)` from the backing store.
    fn read_checkpoint_state(
        &self,
        epoch: Epoch,
        dependant_root: Hash256,
    ) -> impl Future<Output = Result<S, PersistentReaderError>> + Send;
}
