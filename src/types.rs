//! Shared primitive types for the regeneration core.
//!
//! The consensus `BeaconState`/`BeaconBlock` contents themselves are out of scope; this module
//! defines only the slices of the data model this crate actually reads: slots, epochs,
//! checkpoints and the block metadata the fork-choice DAG exposes.

use std::fmt;
use std::sync::Arc;

pub use alloy_primitives::B256 as Hash256;

/// Bundles the constants a concrete spec (mainnet, minimal, ...) fixes.
///
/// A zero-sized marker type whose associated constants parameterise the rest of the crate, so
/// tests can run against a cheap `MinimalEthSpec` while production code stays generic over the
/// same trait.
pub trait EthSpec: Clone + fmt::Debug + Send + Sync + PartialEq + Eq + 'static {
    fn slots_per_epoch() -> u64;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct MainnetEthSpec;

impl EthSpec for MainnetEthSpec {
    fn slots_per_epoch() -> u64 {
        32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct MinimalEthSpec;

impl EthSpec for MinimalEthSpec {
    fn slots_per_epoch() -> u64 {
        8
    }
}

macro_rules! new_type_u64 {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u64);

        impl $name {
            pub const fn new(n: u64) -> Self {
                Self(n)
            }

            pub const fn as_u64(self) -> u64 {
                self.0
            }

            pub fn saturating_sub(self, other: impl Into<Self>) -> Self {
                Self(self.0.saturating_sub(other.into().0))
            }

            pub fn saturating_add(self, other: impl Into<Self>) -> Self {
                Self(self.0.saturating_add(other.into().0))
            }
        }

        impl From<u64> for $name {
            fn from(n: u64) -> Self {
                Self(n)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

new_type_u64!(Slot);
new_type_u64!(Epoch);

impl Slot {
    /// The epoch containing this slot, under the given spec.
    pub fn epoch<E: EthSpec>(self) -> Epoch {
        Epoch::new(self.0 / E::slots_per_epoch())
    }
}

impl Epoch {
    /// The first slot of this epoch, under the given spec.
    pub fn start_slot<E: EthSpec>(self) -> Slot {
        Slot::new(self.0 * E::slots_per_epoch())
    }

    /// `self - 1`, clamped at epoch 0. Used for the `Curr`/`Prev` tiers of the dependant-root
    /// index, which look one and two epochs behind a state's own epoch.
    pub fn saturating_previous(self) -> Epoch {
        Epoch::new(self.0.saturating_sub(1))
    }
}

/// `(epoch, root)` marking an epoch boundary (GLOSSARY: Checkpoint).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Checkpoint {
    pub epoch: Epoch,
    pub root: Hash256,
}

/// Read-only metadata about a block, as exposed by the fork-choice DAG. `target_root` is an O(1)
/// jump pointer that lets the dependant-root resolver skip a full epoch of ancestors per hop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockSummary {
    pub block_root: Hash256,
    pub parent_root: Option<Hash256>,
    pub state_root: Hash256,
    pub slot: Slot,
    /// Root of the first block in this block's epoch along its ancestor chain, or the block
    /// itself if it is that first block.
    pub target_root: Hash256,
}

impl BlockSummary {
    pub fn epoch<E: EthSpec>(&self) -> Epoch {
        self.slot.epoch::<E>()
    }

    pub fn is_epoch_boundary(&self) -> bool {
        self.block_root == self.target_root
    }
}

/// Current view of the chain head. The three dependant roots decide the next/proposer shuffling
/// (epoch E), the current attester shuffling (epoch E-1) and the previous attester shuffling
/// (epoch E-2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeadSummary {
    pub block_root: Hash256,
    pub state_root: Hash256,
    pub slot: Slot,
    pub epoch: Epoch,
    pub target_root: Hash256,
    pub dependant_root_next: Hash256,
    pub dependant_root_curr: Hash256,
    pub dependant_root_prev: Hash256,
}

/// A permutation of validator indices for one epoch's proposer or attester duties. Cheaply
/// cloneable since every cache tier that retains one only ever shares the same allocation.
pub type Shuffling = Arc<[u64]>;

/// The slice of an otherwise-opaque consensus state that this crate actually reads. The
/// state-transition function that produces values of this type is an external collaborator,
/// injected via [`crate::state_transition::StateTransition`].
pub trait ConsensusState<E: EthSpec>: fmt::Debug + Send + Sync + 'static {
    fn slot(&self) -> Slot;
    fn state_root(&self) -> Hash256;
    fn proposers(&self) -> &[u64];
    fn current_shuffling(&self) -> &Shuffling;
    fn next_shuffling(&self) -> &Shuffling;
    fn previous_shuffling(&self) -> &Shuffling;

    fn epoch(&self) -> Epoch {
        self.slot().epoch::<E>()
    }
}
