//! Bundles the associated types a concrete deployment of the regeneration core fixes: every
//! generic component in this crate is written `<T: RegenTypes>` rather than threading four-plus
//! type parameters through every signature.

use crate::persistent_reader::PersistentReader;
use crate::state_transition::StateTransition;
use crate::types::{ConsensusState, EthSpec};
use crate::fork_choice_adapter::ForkChoiceStore;

pub trait RegenTypes: 'static + Send + Sync {
    type EthSpec: EthSpec;
    type State: ConsensusState<Self::EthSpec> + Clone;
    type ForkChoice: ForkChoiceStore;
    type PersistentReader: PersistentReader<Self::EthSpec, Self::State>;
    type StateTransition: StateTransition<Self::EthSpec, Self::State>;
}
