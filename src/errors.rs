//! Error kinds for the regeneration core.
//!
//! The core never retries automatically; every error surfaces to the caller verbatim. No
//! `thiserror` — a hand-written `enum` generic over the two collaborator error types it wraps,
//! mapped in at the call site rather than via a derived `From`.

use crate::types::{Hash256, Slot};

#[derive(Debug)]
pub enum Error<P, T> {
    /// Parent lookup against the fork-choice DAG failed.
    BlockNotInForkChoice { root: Hash256 },
    /// The head state has not yet been regenerated.
    HeadUnavailable,
    /// A dependant-root was requested for an epoch before the finalized epoch.
    BeforeFinalized { epoch: crate::types::Epoch },
    /// The dependant-root traversal exhausted the ancestor chain without resolving.
    Unresolvable { block: Hash256, slot: Slot },
    /// The bounded regen queue is at capacity.
    QueueFull,
    /// The cancellation signal has been raised; pending/in-flight work is rejected.
    Cancelled,
    /// Wraps an error from the state-transition engine.
    Transition(T),
    /// Wraps an error from the persistent-state reader.
    Persistent(P),
}

impl<P, T> Error<P, T> {
    /// A short, stable label suitable for a metrics dimension.
    pub fn label(&self) -> &'static str {
        match self {
            Error::BlockNotInForkChoice { .. } => "block_not_in_fork_choice",
            Error::HeadUnavailable => "head_unavailable",
            Error::BeforeFinalized { .. } => "before_finalized",
            Error::Unresolvable { .. } => "unresolvable",
            Error::QueueFull => "queue_full",
            Error::Cancelled => "cancelled",
            Error::Transition(_) => "transition",
            Error::Persistent(_) => "persistent",
        }
    }
}

impl<P: std::fmt::Debug, T: std::fmt::Debug> std::fmt::Display for Error<P, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl<P: std::fmt::Debug, T: std::fmt::Debug> std::error::Error for Error<P, T> {}
