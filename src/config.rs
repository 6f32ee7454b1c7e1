//! Tunables for the regeneration core.
//!
//! A plain struct of `pub` fields with a `Default` impl: construct with `Default::default()` and
//! override the fields the host cares about. There is no CLI or config-file layer of its own.

use std::num::NonZeroUsize;

/// Maximum backlog of the bounded job queue.
pub const MAX_QUEUE: usize = 256;

/// Default bound on the State Cache.
pub const DEFAULT_STATE_CACHE_CAPACITY: usize = 32;

/// Default bound on the Checkpoint State Cache.
pub const DEFAULT_CHECKPOINT_CACHE_CAPACITY: usize = 4;

/// Default epoch horizon for dependant-root index GC.
pub const DEFAULT_GC_HORIZON: u64 = 4;

#[derive(Clone, Debug)]
pub struct RegenConfig {
    /// Bound on pending + in-flight jobs in the regen queue.
    pub max_queue: usize,
    /// Bound on the number of states held strongly by the State Cache.
    pub state_cache_capacity: NonZeroUsize,
    /// Bound on the number of states held strongly by the Checkpoint State Cache.
    pub checkpoint_cache_capacity: NonZeroUsize,
    /// Dependant-root index entries older than `finalized_epoch - gc_horizon` are dropped
    /// whenever the finalized epoch advances.
    pub gc_horizon: u64,
}

impl Default for RegenConfig {
    fn default() -> Self {
        Self {
            max_queue: MAX_QUEUE,
            state_cache_capacity: NonZeroUsize::new(DEFAULT_STATE_CACHE_CAPACITY)
                .expect("constant is non-zero"),
            checkpoint_cache_capacity: NonZeroUsize::new(DEFAULT_CHECKPOINT_CACHE_CAPACITY)
                .expect("constant is non-zero"),
            gc_horizon: DEFAULT_GC_HORIZON,
        }
    }
}
