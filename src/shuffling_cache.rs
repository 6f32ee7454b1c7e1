//! The dependant-root index: three logical tables (`Next`, `Curr`, `Prev`) mapping
//! `epoch -> dependant_root -> {weak refs to State}`, used to answer shuffling queries without a
//! full regen.
//!
//! Weak so that evicting a state from the [`crate::state_cache::StateCache`] doesn't leak it here;
//! dead references are pruned opportunistically on read, and whole epochs are dropped once they
//! fall behind `finalized_epoch - gc_horizon`.
//!
//! `Next` answers the next/proposer shuffling at epoch E; `Curr` the current attester shuffling at
//! epoch E-1; `Prev` the previous attester shuffling at epoch E-2. The three tiers are kept
//! distinct and queried by the caller according to which shuffling it needs, rather than
//! collapsing them into a single table.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::types::{Epoch, EthSpec, Hash256};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Tier {
    Next,
    Curr,
    Prev,
}

type Bucket<S> = Vec<Weak<S>>;
type EpochTable<S> = BTreeMap<Epoch, HashMap<Hash256, Bucket<S>>>;

struct Tables<S> {
    next: EpochTable<S>,
    curr: EpochTable<S>,
    prev: EpochTable<S>,
}

impl<S> Default for Tables<S> {
    fn default() -> Self {
        Self {
            next: BTreeMap::new(),
            curr: BTreeMap::new(),
            prev: BTreeMap::new(),
        }
    }
}

pub struct DependantRootIndex<E, S> {
    tables: RwLock<Tables<S>>,
    _marker: std::marker::PhantomData<E>,
}

impl<E: EthSpec, S> Default for DependantRootIndex<E, S> {
    fn default() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<E: EthSpec, S> DependantRootIndex<E, S> {
    pub fn new() -> Self {
        Self::default()
    }

    fn table_mut<'a>(tables: &'a mut Tables<S>, tier: Tier) -> &'a mut EpochTable<S> {
        match tier {
            Tier::Next => &mut tables.next,
            Tier::Curr => &mut tables.curr,
            Tier::Prev => &mut tables.prev,
        }
    }

    fn table<'a>(tables: &'a Tables<S>, tier: Tier) -> &'a EpochTable<S> {
        match tier {
            Tier::Next => &tables.next,
            Tier::Curr => &tables.curr,
            Tier::Prev => &tables.prev,
        }
    }

    /// Registers a weak reference to `state` under `tier` at `(epoch, dependant_root)`.
    pub fn insert(&self, tier: Tier, epoch: Epoch, dependant_root: Hash256, state: &Arc<S>) {
        let mut tables = self.tables.write();
        Self::table_mut(&mut tables, tier)
            .entry(epoch)
            .or_default()
            .entry(dependant_root)
            .or_default()
            .push(Arc::downgrade(state));
    }

    /// Returns the first live reference in the bucket, pruning dead ones in place. Order within a
    /// bucket is not observable to callers; any live entry is an equally valid answer.
    pub fn probe(&self, tier: Tier, epoch: Epoch, dependant_root: Hash256) -> Option<Arc<S>> {
        let mut tables = self.tables.write();
        let bucket = Self::table_mut(&mut tables, tier)
            .get_mut(&epoch)?
            .get_mut(&dependant_root)?;

        let mut found = None;
        bucket.retain(|weak| match weak.upgrade() {
            Some(strong) => {
                if found.is_none() {
                    found = Some(strong);
                }
                true
            }
            None => false,
        });
        found
    }

    /// Drops every entry whose epoch is `< finalized_epoch - gc_horizon`. Run whenever the
    /// finalized epoch advances.
    pub fn gc(&self, finalized_epoch: Epoch, gc_horizon: u64) {
        let floor = Epoch::new(finalized_epoch.as_u64().saturating_sub(gc_horizon));
        let mut tables = self.tables.write();
        for table in [&mut tables.next, &mut tables.curr, &mut tables.prev] {
            table.retain(|&epoch, _| epoch >= floor);
        }
    }

    #[cfg(test)]
    fn bucket_len(&self, tier: Tier, epoch: Epoch, dependant_root: Hash256) -> usize {
        let tables = self.tables.read();
        Self::table(&tables, tier)
            .get(&epoch)
            .and_then(|by_root| by_root.get(&dependant_root))
            .map_or(0, |bucket| bucket.len())
    }

    #[cfg(test)]
    fn epoch_count(&self, tier: Tier) -> usize {
        let tables = self.tables.read();
        Self::table(&tables, tier).len()
    }
}
