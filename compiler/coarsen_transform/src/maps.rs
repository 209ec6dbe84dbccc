//! Original → replica bookkeeping.
//!
//! Both maps are keyed by instruction handle and hold `factor - 1` clones,
//! one per extra logical thread: entry `k` serves logical replica `k + 2`.

use std::collections::hash_map::Entry;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use coarsen_ir::InstId;

/// Clones of one instruction, in replica order.
pub type CloneList = SmallVec<[InstId; 4]>;

/// Instructions whose replicas are known.
#[derive(Clone, Debug, Default)]
pub struct CoarseningMap {
    entries: FxHashMap<InstId, CloneList>,
}

impl CoarseningMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `clones` for `original` unless it already has an entry.
    /// Returns whether the entry was added.
    pub fn insert(&mut self, original: InstId, clones: CloneList) -> bool {
        match self.entries.entry(original) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(clones);
                true
            }
        }
    }

    #[inline]
    pub fn contains(&self, inst: InstId) -> bool {
        self.entries.contains_key(&inst)
    }

    pub fn get(&self, inst: InstId) -> Option<&[InstId]> {
        self.entries.get(&inst).map(SmallVec::as_slice)
    }

    /// Every entry, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (InstId, &[InstId])> + '_ {
        self.entries
            .iter()
            .map(|(&original, clones)| (original, clones.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Stand-ins for replicas that do not exist yet.
///
/// When a clone needs replica `k` of a divergent value that has not been
/// replicated, it reads a placeholder instead. Once the value's real clones
/// are created, [`record_clones`](Self::record_clones) pairs each
/// placeholder with its replacement.
#[derive(Clone, Debug, Default)]
pub struct PlaceholderMap {
    entries: FxHashMap<InstId, CloneList>,
    /// Originals in creation order, for deterministic resolution.
    order: Vec<InstId>,
    replacements: FxHashMap<InstId, InstId>,
}

impl PlaceholderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, original: InstId) -> Option<&[InstId]> {
        self.entries.get(&original).map(SmallVec::as_slice)
    }

    pub fn insert(&mut self, original: InstId, placeholders: CloneList) {
        if self.entries.insert(original, placeholders).is_none() {
            self.order.push(original);
        }
    }

    /// Pair the placeholders of `original` with its real `clones`.
    pub fn record_clones(&mut self, original: InstId, clones: &[InstId]) {
        let Some(placeholders) = self.entries.get(&original) else {
            return;
        };
        for (&placeholder, &clone) in placeholders.iter().zip(clones) {
            self.replacements.insert(placeholder, clone);
        }
    }

    pub fn replacement(&self, placeholder: InstId) -> Option<InstId> {
        self.replacements.get(&placeholder).copied()
    }

    /// Every placeholder, grouped by original in creation order.
    pub fn placeholders(&self) -> impl Iterator<Item = InstId> + '_ {
        self.order
            .iter()
            .filter_map(|original| self.entries.get(original))
            .flat_map(|list| list.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
