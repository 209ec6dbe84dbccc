//! Replication of divergent code.
//!
//! Once the grid is rewritten, every divergent instruction outside a
//! divergent region is cloned `factor - 1` times in place, and every
//! outermost divergent region is cloned as a whole and chained after
//! itself:
//!
//! ```text
//! pred -> R -> R.cf2 -> R.cf3 -> ... -> exit
//! ```
//!
//! Inside replica `k`, operands are rewired through the coarsening map to
//! the `k`-th clone of each value. A divergent value that has not been
//! replicated yet is read through a placeholder; placeholders are replaced
//! by the real clones at the end.

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use coarsen_analysis::{DivergenceAnalysis, DivergentRegion};
use coarsen_ir::clone::{clone_subgraph, suffixed};
use coarsen_ir::{Function, InstId, Value};

use crate::error::KernelError;
use crate::maps::{CloneList, CoarseningMap, PlaceholderMap};

/// Counters reported after a kernel is coarsened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub replicated_instructions: usize,
    pub replicated_regions: usize,
    pub placeholders_created: usize,
    /// Placeholders no real clone was ever recorded for. They are replaced
    /// by `undef`.
    pub placeholders_unresolved: usize,
}

/// Replicates the divergent code of one function.
pub struct CoarseningEngine<'a> {
    divergence: &'a DivergenceAnalysis,
    factor: u32,
    map: CoarseningMap,
    placeholders: PlaceholderMap,
    stats: EngineStats,
}

impl<'a> CoarseningEngine<'a> {
    /// `map` seeds the coarsening map, normally with the sibling
    /// identities produced by the grid rewrite.
    pub fn new(divergence: &'a DivergenceAnalysis, map: CoarseningMap, factor: u32) -> Self {
        Self {
            divergence,
            factor,
            map,
            placeholders: PlaceholderMap::new(),
            stats: EngineStats::default(),
        }
    }

    pub fn map(&self) -> &CoarseningMap {
        &self.map
    }

    pub fn placeholders(&self) -> &PlaceholderMap {
        &self.placeholders
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    fn replicas(&self) -> usize {
        self.factor.saturating_sub(1) as usize
    }

    /// Replicate the outermost divergent instructions, then the outermost
    /// divergent regions.
    pub fn coarsen(&mut self, func: &mut Function) -> Result<(), KernelError> {
        let divergence = self.divergence;
        for &inst in divergence.outermost_instructions() {
            self.replicate_instruction(func, inst);
        }
        for region in divergence.outermost_regions() {
            self.replicate_region(func, region)?;
        }
        debug_assert!(
            self.map.iter().all(|(_, clones)| clones.len() == self.replicas()),
            "every replicated value has one clone per extra replica"
        );
        debug!(
            function = %func.name,
            instructions = self.stats.replicated_instructions,
            regions = self.stats.replicated_regions,
            placeholders = self.stats.placeholders_created,
            "replicated divergent code"
        );
        Ok(())
    }

    /// Clone `inst` once per extra replica, right after itself.
    pub fn replicate_instruction(&mut self, func: &mut Function, inst: InstId) {
        if func.kind(inst).is_terminator() {
            trace!(inst = ?inst, "terminators are replicated with their region");
            return;
        }

        let name = func.inst(inst).name.clone();
        let mut clones: CloneList = SmallVec::with_capacity(self.replicas());
        let mut bookmark = inst;
        for index in 0..self.replicas() {
            let copy = func.clone_inst(inst, suffixed(&name, &format!(".cf{}", index + 2)));
            self.apply_coarsening_map(func, copy, index);
            func.attach_after(bookmark, copy);
            bookmark = copy;
            clones.push(copy);
        }

        self.map.insert(inst, clones.clone());
        self.placeholders.record_clones(inst, &clones);
        self.stats.replicated_instructions += 1;
    }

    /// Chain `factor - 1` copies of `region` between its exiting block and
    /// its exit.
    pub fn replicate_region(
        &mut self,
        func: &mut Function,
        region: &DivergentRegion,
    ) -> Result<(), KernelError> {
        let pred = region
            .predecessor(func)
            .ok_or_else(|| KernelError::NoRegionPredecessor {
                function: func.name.clone(),
                header: func.block_label(region.header()),
            })?;
        let bottom = region.exit(func).ok_or_else(|| KernelError::NoRegionExit {
            function: func.name.clone(),
            exiting: func.block_label(region.exiting()),
        })?;
        let mut top = region.exiting();

        let mut alive: Vec<(InstId, CloneList)> = region
            .alive()
            .iter()
            .map(|&inst| (inst, CloneList::new()))
            .collect();

        // Every copy is taken from the untouched region, before splicing
        // redirects its exiting block away from `bottom`.
        let copies: Vec<_> = (0..self.replicas())
            .map(|index| clone_subgraph(func, region.blocks(), &format!(".cf{}", index + 2)))
            .collect();

        // Placeholders living in the region were copied along; the
        // originals already stand for every replica.
        let placeholders: FxHashSet<InstId> = self.placeholders.placeholders().collect();

        for (index, copy) in copies.iter().enumerate() {
            let (Some(header), Some(exiting)) =
                (copy.block(region.header()), copy.block(region.exiting()))
            else {
                continue;
            };

            for (original, cloned) in &copy.value_map {
                if placeholders.contains(original) {
                    func.erase(*cloned);
                }
            }

            let cloned: Vec<InstId> = copy
                .blocks
                .iter()
                .flat_map(|&block| func.block(block).insts().to_vec())
                .collect();
            for inst in cloned {
                self.apply_coarsening_map(func, inst, index);
            }

            func.replace_successor(top, bottom, header);
            func.remap_phi_incoming(header, pred, top);
            func.remap_phi_incoming(bottom, top, exiting);
            top = exiting;

            for (original, clones) in &mut alive {
                if let Some(value) = copy.value(*original) {
                    clones.push(value);
                }
            }
        }

        self.update_placeholders_with_alive(&alive);
        self.stats.replicated_regions += 1;
        trace!(
            header = %func.block_label(region.header()),
            blocks = region.blocks().len(),
            "replicated region"
        );
        Ok(())
    }

    /// Make the clones of a region's alive values visible to later
    /// replicas and to the placeholders standing in for them.
    fn update_placeholders_with_alive(&mut self, alive: &[(InstId, CloneList)]) {
        for (inst, clones) in alive {
            self.map.insert(*inst, clones.clone());
        }
        for (inst, clones) in alive {
            self.placeholders.record_clones(*inst, clones);
        }
    }

    /// Rewire the operands of `inst` to replica `index`.
    fn apply_coarsening_map(&mut self, func: &mut Function, inst: InstId, index: usize) {
        if self.map.contains(inst) {
            return;
        }

        let operands = func.kind(inst).operands();
        let mut replacements: SmallVec<[Option<InstId>; 4]> = SmallVec::with_capacity(operands.len());
        for operand in operands {
            replacements.push(match operand {
                Value::Inst(op) => self.coarsened_operand(func, inst, op, index),
                _ => None,
            });
        }

        let kind = &mut func.inst_mut(inst).kind;
        for (operand, replacement) in kind.operands_mut().into_iter().zip(replacements) {
            if let Some(new) = replacement {
                *operand = Value::Inst(new);
            }
        }
    }

    /// The value replica `index` of `user` reads in place of `op`, if it
    /// differs from `op`.
    fn coarsened_operand(
        &mut self,
        func: &mut Function,
        user: InstId,
        op: InstId,
        index: usize,
    ) -> Option<InstId> {
        if let Some(clones) = self.map.get(op) {
            let result = *clones.get(index)?;
            if result == user || clones.contains(&user) {
                return None;
            }
            return Some(result);
        }

        if !self.divergence.is_divergent(op) {
            return None;
        }
        if self.placeholders.get(op).is_none() {
            self.create_placeholders(func, op);
        }
        self.placeholders.get(op)?.get(index).copied()
    }

    fn create_placeholders(&mut self, func: &mut Function, op: InstId) {
        let name = func.inst(op).name.clone();
        let mut list: CloneList = SmallVec::with_capacity(self.replicas());
        let mut bookmark = op;
        for index in 0..self.replicas() {
            let placeholder = func.clone_inst(
                op,
                suffixed(&name, &format!(".place.holder.cf{}", index + 2)),
            );
            func.attach_after(bookmark, placeholder);
            bookmark = placeholder;
            list.push(placeholder);
        }
        trace!(value = %name, "created placeholders");
        self.stats.placeholders_created += list.len();
        self.placeholders.insert(op, list);
    }

    /// Swap every placeholder for its recorded replacement and remove it.
    pub fn replace_placeholders(&mut self, func: &mut Function) {
        let placeholders: Vec<InstId> = self.placeholders.placeholders().collect();
        for placeholder in placeholders {
            match self.placeholders.replacement(placeholder) {
                Some(replacement) if replacement != placeholder => {
                    func.replace_all_uses_with(placeholder, Value::Inst(replacement));
                }
                Some(_) => continue,
                None => {
                    warn!(
                        function = %func.name,
                        placeholder = %func.inst(placeholder).name,
                        "placeholder was never resolved; replacing it with undef"
                    );
                    func.replace_all_uses_with(placeholder, Value::Undef);
                    self.stats.placeholders_unresolved += 1;
                }
            }
            func.erase(placeholder);
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
