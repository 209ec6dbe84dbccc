//! Divergence analysis.
//!
//! An instruction is *divergent* when its value (or, for a branch, its
//! direction) may differ between the logical threads or blocks that
//! coarsening merges. Seeds are the identity reads of the coarsened level
//! and dimension; divergence then flows to:
//!
//! 1. direct data-flow users;
//! 2. the phi-nodes of a divergent conditional branch's immediate
//!    post-dominator, whose selected incoming value depends on the path;
//! 3. values of a loop that a divergent branch exits, when read after
//!    the loop, since threads leave it after different iterations;
//! 4. at block level only, every other access rooted at the same
//!    shared-memory global as a divergent access, since all threads of a
//!    block observe the same shared array.
//!
//! The worklist is ordered by handle and every instruction enters the
//! divergent set once, so the fixpoint is reached in a bounded number of
//! steps and the result does not depend on hash order.

use std::cell::OnceCell;
use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use coarsen_ir::graph::reverse_postorder;
use coarsen_ir::{BlockId, Function, FunctionAnalyses, GlobalId, InstId, InstKind, UseMap, Value};

use crate::grid::{Dimension, GridAnalysis, Level};
use crate::region::{build_regions, outermost_region_indices, DivergentRegion, RegionError};

/// Divergent instructions, branches and regions of one function.
#[derive(Debug)]
pub struct DivergenceAnalysis {
    level: Level,
    dim: Dimension,
    /// Blocks in reverse post-order, instructions in block order. A
    /// definition therefore precedes every use it dominates.
    divergent: Vec<InstId>,
    set: FxHashSet<InstId>,
    branches: Vec<InstId>,
    regions: Vec<DivergentRegion>,
    builtins: FxHashSet<InstId>,
    inst_blocks: FxHashMap<InstId, BlockId>,
    outermost_insts: OnceCell<Vec<InstId>>,
    outermost_regions: OnceCell<Vec<usize>>,
}

impl DivergenceAnalysis {
    /// Run the analysis for `level` along `dim`.
    ///
    /// `shared` lists the module's shared-memory globals; it only matters
    /// at block level.
    pub fn analyze(
        func: &Function,
        analyses: &FunctionAnalyses,
        grid: &GridAnalysis,
        shared: &FxHashSet<GlobalId>,
        level: Level,
        dim: Dimension,
    ) -> Result<Self, RegionError> {
        let users = func.use_map();
        let shared_accesses = match level {
            Level::Block => shared_accesses(func, shared),
            Level::Thread => FxHashMap::default(),
        };

        let mut set: FxHashSet<InstId> = FxHashSet::default();
        let mut worklist: BTreeSet<InstId> = grid.ids(level, dim).iter().copied().collect();

        while let Some(inst) = worklist.pop_first() {
            if !set.insert(inst) {
                continue;
            }
            for user in divergent_users(func, analyses, &users, &shared_accesses, inst) {
                if !set.contains(&user) {
                    worklist.insert(user);
                }
            }
        }

        let mut divergent = Vec::with_capacity(set.len());
        let mut inst_blocks = FxHashMap::default();
        for block in reverse_postorder(func) {
            for &inst in func.block(block).insts() {
                if set.contains(&inst) {
                    divergent.push(inst);
                    inst_blocks.insert(inst, block);
                }
            }
        }

        let branches: Vec<InstId> = divergent
            .iter()
            .copied()
            .filter(|&inst| func.kind(inst).is_conditional_branch())
            .collect();
        let regions = build_regions(func, analyses, &branches)?;

        debug!(
            function = %func.name,
            %level,
            %dim,
            divergent = divergent.len(),
            branches = branches.len(),
            regions = regions.len(),
            "divergence analysis"
        );

        Ok(Self {
            level,
            dim,
            divergent,
            set,
            branches,
            regions,
            builtins: grid.builtins(),
            inst_blocks,
            outermost_insts: OnceCell::new(),
            outermost_regions: OnceCell::new(),
        })
    }

    #[inline]
    pub fn level(&self) -> Level {
        self.level
    }

    #[inline]
    pub fn dimension(&self) -> Dimension {
        self.dim
    }

    #[inline]
    pub fn is_divergent(&self, inst: InstId) -> bool {
        self.set.contains(&inst)
    }

    /// All divergent instructions, in program order.
    pub fn instructions(&self) -> &[InstId] {
        &self.divergent
    }

    /// Divergent conditional branches, in program order.
    pub fn branches(&self) -> &[InstId] {
        &self.branches
    }

    pub fn regions(&self) -> &[DivergentRegion] {
        &self.regions
    }

    /// Divergent instructions outside every region, grid reads excluded.
    pub fn outermost_instructions(&self) -> &[InstId] {
        self.outermost_insts.get_or_init(|| {
            self.divergent
                .iter()
                .copied()
                .filter(|inst| !self.builtins.contains(inst))
                .filter(|inst| {
                    let Some(block) = self.inst_blocks.get(inst) else {
                        return false;
                    };
                    !self.regions.iter().any(|region| region.contains_block(*block))
                })
                .collect()
        })
    }

    /// Regions not nested inside another region.
    pub fn outermost_regions(&self) -> Vec<&DivergentRegion> {
        self.outermost_regions
            .get_or_init(|| outermost_region_indices(&self.regions))
            .iter()
            .map(|&idx| &self.regions[idx])
            .collect()
    }
}

/// Instructions that become divergent because `inst` is.
fn divergent_users(
    func: &Function,
    analyses: &FunctionAnalyses,
    users: &UseMap,
    shared_accesses: &FxHashMap<GlobalId, Vec<InstId>>,
    inst: InstId,
) -> Vec<InstId> {
    let mut out: Vec<InstId> = users.get(&inst).cloned().unwrap_or_default();

    if func.kind(inst).is_conditional_branch() {
        if let Some(block) = func.block_of(inst) {
            if let Some(ipdom) = analyses.pdom.immediate_post_dominator(block) {
                out.extend(func.phis(ipdom));
            }
            out.extend(loop_live_outs(func, analyses, users, block));
        }
    }

    if let Some(global) = shared_root(func, inst) {
        if let Some(accesses) = shared_accesses.get(&global) {
            trace!(global = global.index(), "divergent shared-memory access");
            out.extend(accesses.iter().copied().filter(|&other| other != inst));
        }
    }

    out
}

/// Values of every loop that a branch in `block` leaves, read after the
/// loop. Threads leave such a loop after different iterations, so they see
/// different final values.
fn loop_live_outs(
    func: &Function,
    analyses: &FunctionAnalyses,
    users: &UseMap,
    block: BlockId,
) -> Vec<InstId> {
    let loops = &analyses.loops;
    let succs = func.successors(block);
    let mut out = Vec::new();
    for id in loops.enclosing(block) {
        let lp = loops.get(id);
        if succs.iter().all(|&succ| lp.contains(succ)) {
            continue;
        }
        for &member in &lp.blocks {
            for &def in func.block(member).insts() {
                let escapes = users.get(&def).is_some_and(|list| {
                    list.iter()
                        .any(|&user| func.block_of(user).is_some_and(|b| !lp.contains(b)))
                });
                if escapes {
                    out.push(def);
                }
            }
        }
    }
    out
}

/// Group loads, stores and address computations by the shared global they
/// address.
fn shared_accesses(func: &Function, shared: &FxHashSet<GlobalId>) -> FxHashMap<GlobalId, Vec<InstId>> {
    let mut map: FxHashMap<GlobalId, Vec<InstId>> = FxHashMap::default();
    if shared.is_empty() {
        return map;
    }
    for inst in func.instructions() {
        if let Some(global) = shared_root(func, inst) {
            if shared.contains(&global) {
                map.entry(global).or_default().push(inst);
            }
        }
    }
    map
}

/// The global at the root of a memory access's address chain, following
/// `getelementptr` bases and address-space casts.
fn shared_root(func: &Function, inst: InstId) -> Option<GlobalId> {
    let mut value = func.kind(inst).address_operand()?;
    loop {
        match value {
            Value::Global(global) => return Some(global),
            Value::Inst(def) => match func.kind(def) {
                InstKind::Gep { base, .. } => value = *base,
                InstKind::Cast { value: inner, .. } => value = *inner,
                _ => return None,
            },
            _ => return None,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
