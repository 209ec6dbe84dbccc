//! Divergent regions.
//!
//! A divergent region is the single-entry/single-exit subgraph controlled by
//! a divergent branch: from the branch's block (the *header*) to its
//! immediate post-dominator (the *exiting* block). When the header is a loop
//! header and the post-dominator lies in the same loop, the region widens to
//! cover the whole loop and ends at the loop's unique exit block.
//!
//! The block list is filled by forward reachability from the header without
//! expanding past the exiting block; the exiting block itself is included as
//! the bound. After filling, the region records its *alive* values (defined
//! inside, used outside) and *incoming* values (defined outside, used inside).

use rustc_hash::FxHashSet;

use coarsen_ir::graph::reachable_until;
use coarsen_ir::{BlockId, DominatorTree, Function, FunctionAnalyses, InstId, UseMap};

/// Structural problems that make a region unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    #[error("divergent branch in block `{block}` of `{function}` has no post-dominator")]
    NoPostDominator { function: String, block: String },
    #[error("loop headed by `{block}` in `{function}` has no unique exit block")]
    NoUniqueLoopExit { function: String, block: String },
    #[error("region header `{header}` does not dominate exiting block `{exiting}` in `{function}`")]
    HeaderDoesNotDominateExiting {
        function: String,
        header: String,
        exiting: String,
    },
    #[error("exiting block `{exiting}` does not post-dominate region header `{header}` in `{function}`")]
    ExitingDoesNotPostDominateHeader {
        function: String,
        header: String,
        exiting: String,
    },
    #[error("exiting block `{exiting}` of `{function}` does not end in an unconditional branch")]
    ExitingNotUnconditional { function: String, exiting: String },
}

/// A header/exiting-bounded subgraph plus its boundary values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DivergentRegion {
    header: BlockId,
    exiting: BlockId,
    blocks: Vec<BlockId>,
    alive: Vec<InstId>,
    incoming: Vec<InstId>,
}

impl DivergentRegion {
    /// Build and fully analyze the region bounded by `header` and `exiting`.
    pub fn new(func: &Function, header: BlockId, exiting: BlockId) -> Self {
        let mut region = Self {
            header,
            exiting,
            blocks: Vec::new(),
            alive: Vec::new(),
            incoming: Vec::new(),
        };
        region.analyze(func);
        region
    }

    #[inline]
    pub fn header(&self) -> BlockId {
        self.header
    }

    #[inline]
    pub fn exiting(&self) -> BlockId {
        self.exiting
    }

    /// Member blocks in discovery order, header first, exiting included.
    #[inline]
    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    /// Values defined in the region and used outside it, in program order.
    #[inline]
    pub fn alive(&self) -> &[InstId] {
        &self.alive
    }

    /// Values defined outside the region and used inside it.
    #[inline]
    pub fn incoming(&self) -> &[InstId] {
        &self.incoming
    }

    pub fn set_header(&mut self, header: BlockId) {
        self.header = header;
    }

    pub fn set_exiting(&mut self, exiting: BlockId) {
        self.exiting = exiting;
    }

    /// Refill the block list and recompute alive/incoming values.
    pub fn analyze(&mut self, func: &Function) {
        self.fill(func);
        let users = func.use_map();
        self.find_alive(func, &users);
        self.find_incoming(func);
    }

    /// Recompute the block list from the current header and exiting block.
    pub fn fill(&mut self, func: &Function) {
        self.blocks = reachable_until(func, self.header, self.exiting);
    }

    pub(crate) fn find_alive(&mut self, func: &Function, users: &UseMap) {
        let members: FxHashSet<BlockId> = self.blocks.iter().copied().collect();
        self.alive = self
            .instructions(func)
            .filter(|inst| {
                users.get(inst).is_some_and(|list| {
                    list.iter()
                        .any(|user| func.block_of(*user).is_some_and(|b| !members.contains(&b)))
                })
            })
            .collect();
    }

    pub(crate) fn find_incoming(&mut self, func: &Function) {
        let members: FxHashSet<BlockId> = self.blocks.iter().copied().collect();
        let mut seen = FxHashSet::default();
        let mut incoming = Vec::new();
        for inst in self.instructions(func) {
            for used in func.kind(inst).used_insts() {
                let outside = func.block_of(used).is_some_and(|b| !members.contains(&b));
                if outside && seen.insert(used) {
                    incoming.push(used);
                }
            }
        }
        self.incoming = incoming;
    }

    /// Instructions of the member blocks, block by block.
    pub fn instructions<'f>(&'f self, func: &'f Function) -> impl Iterator<Item = InstId> + 'f {
        self.blocks
            .iter()
            .flat_map(move |&block| func.block(block).insts().iter().copied())
    }

    #[inline]
    pub fn contains_block(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }

    /// Is `block` a member other than the header or exiting block?
    pub fn contains_block_internally(&self, block: BlockId) -> bool {
        block != self.header && block != self.exiting && self.contains_block(block)
    }

    /// The block control leaves the region through: the exiting block's
    /// single successor.
    pub fn exit(&self, func: &Function) -> Option<BlockId> {
        match func.successors(self.exiting).as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// The block control enters the region from: the header's unique
    /// predecessor outside the region. For a loop header this is the
    /// preheader, since the latches are members.
    pub fn predecessor(&self, func: &Function) -> Option<BlockId> {
        let outside: Vec<BlockId> = func
            .layout()
            .iter()
            .copied()
            .filter(|&b| !self.contains_block(b) && func.successors(b).contains(&self.header))
            .collect();
        match outside.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Header must dominate exiting; exiting must post-dominate header.
    pub fn check_bounds(&self, func: &Function, analyses: &FunctionAnalyses) -> Result<(), RegionError> {
        if !analyses.dom.dominates(self.header, self.exiting) {
            return Err(RegionError::HeaderDoesNotDominateExiting {
                function: func.name.clone(),
                header: func.block_label(self.header),
                exiting: func.block_label(self.exiting),
            });
        }
        if !analyses.pdom.post_dominates(self.exiting, self.header) {
            return Err(RegionError::ExitingDoesNotPostDominateHeader {
                function: func.name.clone(),
                header: func.block_label(self.header),
                exiting: func.block_label(self.exiting),
            });
        }
        Ok(())
    }
}

// ── Region discovery ────────────────────────────────────────────────

/// Header and exiting block of the region controlled by the branch
/// terminating `header`.
pub fn region_bounds(
    func: &Function,
    analyses: &FunctionAnalyses,
    header: BlockId,
) -> Result<(BlockId, BlockId), RegionError> {
    let Some(mut exiting) = analyses.pdom.immediate_post_dominator(header) else {
        return Err(RegionError::NoPostDominator {
            function: func.name.clone(),
            block: func.block_label(header),
        });
    };

    if analyses.loops.is_loop_header(header) {
        let lp = analyses.loops.loop_for(header);
        if lp.is_some() && lp == analyses.loops.loop_for(exiting) {
            let Some(exit) = lp.and_then(|id| analyses.loops.unique_exit_block(func, id)) else {
                return Err(RegionError::NoUniqueLoopExit {
                    function: func.name.clone(),
                    block: func.block_label(header),
                });
            };
            exiting = exit;
        }
    }

    Ok((header, exiting))
}

/// One region per divergent branch, then [`clean_up_regions`].
pub fn build_regions(
    func: &Function,
    analyses: &FunctionAnalyses,
    branches: &[InstId],
) -> Result<Vec<DivergentRegion>, RegionError> {
    let users = func.use_map();
    let mut regions = Vec::with_capacity(branches.len());
    for &branch in branches {
        let Some(block) = func.block_of(branch) else {
            continue;
        };
        let (header, exiting) = region_bounds(func, analyses, block)?;
        let mut region = DivergentRegion {
            header,
            exiting,
            blocks: Vec::new(),
            alive: Vec::new(),
            incoming: Vec::new(),
        };
        region.fill(func);
        region.find_alive(func, &users);
        region.find_incoming(func);
        regions.push(region);
    }
    Ok(clean_up_regions(regions, &analyses.dom))
}

/// Drop regions that repeat an earlier region's block set under a
/// dominating header.
pub fn clean_up_regions(regions: Vec<DivergentRegion>, dom: &DominatorTree) -> Vec<DivergentRegion> {
    let mut kept: Vec<DivergentRegion> = Vec::with_capacity(regions.len());
    for (idx, region) in regions.iter().enumerate() {
        let redundant = regions[..idx].iter().any(|earlier| {
            same_block_set(&region.blocks, &earlier.blocks) && dom.dominates(earlier.header, region.header)
        });
        if !redundant {
            kept.push(region.clone());
        }
    }
    kept
}

fn same_block_set(a: &[BlockId], b: &[BlockId]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

/// Indices of regions whose header is not strictly inside another region.
pub fn outermost_region_indices(regions: &[DivergentRegion]) -> Vec<usize> {
    (0..regions.len())
        .filter(|&idx| {
            let header = regions[idx].header;
            !regions
                .iter()
                .enumerate()
                .any(|(other, region)| other != idx && region.contains_block_internally(header))
        })
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
