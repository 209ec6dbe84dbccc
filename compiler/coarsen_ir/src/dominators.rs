//! Dominator and post-dominator trees.
//!
//! Both trees use the Cooper-Harvey-Kennedy iterative algorithm over a
//! reverse postorder. The post-dominator tree runs the same algorithm on the
//! reversed CFG, rooted at a virtual exit node that every returning (or
//! otherwise successor-less) block flows into.
//!
//! Reference: Cooper, Harvey, Kennedy, "A Simple, Fast Dominance Algorithm" (2001)

use crate::function::Function;
use crate::graph::{compute_successors, invert, postorder};
use crate::ir::{BlockId, InstId};

/// Immediate dominators of the graph `succs`/`preds` rooted at `root`.
///
/// `idom[root] == Some(root)`; unreachable nodes stay `None`.
fn compute_idoms(succs: &[Vec<usize>], preds: &[Vec<usize>], root: usize) -> Vec<Option<usize>> {
    let n = succs.len();
    let mut rpo = postorder(succs, root);
    rpo.reverse();

    let mut rpo_pos = vec![usize::MAX; n];
    for (pos, &node) in rpo.iter().enumerate() {
        rpo_pos[node] = pos;
    }

    let mut idom: Vec<Option<usize>> = vec![None; n];
    if root >= n {
        return idom;
    }
    idom[root] = Some(root);

    let mut changed = true;
    while changed {
        changed = false;
        for &node in rpo.iter().skip(1) {
            let mut processed = preds[node].iter().copied().filter(|&p| idom[p].is_some());
            let Some(first) = processed.next() else {
                continue;
            };
            let new_idom = processed.fold(first, |acc, pred| intersect(pred, acc, &idom, &rpo_pos));
            if idom[node] != Some(new_idom) {
                idom[node] = Some(new_idom);
                changed = true;
            }
        }
    }

    idom
}

/// CHK intersect: walk two fingers upward until they meet.
fn intersect(mut a: usize, mut b: usize, idom: &[Option<usize>], rpo_pos: &[usize]) -> usize {
    while a != b {
        while rpo_pos[a] > rpo_pos[b] {
            let Some(next) = idom[a] else {
                debug_assert!(false, "intersect: broken idom chain at {a}");
                return a;
            };
            a = next;
        }
        while rpo_pos[b] > rpo_pos[a] {
            let Some(next) = idom[b] else {
                debug_assert!(false, "intersect: broken idom chain at {b}");
                return b;
            };
            b = next;
        }
    }
    a
}

/// Walk the idom chain from `b` looking for `a`.
fn chain_contains(idom: &[Option<usize>], a: usize, b: usize) -> bool {
    let mut current = b;
    loop {
        if current == a {
            return true;
        }
        match idom.get(current).copied().flatten() {
            Some(parent) if parent != current => current = parent,
            _ => return false,
        }
    }
}

fn block_id(idx: usize) -> BlockId {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "kernel block counts fit in u32"
    )]
    let raw = idx as u32;
    BlockId::new(raw)
}

// ── Dominators ──────────────────────────────────────────────────────

/// Forward dominator tree.
#[derive(Clone, Debug)]
pub struct DominatorTree {
    /// Immediate dominator per block slot. `idom[entry] == Some(entry)`.
    idom: Vec<Option<usize>>,
}

impl DominatorTree {
    pub fn build(func: &Function) -> Self {
        if func.is_declaration() {
            return Self { idom: Vec::new() };
        }
        let succs = compute_successors(func);
        let preds = invert(&succs);
        Self {
            idom: compute_idoms(&succs, &preds, func.entry().index()),
        }
    }

    /// Does block `a` dominate block `b`? A block dominates itself.
    ///
    /// Unreachable blocks are dominated only by themselves.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        a == b || chain_contains(&self.idom, a.index(), b.index())
    }

    /// Does instruction `a` (in `func`) dominate instruction `b`?
    pub fn inst_dominates(&self, func: &Function, a: InstId, b: InstId) -> bool {
        match (func.position(a), func.position(b)) {
            (Some((block_a, pos_a)), Some((block_b, pos_b))) => {
                if block_a == block_b {
                    pos_a <= pos_b
                } else {
                    self.dominates(block_a, block_b)
                }
            }
            _ => false,
        }
    }

    /// Immediate dominator of `block` (`None` for the entry and unreachable blocks).
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        match self.idom.get(block.index()).copied().flatten() {
            Some(parent) if parent != block.index() => Some(block_id(parent)),
            _ => None,
        }
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.idom.get(block.index()).copied().flatten().is_some()
    }
}

// ── Post-dominators ─────────────────────────────────────────────────

/// Post-dominator tree over the reversed CFG with a virtual exit node.
#[derive(Clone, Debug)]
pub struct PostDominatorTree {
    /// Immediate post-dominator per block slot; index `virtual_exit` is the
    /// synthetic root.
    ipdom: Vec<Option<usize>>,
    virtual_exit: usize,
}

impl PostDominatorTree {
    pub fn build(func: &Function) -> Self {
        let n = func.num_blocks();
        let forward = compute_successors(func);
        let virtual_exit = n;

        // Reverse CFG: virtual exit → exit blocks, block → its predecessors.
        let mut reverse_succs = invert(&forward);
        let reachable = {
            let mut seen = vec![false; n];
            if !func.is_declaration() {
                for idx in postorder(&forward, func.entry().index()) {
                    seen[idx] = true;
                }
            }
            seen
        };
        let exits: Vec<usize> = (0..n)
            .filter(|&idx| reachable[idx] && forward[idx].is_empty())
            .collect();
        reverse_succs.push(exits);
        let reverse_preds = invert(&reverse_succs);

        Self {
            ipdom: compute_idoms(&reverse_succs, &reverse_preds, virtual_exit),
            virtual_exit,
        }
    }

    /// Does block `a` post-dominate block `b`? A block post-dominates itself.
    pub fn post_dominates(&self, a: BlockId, b: BlockId) -> bool {
        a == b || chain_contains(&self.ipdom, a.index(), b.index())
    }

    /// The nearest real block every path from `block` to an exit passes
    /// through, or `None` when only the virtual exit post-dominates it.
    pub fn immediate_post_dominator(&self, block: BlockId) -> Option<BlockId> {
        match self.ipdom.get(block.index()).copied().flatten() {
            Some(parent) if parent != self.virtual_exit && parent != block.index() => {
                Some(block_id(parent))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
