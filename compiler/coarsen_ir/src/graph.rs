//! Shared CFG traversal utilities.
//!
//! Dominance, post-dominance, loop detection and region filling all walk the
//! same successor/predecessor relation; it lives here so none of those
//! analyses depend on each other for it.

use rustc_hash::FxHashSet;

use crate::function::Function;
use crate::ir::BlockId;

/// Successor block indices for every block slot (deduplicated).
pub fn compute_successors(func: &Function) -> Vec<Vec<usize>> {
    (0..func.num_blocks())
        .map(|idx| {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "kernel block counts fit in u32"
            )]
            let block = BlockId::new(idx as u32);
            let mut seen = FxHashSet::default();
            func.successors(block)
                .into_iter()
                .map(BlockId::index)
                .filter(|succ| seen.insert(*succ))
                .collect()
        })
        .collect()
}

/// Predecessor block indices for every block slot (deduplicated).
pub fn compute_predecessors(func: &Function) -> Vec<Vec<usize>> {
    invert(&compute_successors(func))
}

/// Reverse an adjacency list.
pub(crate) fn invert(edges: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut inverted = vec![Vec::new(); edges.len()];
    for (from, targets) in edges.iter().enumerate() {
        for &to in targets {
            inverted[to].push(from);
        }
    }
    inverted
}

/// Postorder over `succs` starting at `root`.
///
/// Iterative DFS with an explicit stack; only reachable nodes are emitted.
pub(crate) fn postorder(succs: &[Vec<usize>], root: usize) -> Vec<usize> {
    let n = succs.len();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);

    // (node, next successor index to visit)
    let mut stack: Vec<(usize, usize)> = Vec::new();
    if root < n {
        visited[root] = true;
        stack.push((root, 0));
    }

    while let Some(&mut (node, ref mut next)) = stack.last_mut() {
        if let Some(&succ) = succs[node].get(*next) {
            *next += 1;
            if !visited[succ] {
                visited[succ] = true;
                stack.push((succ, 0));
            }
        } else {
            order.push(node);
            stack.pop();
        }
    }

    order
}

/// Reverse postorder of the CFG from the entry block.
pub fn reverse_postorder(func: &Function) -> Vec<BlockId> {
    if func.is_declaration() {
        return Vec::new();
    }
    let mut order = postorder(&compute_successors(func), func.entry().index());
    order.reverse();
    order
        .into_iter()
        .map(|idx| {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "kernel block counts fit in u32"
            )]
            let raw = idx as u32;
            BlockId::new(raw)
        })
        .collect()
}

/// Blocks reachable from `start` without expanding past `stop`.
///
/// `stop` itself is included when reached. Blocks are returned in discovery
/// order, starting with `start`.
pub fn reachable_until(func: &Function, start: BlockId, stop: BlockId) -> Vec<BlockId> {
    let mut seen = FxHashSet::default();
    let mut result = Vec::new();
    let mut stack = vec![start];
    while let Some(block) = stack.pop() {
        if !seen.insert(block) {
            continue;
        }
        result.push(block);
        if block == stop {
            continue;
        }
        for succ in func.successors(block).into_iter().rev() {
            if !seen.contains(&succ) {
                stack.push(succ);
            }
        }
    }
    result
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
