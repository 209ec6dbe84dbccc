//! Natural loop detection and constant trip counts.
//!
//! A back edge is an edge `tail → header` where `header` dominates `tail`.
//! The natural loop of a header is the header plus every block that reaches
//! one of its back-edge tails without passing through the header. Loops
//! sharing a header are merged. Nesting follows from body containment.

use rustc_hash::FxHashSet;

use crate::dominators::DominatorTree;
use crate::function::Function;
use crate::graph::{compute_predecessors, compute_successors};
use crate::ir::{BinOp, BlockId, CmpPred, InstId, InstKind, Value};

/// Index of a loop within a [`LoopInfo`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoopId(u32);

impl LoopId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A natural loop.
#[derive(Clone, Debug)]
pub struct Loop {
    pub header: BlockId,
    /// Body blocks (header included), sorted by handle.
    pub blocks: Vec<BlockId>,
    /// Sources of the back edges.
    pub latches: Vec<BlockId>,
    /// Innermost strictly enclosing loop.
    pub parent: Option<LoopId>,
    /// Nesting depth; outermost loops have depth 1.
    pub depth: u32,
}

impl Loop {
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.binary_search(&block).is_ok()
    }
}

/// Loop forest of a function.
#[derive(Clone, Debug, Default)]
pub struct LoopInfo {
    loops: Vec<Loop>,
    /// Innermost loop per block slot.
    innermost: Vec<Option<LoopId>>,
}

impl LoopInfo {
    pub fn compute(func: &Function, dom: &DominatorTree) -> Self {
        let n = func.num_blocks();
        let succs = compute_successors(func);
        let preds = compute_predecessors(func);

        // header index → latch indices
        let mut headers: Vec<(usize, Vec<usize>)> = Vec::new();
        for &block in func.layout() {
            let tail = block.index();
            if !dom.is_reachable(block) {
                continue;
            }
            for &head in &succs[tail] {
                if dom.dominates(block_id(head), block) {
                    match headers.iter_mut().find(|(h, _)| *h == head) {
                        Some((_, latches)) => latches.push(tail),
                        None => headers.push((head, vec![tail])),
                    }
                }
            }
        }

        let mut loops: Vec<Loop> = headers
            .into_iter()
            .map(|(head, latches)| {
                let mut body = FxHashSet::default();
                body.insert(head);
                let mut stack: Vec<usize> = latches.clone();
                while let Some(node) = stack.pop() {
                    if body.insert(node) {
                        for &pred in &preds[node] {
                            if dom.is_reachable(block_id(pred)) {
                                stack.push(pred);
                            }
                        }
                    }
                }
                let mut blocks: Vec<BlockId> = body.into_iter().map(block_id).collect();
                blocks.sort_unstable();
                Loop {
                    header: block_id(head),
                    blocks,
                    latches: latches.into_iter().map(block_id).collect(),
                    parent: None,
                    depth: 1,
                }
            })
            .collect();

        // Outer loops first so parents get their depth before children.
        loops.sort_by(|a, b| b.blocks.len().cmp(&a.blocks.len()).then(a.header.cmp(&b.header)));

        for idx in 0..loops.len() {
            let header = loops[idx].header;
            let size = loops[idx].blocks.len();
            let parent = (0..idx)
                .rev()
                .find(|&outer| loops[outer].blocks.len() > size && loops[outer].contains(header));
            if let Some(outer) = parent {
                loops[idx].parent = Some(loop_id(outer));
                loops[idx].depth = loops[outer].depth + 1;
            }
        }

        let mut innermost = vec![None; n];
        for (idx, lp) in loops.iter().enumerate() {
            for block in &lp.blocks {
                // Later loops are never larger, so the last writer is innermost.
                innermost[block.index()] = Some(loop_id(idx));
            }
        }

        tracing::trace!(function = %func.name, loops = loops.len(), "computed loop forest");
        Self { loops, innermost }
    }

    pub fn loops(&self) -> &[Loop] {
        &self.loops
    }

    pub fn get(&self, id: LoopId) -> &Loop {
        &self.loops[id.index()]
    }

    /// Innermost loop containing `block`.
    pub fn loop_for(&self, block: BlockId) -> Option<LoopId> {
        self.innermost.get(block.index()).copied().flatten()
    }

    pub fn is_loop_header(&self, block: BlockId) -> bool {
        self.loop_for(block)
            .is_some_and(|id| self.loops[id.index()].header == block)
    }

    /// Loop nesting depth of `block` (0 outside any loop).
    pub fn depth(&self, block: BlockId) -> u32 {
        self.loop_for(block).map_or(0, |id| self.loops[id.index()].depth)
    }

    /// Loops enclosing `block`, innermost first.
    pub fn enclosing(&self, block: BlockId) -> Vec<LoopId> {
        let mut chain = Vec::new();
        let mut current = self.loop_for(block);
        while let Some(id) = current {
            chain.push(id);
            current = self.loops[id.index()].parent;
        }
        chain
    }

    /// Blocks outside the loop that are targets of edges leaving it.
    pub fn exit_blocks(&self, func: &Function, id: LoopId) -> Vec<BlockId> {
        let lp = &self.loops[id.index()];
        let mut exits = Vec::new();
        for &block in &lp.blocks {
            for succ in func.successors(block) {
                if !lp.contains(succ) && !exits.contains(&succ) {
                    exits.push(succ);
                }
            }
        }
        exits
    }

    /// The loop's exit block, if there is exactly one.
    pub fn unique_exit_block(&self, func: &Function, id: LoopId) -> Option<BlockId> {
        match self.exit_blocks(func, id).as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// The single out-of-loop predecessor of the header, if any.
    pub fn preheader(&self, func: &Function, id: LoopId) -> Option<BlockId> {
        let lp = &self.loops[id.index()];
        let preds = compute_predecessors(func);
        let outside: Vec<usize> = preds[lp.header.index()]
            .iter()
            .copied()
            .filter(|&p| !lp.contains(block_id(p)))
            .collect();
        match outside.as_slice() {
            [only] => Some(block_id(*only)),
            _ => None,
        }
    }

    /// Constant trip count of a canonical counted loop.
    ///
    /// Recognizes a header phi `i = [start, preheader], [i ± step, latch]`
    /// with constant `start`/`step`, exited by a conditional branch comparing
    /// `i` (in the header) or `i ± step` (in the latch) against a constant.
    pub fn trip_count(&self, func: &Function, id: LoopId) -> Option<u64> {
        let lp = &self.loops[id.index()];
        let [latch] = lp.latches.as_slice() else {
            return None;
        };
        let preheader = self.preheader(func, id)?;

        for phi in func.phis(lp.header) {
            let InstKind::Phi { incoming } = func.kind(phi) else {
                continue;
            };
            let Some(start) = incoming
                .iter()
                .find(|(_, b)| *b == preheader)
                .and_then(|(v, _)| v.as_const())
            else {
                continue;
            };
            let Some(next) = incoming
                .iter()
                .find(|(_, b)| b == latch)
                .and_then(|(v, _)| v.as_inst())
            else {
                continue;
            };
            let Some(step) = induction_step(func, phi, next) else {
                continue;
            };

            // Header test on `i`, or latch test on `i + step`.
            let candidates = [
                (lp.header, phi, start, 0),
                (*latch, next, start.checked_add(step)?, 1),
            ];
            for (block, tested, first, extra) in candidates {
                let Some((pred, bound, continue_on)) = exit_test(func, lp, block, tested) else {
                    continue;
                };
                let pred = if continue_on { pred } else { pred.inverse() };
                return count_iterations(first, step, pred, bound).map(|count| count + extra);
            }
        }
        None
    }
}

/// `next = i + c` or `i - c` for constant `c`: the signed step.
fn induction_step(func: &Function, phi: InstId, next: InstId) -> Option<i64> {
    let InstKind::Binary { op, lhs, rhs } = func.kind(next) else {
        return None;
    };
    match (op, lhs, rhs) {
        (BinOp::Add, Value::Inst(i), Value::Const(c)) | (BinOp::Add, Value::Const(c), Value::Inst(i))
            if *i == phi =>
        {
            Some(*c)
        }
        (BinOp::Sub, Value::Inst(i), Value::Const(c)) if *i == phi => Some(-*c),
        _ => None,
    }
}

/// If `block` ends in `condbr (cmp pred tested, bound)` with one arm leaving
/// the loop, return the predicate, the bound, and whether the loop continues
/// when the comparison is true.
fn exit_test(func: &Function, lp: &Loop, block: BlockId, tested: InstId) -> Option<(CmpPred, i64, bool)> {
    let term = func.terminator(block)?;
    let InstKind::CondBr {
        cond: Value::Inst(cond),
        then_block,
        else_block,
    } = func.kind(term)
    else {
        return None;
    };
    let InstKind::Cmp { pred, lhs, rhs } = func.kind(*cond) else {
        return None;
    };
    let (pred, bound) = match (lhs, rhs) {
        (Value::Inst(v), Value::Const(c)) if *v == tested => (*pred, *c),
        _ => return None,
    };
    match (lp.contains(*then_block), lp.contains(*else_block)) {
        (true, false) => Some((pred, bound, true)),
        (false, true) => Some((pred, bound, false)),
        _ => None,
    }
}

/// Number of values `first, first + step, …` satisfying `v pred bound`
/// before the first one that fails.
fn count_iterations(first: i64, step: i64, pred: CmpPred, bound: i64) -> Option<u64> {
    if pred.is_unsigned() && (first < 0 || bound < 0) {
        return None;
    }
    let span = bound.checked_sub(first)?;
    let count = match pred {
        CmpPred::Slt | CmpPred::Ult if step > 0 => {
            if span <= 0 {
                0
            } else {
                (span + step - 1) / step
            }
        }
        CmpPred::Sle | CmpPred::Ule if step > 0 => {
            if span < 0 {
                0
            } else {
                span / step + 1
            }
        }
        CmpPred::Sgt | CmpPred::Ugt if step < 0 => {
            if span >= 0 {
                0
            } else {
                (-span + (-step) - 1) / (-step)
            }
        }
        CmpPred::Sge | CmpPred::Uge if step < 0 => {
            if span > 0 {
                0
            } else {
                (-span) / (-step) + 1
            }
        }
        CmpPred::Ne if step != 0 && span % step == 0 && span / step >= 0 => span / step,
        _ => return None,
    };
    u64::try_from(count).ok()
}

fn block_id(idx: usize) -> BlockId {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "kernel block counts fit in u32"
    )]
    let raw = idx as u32;
    BlockId::new(raw)
}

fn loop_id(idx: usize) -> LoopId {
    #[expect(clippy::cast_possible_truncation, reason = "loop counts fit in u32")]
    let raw = idx as u32;
    LoopId(raw)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
