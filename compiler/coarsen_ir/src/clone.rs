//! Subgraph cloning.
//!
//! [`clone_subgraph`] duplicates a set of blocks, renaming every copied
//! instruction and block with a suffix. References between copied
//! instructions and copied blocks are rewired to the copies; references to
//! anything outside the set are left pointing at the originals. The caller
//! is responsible for splicing the copy into the CFG.

use rustc_hash::FxHashMap;

use crate::function::Function;
use crate::ir::{BlockId, InstId, InstKind, Value};

/// Result of [`clone_subgraph`]: original → copy maps.
#[derive(Clone, Debug, Default)]
pub struct SubgraphClone {
    pub block_map: FxHashMap<BlockId, BlockId>,
    pub value_map: FxHashMap<InstId, InstId>,
    /// Copied blocks, in the order of the input block list.
    pub blocks: Vec<BlockId>,
}

impl SubgraphClone {
    #[inline]
    pub fn block(&self, original: BlockId) -> Option<BlockId> {
        self.block_map.get(&original).copied()
    }

    #[inline]
    pub fn value(&self, original: InstId) -> Option<InstId> {
        self.value_map.get(&original).copied()
    }
}

/// Append `suffix` to a name, leaving anonymous values anonymous.
pub fn suffixed(name: &str, suffix: &str) -> String {
    if name.is_empty() {
        String::new()
    } else {
        format!("{name}{suffix}")
    }
}

/// Clone `blocks` into fresh blocks at the end of the layout.
pub fn clone_subgraph(func: &mut Function, blocks: &[BlockId], suffix: &str) -> SubgraphClone {
    let mut result = SubgraphClone::default();

    for &block in blocks {
        let name = suffixed(&func.block(block).name, suffix);
        let copy = func.add_block(name);
        result.block_map.insert(block, copy);
        result.blocks.push(copy);

        let originals: Vec<InstId> = func.block(block).insts().to_vec();
        for inst in originals {
            let name = suffixed(&func.inst(inst).name, suffix);
            let kind = func.kind(inst).clone();
            let ty = func.inst(inst).ty;
            let cloned = func.append(copy, kind, ty, name);
            result.value_map.insert(inst, cloned);
        }
    }

    for &copy in &result.blocks {
        let insts: Vec<InstId> = func.block(copy).insts().to_vec();
        for inst in insts {
            let kind = &mut func.inst_mut(inst).kind;
            for operand in kind.operands_mut() {
                if let Value::Inst(original) = *operand {
                    if let Some(&mapped) = result.value_map.get(&original) {
                        *operand = Value::Inst(mapped);
                    }
                }
            }
            remap_blocks(kind, &result.block_map);
        }
    }

    tracing::trace!(
        function = %func.name,
        blocks = result.blocks.len(),
        insts = result.value_map.len(),
        suffix,
        "cloned subgraph"
    );
    result
}

fn remap_blocks(kind: &mut InstKind, block_map: &FxHashMap<BlockId, BlockId>) {
    match kind {
        InstKind::Br { target } => {
            if let Some(&new) = block_map.get(&*target) {
                *target = new;
            }
        }
        InstKind::CondBr {
            then_block,
            else_block,
            ..
        } => {
            if let Some(&new) = block_map.get(&*then_block) {
                *then_block = new;
            }
            if let Some(&new) = block_map.get(&*else_block) {
                *else_block = new;
            }
        }
        InstKind::Phi { incoming } => {
            for (_, block) in incoming.iter_mut() {
                if let Some(&new) = block_map.get(&*block) {
                    *block = new;
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
