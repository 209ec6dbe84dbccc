//! Kernel IR for the GPU coarsening passes.
//!
//! This crate provides:
//!
//! - **IR** ([`Module`], [`Function`], [`InstKind`], [`Value`]): an
//!   arena-based SSA representation of device code: basic blocks of
//!   instructions with explicit terminators and phi-nodes.
//!
//! - **Mutation primitives**: instruction insertion/cloning, use
//!   replacement, block splitting, successor retargeting and phi remapping
//!   on [`Function`], plus whole-region duplication in [`clone`].
//!
//! - **CFG analyses** ([`DominatorTree`], [`PostDominatorTree`],
//!   [`LoopInfo`]) bundled as [`FunctionAnalyses`].
//!
//! - **Kernel metadata** ([`AnnotationCache`]): which functions are kernel
//!   entry points.
//!
//! Modules round-trip through `serde`, and print as an LLVM-like listing via
//! `Display`.

pub mod annotations;
pub mod builder;
pub mod clone;
pub mod dominators;
pub mod function;
pub mod graph;
pub mod ir;
pub mod loops;
pub mod module;
mod printer;
pub mod verify;

pub use annotations::{AnnotationCache, KERNEL_KEY};
pub use builder::FunctionBuilder;
pub use clone::{clone_subgraph, SubgraphClone};
pub use dominators::{DominatorTree, PostDominatorTree};
pub use function::{Block, Function, Param, UseMap};
pub use ir::{
    AddressSpace, BinOp, BlockId, CastOp, CmpPred, GlobalId, Inst, InstId, InstKind, Type, Value,
};
pub use loops::{Loop, LoopId, LoopInfo};
pub use module::{Annotation, CallingConv, GlobalVar, Module, ModuleId, DEVICE_TRIPLE};
pub use printer::function_to_string;
pub use verify::{verify_function, VerifyError};

/// Dominance, post-dominance and loop structure of one function.
///
/// Any CFG edit invalidates all three; rebuild with
/// [`compute`](Self::compute) afterwards.
#[derive(Clone, Debug)]
pub struct FunctionAnalyses {
    pub dom: DominatorTree,
    pub pdom: PostDominatorTree,
    pub loops: LoopInfo,
}

impl FunctionAnalyses {
    pub fn compute(func: &Function) -> Self {
        let dom = DominatorTree::build(func);
        let pdom = PostDominatorTree::build(func);
        let loops = LoopInfo::compute(func, &dom);
        Self { dom, pdom, loops }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod test_helpers;
