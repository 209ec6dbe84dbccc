//! Divergent region normalization.
//!
//! Replication splices copies of a region between its exiting block and
//! the block after it, so every region is first brought into a shape where
//! that splice is clean:
//!
//! - the header holds nothing but the divergent branch (non-loop headers are
//!   split just before their terminator);
//! - the exiting block holds nothing but phi-nodes and an unconditional
//!   branch (it is split at its first non-phi);
//! - the header dominates the exiting block. When the exiting block is also
//!   reachable from outside the region, a fresh `<exiting>.extracted` block
//!   takes over the in-region edges and the in-region halves of the phis.
//!
//! Regions are rebuilt from scratch by the divergence analysis afterwards;
//! the ones updated here only guide the splitting.

use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use coarsen_analysis::{region_bounds, DivergentRegion};
use coarsen_ir::clone::suffixed;
use coarsen_ir::{BlockId, DominatorTree, Function, FunctionAnalyses, InstKind, Type, Value};

use crate::error::KernelError;

/// Normalize every region of `regions`, in order.
pub fn extract_regions(func: &mut Function, regions: &mut [DivergentRegion]) -> Result<(), KernelError> {
    for idx in 0..regions.len() {
        let analyses = FunctionAnalyses::compute(func);
        let (header, exiting) = region_bounds(func, &analyses, regions[idx].header())?;

        let new_header = if analyses.loops.is_loop_header(header) {
            header
        } else {
            let at = func.block(header).insts().len().saturating_sub(1);
            let name = suffixed(&func.block_label(header), ".split");
            func.split_block(header, at, name)
        };

        let at = func.first_non_phi(exiting);
        let name = suffixed(&func.block_label(exiting), ".split");
        let new_exiting = func.split_block(exiting, at, name);

        regions[idx].set_header(new_header);
        regions[idx].set_exiting(exiting);
        for region in regions.iter_mut() {
            if region.header() == exiting {
                region.set_header(new_exiting);
            }
        }

        regions[idx].fill(func);
        isolate_region(func, &mut regions[idx]);
        regions[idx].analyze(func);

        trace!(
            header = %func.block_label(regions[idx].header()),
            exiting = %func.block_label(regions[idx].exiting()),
            blocks = regions[idx].blocks().len(),
            "extracted region"
        );
    }

    debug!(function = %func.name, regions = regions.len(), "normalized divergent regions");
    Ok(())
}

/// Give the region a private exiting block when its header does not
/// dominate the current one.
fn isolate_region(func: &mut Function, region: &mut DivergentRegion) {
    let exiting = region.exiting();
    let dom = DominatorTree::build(func);
    if dom.dominates(region.header(), exiting) {
        return;
    }

    let extracted = func.add_block_before(exiting, suffixed(&func.block_label(exiting), ".extracted"));
    let branch = func.append(extracted, InstKind::Br { target: exiting }, Type::Void, "");

    let members: FxHashSet<BlockId> = region.blocks().iter().copied().collect();
    for &block in region.blocks() {
        func.replace_successor(block, exiting, extracted);
    }

    for phi in func.phis(exiting) {
        let InstKind::Phi { incoming } = func.kind(phi).clone() else {
            continue;
        };
        let (inside, mut outside): (Vec<_>, Vec<_>) =
            incoming.into_iter().partition(|(_, block)| members.contains(block));
        let ty = func.inst(phi).ty;
        let name = func.inst(phi).name.clone();

        let new_phi = func.insert_before(
            branch,
            InstKind::Phi { incoming: inside },
            ty,
            suffixed(&name, ".new_exiting"),
        );
        outside.push((Value::Inst(new_phi), extracted));
        let exit_phi = func.insert_before(
            phi,
            InstKind::Phi { incoming: outside },
            ty,
            suffixed(&name, ".old_exiting"),
        );

        func.replace_all_uses_with(phi, Value::Inst(exit_phi));
        func.erase(phi);
    }

    debug!(
        exiting = %func.block_label(exiting),
        "isolated region exit"
    );
    region.set_exiting(extracted);
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
