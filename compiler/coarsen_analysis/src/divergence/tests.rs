use super::*;

use coarsen_ir::{FunctionBuilder, Type};
use pretty_assertions::assert_eq;

use crate::grid::{DimensionSelector, GridVar};
use crate::test_helpers::{b, divergent_loop, read, thread_diamond, uniform_diamond};

fn ids(raw: &[u32]) -> Vec<InstId> {
    raw.iter().copied().map(InstId::new).collect()
}

fn run(func: &Function, level: Level) -> DivergenceAnalysis {
    run_with_shared(func, level, &FxHashSet::default())
}

fn run_with_shared(func: &Function, level: Level, shared: &FxHashSet<GlobalId>) -> DivergenceAnalysis {
    let analyses = FunctionAnalyses::compute(func);
    let grid = GridAnalysis::compute(func, DimensionSelector::Only(Dimension::X));
    DivergenceAnalysis::analyze(func, &analyses, &grid, shared, level, Dimension::X).unwrap()
}

#[test]
fn branch_on_thread_id_diverges_join_phi() {
    let func = thread_diamond();
    let div = run(&func, Level::Thread);

    // tid, c, br, then y from `else`, x from `then`, m, p, store. Reverse
    // post-order visits `else` before `then`.
    assert_eq!(div.instructions(), ids(&[0, 1, 2, 5, 3, 7, 8, 9]).as_slice());
    assert_eq!(div.branches(), &[InstId::new(2)]);
    assert_eq!(div.regions().len(), 1);
    assert_eq!(div.regions()[0].header(), b(0));
    assert_eq!(div.regions()[0].exiting(), b(3));
    assert!(!div.is_divergent(InstId::new(4)));
    assert!(!div.is_divergent(InstId::new(10)));
}

#[test]
fn everything_inside_the_region_is_not_outermost() {
    let func = thread_diamond();
    let div = run(&func, Level::Thread);
    assert!(div.outermost_instructions().is_empty());
    assert_eq!(div.outermost_regions().len(), 1);
}

#[test]
fn uniform_branch_has_no_region() {
    let func = uniform_diamond();
    let div = run(&func, Level::Thread);

    assert!(div.branches().is_empty());
    assert!(div.regions().is_empty());
    assert!(!div.is_divergent(InstId::new(7)));
    // tid itself is a grid read and is left to the grid rewrite.
    assert_eq!(div.outermost_instructions(), ids(&[8, 9, 10]).as_slice());
}

#[test]
fn levels_are_independent() {
    let func = thread_diamond();
    let block = run(&func, Level::Block);
    assert!(block.instructions().is_empty());
    assert_eq!(block.level(), Level::Block);
}

#[test]
fn divergent_loop_bound_makes_a_loop_region() {
    let func = divergent_loop();
    let div = run(&func, Level::Thread);

    assert_eq!(div.instructions(), ids(&[0, 3, 4]).as_slice());
    let regions = div.outermost_regions();
    assert_eq!(regions.len(), 1);
    assert_eq!((regions[0].header(), regions[0].exiting()), (b(1), b(3)));
    assert!(div.outermost_instructions().is_empty());
}

/// Each thread sums `0..tid`; the sum is read after the loop.
fn triangle() -> Function {
    let mut fb = FunctionBuilder::kernel("triangle", vec![]);
    let entry = fb.block("entry");
    let header = fb.block("header");
    let body = fb.block("body");
    let exit = fb.block("exit");

    fb.switch_to(entry);
    let tid = read(&mut fb, GridVar::ThreadId, "tid");
    fb.br(header);

    fb.switch_to(header);
    let i = fb.phi(Type::I32, vec![(Value::Const(0), entry)], "i");
    let acc = fb.phi(Type::I32, vec![(Value::Const(0), entry)], "acc");
    let c = fb.icmp(coarsen_ir::CmpPred::Slt, i, tid, "c");
    fb.cond_br(c, body, exit);

    fb.switch_to(body);
    let sum = fb.add(acc, i, "sum");
    let next = fb.add(i, Value::Const(1), "next");
    fb.br(header);
    fb.add_incoming(i, next, body);
    fb.add_incoming(acc, sum, body);

    fb.switch_to(exit);
    fb.store(Value::Global(GlobalId::new(0)), acc);
    fb.ret(None);
    fb.finish()
}

#[test]
fn values_read_after_a_divergent_loop_diverge() {
    let func = triangle();
    let div = run(&func, Level::Thread);

    // tid, acc, c, br, sum (feeding acc) and the store of the final sum.
    let mut divergent = div.instructions().to_vec();
    divergent.sort_unstable();
    assert_eq!(divergent, ids(&[0, 3, 4, 5, 6, 9]));
    // `i` never leaves the loop.
    assert!(!div.is_divergent(InstId::new(2)));
    // The exit block closes the loop region, so the store is inside it.
    assert!(div.outermost_instructions().is_empty());
}

/// ```text
/// %bid = ctaid.x; %p = gep @tile, %bid; store %p, 1
/// %q = gep @tile, 0; %v = load %q; store %out, %v; ret
/// ```
fn shared_tile() -> Function {
    let mut fb = FunctionBuilder::kernel(
        "tile",
        vec![coarsen_ir::Param::new("out", Type::Ptr(coarsen_ir::AddressSpace::Global))],
    );
    let bid = read(&mut fb, GridVar::BlockId, "bid");
    let p = fb.gep(Value::Global(GlobalId::new(0)), bid, "p");
    fb.store(p, Value::Const(1));
    let q = fb.gep(Value::Global(GlobalId::new(0)), Value::Const(0), "q");
    let v = fb.load(Type::I32, q, "v");
    fb.store(Value::Arg(0), v);
    fb.ret(None);
    fb.finish()
}

#[test]
fn shared_memory_spreads_divergence_at_block_level() {
    let func = shared_tile();
    let shared: FxHashSet<GlobalId> = [GlobalId::new(0)].into_iter().collect();
    let div = run_with_shared(&func, Level::Block, &shared);

    // bid, p, store, q, v, store out
    assert_eq!(div.instructions(), ids(&[0, 1, 2, 3, 4, 5]).as_slice());
}

#[test]
fn non_shared_globals_do_not_spread() {
    let func = shared_tile();
    let div = run(&func, Level::Block);
    assert_eq!(div.instructions(), ids(&[0, 1, 2]).as_slice());
}

#[test]
fn analysis_is_deterministic() {
    let func = thread_diamond();
    let first = run(&func, Level::Thread);
    let second = run(&func, Level::Thread);
    assert_eq!(first.instructions(), second.instructions());
    assert_eq!(first.regions(), second.regions());
}
