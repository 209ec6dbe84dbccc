use super::*;

use coarsen_analysis::{DimensionSelector, GridVar};
use coarsen_ir::verify_function;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::test_helpers::{i, straight_line};

fn grid(func: &Function) -> GridAnalysis {
    GridAnalysis::compute(func, DimensionSelector::Only(Dimension::X))
}

/// Evaluate a chain of integer arithmetic rooted at grid reads, with every
/// identity read returning `tid`.
fn eval(func: &Function, value: Value, tid: i64) -> i64 {
    match value {
        Value::Const(c) => c,
        Value::Inst(id) => match func.kind(id) {
            InstKind::Call { .. } => tid,
            InstKind::Binary { op, lhs, rhs } => {
                let (l, r) = (eval(func, *lhs, tid), eval(func, *rhs, tid));
                match op {
                    BinOp::Add => l + r,
                    BinOp::Mul => l * r,
                    BinOp::UDiv => l / r,
                    BinOp::URem => l % r,
                    other => panic!("unexpected operator {other:?}"),
                }
            }
            other => panic!("unexpected instruction {other:?}"),
        },
        other => panic!("unexpected operand {other:?}"),
    }
}

/// Logical identities served by physical thread `tid`; `%tid.base` is i11.
fn logical_ids(func: &Function, map: &CoarseningMap, tid: i64) -> Vec<i64> {
    let base = i(11);
    std::iter::once(base)
        .chain(map.get(base).unwrap().iter().copied())
        .map(|id| eval(func, Value::Inst(id), tid))
        .collect()
}

#[test]
fn rejects_degenerate_parameters() {
    let mut func = straight_line();
    let grid = grid(&func);
    assert_eq!(
        scale_kernel_grid(&mut func, &grid, Level::Thread, Dimension::X, 1, 1).unwrap_err(),
        KernelError::InvalidFactor(1)
    );
    assert_eq!(
        scale_kernel_grid(&mut func, &grid, Level::Thread, Dimension::X, 2, 0).unwrap_err(),
        KernelError::InvalidStride
    );
    // Nothing was rewritten.
    assert_eq!(func.num_inst_slots(), 7);
}

#[test]
fn extent_reads_are_scaled() {
    let mut func = straight_line();
    let grid = grid(&func);
    scale_kernel_grid(&mut func, &grid, Level::Thread, Dimension::X, 4, 1).unwrap();

    let scaled = i(7);
    assert_eq!(func.inst(scaled).name, "ntid.scaled");
    assert_eq!(
        func.kind(scaled),
        &InstKind::Binary {
            op: BinOp::Mul,
            lhs: Value::Inst(i(1)),
            rhs: Value::Const(4),
        }
    );
    // `w = v + ntid` now reads the scaled extent.
    assert_eq!(func.kind(i(3)).used_insts().as_slice(), &[i(2), scaled]);
}

#[test]
fn identity_reads_are_rebased() {
    let mut func = straight_line();
    let grid = grid(&func);
    let map = scale_kernel_grid(&mut func, &grid, Level::Thread, Dimension::X, 4, 1).unwrap();

    let names: Vec<&str> = func.block(func.entry()).insts()[..8]
        .iter()
        .map(|&id| func.inst(id).name.as_str())
        .collect();
    assert_eq!(
        names,
        vec![
            "tid", "tid.div", "tid.mul", "tid.rem", "tid.base", "tid.cf2", "tid.cf3", "tid.cf4"
        ]
    );

    // Former readers of the identity read `base`; the rewrite itself keeps
    // reading the physical identity.
    assert_eq!(func.users(i(0)), vec![i(8), i(10)]);
    assert_eq!(func.kind(i(2)).used_insts().as_slice(), &[i(11)]);
    assert_eq!(func.kind(i(4)).used_insts().as_slice(), &[i(11)]);

    // The sibling list is reachable through both handles.
    assert_eq!(map.len(), 2);
    assert_eq!(map.get(i(0)), map.get(i(11)));
    assert_eq!(map.get(i(0)).unwrap(), &[i(12), i(13), i(14)]);
    assert!(verify_function(&func).is_ok());
}

#[test]
fn unit_stride_packs_replicas_contiguously() {
    let mut func = straight_line();
    let grid = grid(&func);
    let map = scale_kernel_grid(&mut func, &grid, Level::Thread, Dimension::X, 4, 1).unwrap();

    assert_eq!(logical_ids(&func, &map, 5), vec![20, 21, 22, 23]);
    assert_eq!(logical_ids(&func, &map, 0), vec![0, 1, 2, 3]);
}

#[test]
fn strided_replicas_interleave() {
    let mut func = straight_line();
    let grid = grid(&func);
    let map = scale_kernel_grid(&mut func, &grid, Level::Thread, Dimension::X, 2, 4).unwrap();

    // Threads 0..4 cover 0..4 and 4..8; thread 5 starts the next span.
    assert_eq!(logical_ids(&func, &map, 1), vec![1, 5]);
    assert_eq!(logical_ids(&func, &map, 5), vec![9, 13]);
}

#[test]
fn other_level_is_untouched() {
    let mut func = straight_line();
    let grid = grid(&func);
    let map = scale_kernel_grid(&mut func, &grid, Level::Block, Dimension::X, 2, 1).unwrap();

    assert!(map.is_empty());
    assert_eq!(grid.count(GridVar::BlockId), 0);
    assert_eq!(func.num_inst_slots(), 7);
}

proptest! {
    /// Every logical identity in `0..threads * factor` is produced by
    /// exactly one physical thread and replica.
    #[test]
    fn logical_identities_tile_the_grid(
        factor_log in 1u32..5,
        stride_log in 0u32..4,
        spans in 1i64..4,
    ) {
        let (factor, stride) = (1 << factor_log, 1 << stride_log);
        let mut func = straight_line();
        let grid = grid(&func);
        let map = scale_kernel_grid(&mut func, &grid, Level::Thread, Dimension::X, factor, stride)
            .unwrap();

        let threads = spans * i64::from(stride);
        let mut seen: Vec<i64> = (0..threads)
            .flat_map(|tid| logical_ids(&func, &map, tid))
            .collect();
        seen.sort_unstable();
        let expected: Vec<i64> = (0..threads * i64::from(factor)).collect();
        prop_assert_eq!(seen, expected);
    }
}
