use super::*;

use coarsen_ir::{CmpPred, FunctionBuilder, Value};
use pretty_assertions::assert_eq;

use crate::test_helpers::{bypass, divergent_loop, straight_line, thread_diamond, tid};

fn params(level: Level, factor: u32) -> CoarseningParams {
    CoarseningParams {
        level,
        dim: Dimension::X,
        factor,
        stride: 1,
    }
}

fn run(func: &Function, factor: u32) -> KernelOutcome {
    coarsen_kernel(func, &FxHashSet::default(), &params(Level::Thread, factor), None).unwrap()
}

fn count_named(func: &Function, prefix: &str) -> usize {
    func.instructions()
        .filter(|&id| {
            func.inst(id)
                .name
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix(".cf"))
                .is_some_and(|k| k.parse::<u32>().is_ok())
        })
        .count()
}

#[test]
fn rejects_invalid_parameters() {
    let func = thread_diamond();
    let err = coarsen_kernel(&func, &FxHashSet::default(), &params(Level::Thread, 1), None)
        .unwrap_err();
    assert_eq!(err, KernelError::InvalidFactor(1));

    let zero_stride = CoarseningParams {
        stride: 0,
        ..params(Level::Thread, 2)
    };
    let err = coarsen_kernel(&func, &FxHashSet::default(), &zero_stride, None).unwrap_err();
    assert_eq!(err, KernelError::InvalidStride);
}

#[test]
fn clone_counts_match_the_factor() {
    for factor in [2, 4, 8, 16] {
        let func = thread_diamond();
        let outcome = run(&func, factor);
        let out = &outcome.function;
        let extra = factor as usize - 1;

        for value in ["c", "x", "y", "m", "p"] {
            assert_eq!(count_named(out, value), extra, "{value} at factor {factor}");
        }
        assert_eq!(count_named(out, "tid"), extra);
        assert_eq!(outcome.stats.replicated_regions, 1);
        assert_eq!(outcome.stats.placeholders_unresolved, 0);
        assert!(out
            .instructions()
            .all(|id| !out.inst(id).name.contains(".place.holder")));
    }
}

#[test]
fn input_function_is_left_untouched() {
    let func = divergent_loop();
    let before = func.clone();
    let outcome = run(&func, 4);
    assert_eq!(func, before);
    assert_ne!(outcome.function, before);
    assert_eq!(outcome.function.name, before.name);
}

#[test]
fn kernel_without_identity_reads_at_level_is_unchanged() {
    // The diamond reads only the thread id; block level finds nothing.
    let func = thread_diamond();
    let outcome =
        coarsen_kernel(&func, &FxHashSet::default(), &params(Level::Block, 2), None).unwrap();
    assert_eq!(outcome.function, func);
    assert_eq!(outcome.stats, EngineStats::default());
}

#[test]
fn isolated_exits_coarsen_cleanly() {
    let outcome = run(&bypass(), 2);
    let out = &outcome.function;
    assert_eq!(outcome.stats.replicated_regions, 1);
    assert_eq!(count_named(out, "m.new_exiting"), 1);
    assert_eq!(count_named(out, "m.old_exiting"), 1);
}

#[test]
fn estimator_report_is_attached() {
    let estimator = BenefitEstimator::default();
    let func = straight_line();
    let outcome = coarsen_kernel(
        &func,
        &FxHashSet::default(),
        &params(Level::Thread, 4),
        Some(&estimator),
    )
    .unwrap();
    let report = outcome.report.unwrap();
    assert_eq!(report.function, "scale");
    assert_eq!(report.factor, 4);
    assert!(report.duplication_cost > 0);
    assert_eq!(run(&func, 4).report, None);
}

#[test]
fn branch_without_post_dominator_is_a_region_error() {
    // entry: br (tid < 4), a, b; a: ret; b: ret
    let mut fb = FunctionBuilder::kernel("two_exits", vec![]);
    let entry = fb.block("entry");
    let a = fb.block("a");
    let b = fb.block("b");
    fb.switch_to(entry);
    let t = tid(&mut fb);
    let c = fb.icmp(CmpPred::Slt, t, Value::Const(4), "c");
    fb.cond_br(c, a, b);
    fb.switch_to(a);
    fb.ret(None);
    fb.switch_to(b);
    fb.ret(None);
    let func = fb.finish();

    let err = coarsen_kernel(&func, &FxHashSet::default(), &params(Level::Thread, 2), None)
        .unwrap_err();
    assert!(
        matches!(err, KernelError::Region(RegionError::NoPostDominator { .. })),
        "{err}"
    );
}
