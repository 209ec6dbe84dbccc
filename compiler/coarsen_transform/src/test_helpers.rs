//! Kernel fixtures for the transform tests.

use rustc_hash::FxHashSet;

use coarsen_analysis::{Dimension, DimensionSelector, DivergenceAnalysis, GridAnalysis, GridVar, Level};
use coarsen_ir::{
    AddressSpace, BinOp, BlockId, CmpPred, Function, FunctionAnalyses, FunctionBuilder, InstId, Param,
    Type, Value,
};

pub(crate) fn b(n: u32) -> BlockId {
    BlockId::new(n)
}

pub(crate) fn i(n: u32) -> InstId {
    InstId::new(n)
}

fn params() -> Vec<Param> {
    vec![
        Param::new("out", Type::Ptr(AddressSpace::Global)),
        Param::new("n", Type::I32),
    ]
}

pub(crate) fn tid(fb: &mut FunctionBuilder) -> Value {
    fb.call(GridVar::ThreadId.builtin(Dimension::X), vec![], Type::I32, "tid")
}

/// Run grid and divergence analysis along x.
pub(crate) fn analyze(func: &Function, level: Level) -> (FunctionAnalyses, GridAnalysis, DivergenceAnalysis) {
    let analyses = FunctionAnalyses::compute(func);
    let grid = GridAnalysis::compute(func, DimensionSelector::Only(Dimension::X));
    let divergence =
        DivergenceAnalysis::analyze(func, &analyses, &grid, &FxHashSet::default(), level, Dimension::X)
            .unwrap();
    (analyses, grid, divergence)
}

/// ```text
/// entry(0): %tid; %c = icmp slt %tid, 4; br %c, then, else
/// then(1):  %x = add %tid, 1; br join
/// else(2):  %y = mul %tid, 2; br join
/// join(3):  %m = phi [%x, then], [%y, else]; %p = gep %out, %tid
///           store %p, %m; ret
/// ```
pub(crate) fn thread_diamond() -> Function {
    let mut fb = FunctionBuilder::kernel("diamond", params());
    let entry = fb.block("entry");
    let then = fb.block("then");
    let els = fb.block("else");
    let join = fb.block("join");

    fb.switch_to(entry);
    let t = tid(&mut fb);
    let c = fb.icmp(CmpPred::Slt, t, Value::Const(4), "c");
    fb.cond_br(c, then, els);

    fb.switch_to(then);
    let x = fb.add(t, Value::Const(1), "x");
    fb.br(join);

    fb.switch_to(els);
    let y = fb.mul(t, Value::Const(2), "y");
    fb.br(join);

    fb.switch_to(join);
    let m = fb.phi(Type::I32, vec![(x, then), (y, els)], "m");
    let p = fb.gep(Value::Arg(0), t, "p");
    fb.store(p, m);
    fb.ret(None);
    fb.finish()
}

/// A divergent diamond whose join is also reachable around it.
///
/// ```text
/// entry(0): %tid; %u = icmp slt %n, 0; br %u, head, join
/// head(1):  %c = icmp slt %tid, 4; br %c, a, b
/// a(2):     %x = add %tid, 1; br join
/// b(3):     %y = mul %tid, 2; br join
/// join(4):  %m = phi [0, entry], [%x, a], [%y, b]
///           %p = gep %out, %tid; store %p, %m; ret
/// ```
pub(crate) fn bypass() -> Function {
    let mut fb = FunctionBuilder::kernel("bypass", params());
    let entry = fb.block("entry");
    let head = fb.block("head");
    let a = fb.block("a");
    let bb = fb.block("b");
    let join = fb.block("join");

    fb.switch_to(entry);
    let t = tid(&mut fb);
    let u = fb.icmp(CmpPred::Slt, Value::Arg(1), Value::Const(0), "u");
    fb.cond_br(u, head, join);

    fb.switch_to(head);
    let c = fb.icmp(CmpPred::Slt, t, Value::Const(4), "c");
    fb.cond_br(c, a, bb);

    fb.switch_to(a);
    let x = fb.add(t, Value::Const(1), "x");
    fb.br(join);

    fb.switch_to(bb);
    let y = fb.mul(t, Value::Const(2), "y");
    fb.br(join);

    fb.switch_to(join);
    let m = fb.phi(
        Type::I32,
        vec![(Value::Const(0), entry), (x, a), (y, bb)],
        "m",
    );
    let p = fb.gep(Value::Arg(0), t, "p");
    fb.store(p, m);
    fb.ret(None);
    fb.finish()
}

/// Each thread sums `0..tid` and stores the result.
///
/// ```text
/// entry(0):  %tid; br header
/// header(1): %i = phi [0, entry], [%next, body]
///            %acc = phi [0, entry], [%sum, body]
///            %c = icmp slt %i, %tid; br %c, body, exit
/// body(2):   %sum = add %acc, %i; %next = add %i, 1; br header
/// exit(3):   %p = gep %out, %tid; store %p, %acc; ret
/// ```
pub(crate) fn divergent_loop() -> Function {
    let mut fb = FunctionBuilder::kernel("triangle", params());
    let entry = fb.block("entry");
    let header = fb.block("header");
    let body = fb.block("body");
    let exit = fb.block("exit");

    fb.switch_to(entry);
    let t = tid(&mut fb);
    fb.br(header);

    fb.switch_to(header);
    let iv = fb.phi(Type::I32, vec![(Value::Const(0), entry)], "i");
    let acc = fb.phi(Type::I32, vec![(Value::Const(0), entry)], "acc");
    let c = fb.icmp(CmpPred::Slt, iv, t, "c");
    fb.cond_br(c, body, exit);

    fb.switch_to(body);
    let sum = fb.add(acc, iv, "sum");
    let next = fb.add(iv, Value::Const(1), "next");
    fb.br(header);
    fb.add_incoming(iv, next, body);
    fb.add_incoming(acc, sum, body);

    fb.switch_to(exit);
    let p = fb.gep(Value::Arg(0), t, "p");
    fb.store(p, acc);
    fb.ret(None);
    fb.finish()
}

/// Straight-line kernel: `out[tid] = tid * n + ntid`.
pub(crate) fn straight_line() -> Function {
    let mut fb = FunctionBuilder::kernel("scale", params());
    let t = tid(&mut fb);
    let ntid = fb.call(GridVar::BlockDim.builtin(Dimension::X), vec![], Type::I32, "ntid");
    let v = fb.binary(BinOp::Mul, t, Value::Arg(1), "v");
    let w = fb.add(v, ntid, "w");
    let p = fb.gep(Value::Arg(0), t, "p");
    fb.store(p, w);
    fb.ret(None);
    fb.finish()
}
