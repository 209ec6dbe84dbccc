//! Kernel fixtures shared by the analysis tests.

use coarsen_ir::{AddressSpace, BlockId, CmpPred, Function, FunctionBuilder, Param, Type, Value};

use crate::grid::{Dimension, GridVar};

pub(crate) fn b(n: u32) -> BlockId {
    BlockId::new(n)
}

fn out_param() -> Vec<Param> {
    vec![
        Param::new("out", Type::Ptr(AddressSpace::Global)),
        Param::new("n", Type::I32),
    ]
}

/// Read `var` along x.
pub(crate) fn read(fb: &mut FunctionBuilder, var: GridVar, name: &str) -> Value {
    fb.call(var.builtin(Dimension::X), vec![], Type::I32, name)
}

/// ```text
/// entry(0): %tid = tid.x; %c = icmp slt %tid, 4; br %c, then, else
/// then(1):  %x = add %tid, 1; br join
/// else(2):  %y = mul %tid, 2; br join
/// join(3):  %m = phi [%x, then], [%y, else]; %p = gep %out, %tid
///           store %p, %m; ret
/// ```
pub(crate) fn thread_diamond() -> Function {
    let mut fb = FunctionBuilder::kernel("diamond", out_param());
    let entry = fb.block("entry");
    let then = fb.block("then");
    let els = fb.block("else");
    let join = fb.block("join");

    fb.switch_to(entry);
    let tid = read(&mut fb, GridVar::ThreadId, "tid");
    let c = fb.icmp(CmpPred::Slt, tid, Value::Const(4), "c");
    fb.cond_br(c, then, els);

    fb.switch_to(then);
    let x = fb.add(tid, Value::Const(1), "x");
    fb.br(join);

    fb.switch_to(els);
    let y = fb.mul(tid, Value::Const(2), "y");
    fb.br(join);

    fb.switch_to(join);
    let m = fb.phi(Type::I32, vec![(x, then), (y, els)], "m");
    let p = fb.gep(Value::Arg(0), tid, "p");
    fb.store(p, m);
    fb.ret(None);
    fb.finish()
}

/// Same shape as [`thread_diamond`], branching on the uniform `%n`.
pub(crate) fn uniform_diamond() -> Function {
    let mut fb = FunctionBuilder::kernel("uniform", out_param());
    let entry = fb.block("entry");
    let then = fb.block("then");
    let els = fb.block("else");
    let join = fb.block("join");

    fb.switch_to(entry);
    let tid = read(&mut fb, GridVar::ThreadId, "tid");
    let c = fb.icmp(CmpPred::Slt, Value::Arg(1), Value::Const(4), "c");
    fb.cond_br(c, then, els);

    fb.switch_to(then);
    let x = fb.add(Value::Arg(1), Value::Const(1), "x");
    fb.br(join);

    fb.switch_to(els);
    let y = fb.add(Value::Arg(1), Value::Const(2), "y");
    fb.br(join);

    fb.switch_to(join);
    let m = fb.phi(Type::I32, vec![(x, then), (y, els)], "m");
    let v = fb.add(m, tid, "v");
    let p = fb.gep(Value::Arg(0), tid, "p");
    fb.store(p, v);
    fb.ret(None);
    fb.finish()
}

/// ```text
/// entry(0):  %tid = tid.x; br header
/// header(1): %i = phi [0, entry], [%next, body]
///            %c = icmp slt %i, %tid; br %c, body, exit
/// body(2):   %p = gep %out, %i; store %p, %i; %next = add %i, 1; br header
/// exit(3):   ret
/// ```
pub(crate) fn divergent_loop() -> Function {
    let mut fb = FunctionBuilder::kernel("loop", out_param());
    let entry = fb.block("entry");
    let header = fb.block("header");
    let body = fb.block("body");
    let exit = fb.block("exit");

    fb.switch_to(entry);
    let tid = read(&mut fb, GridVar::ThreadId, "tid");
    fb.br(header);

    fb.switch_to(header);
    let i = fb.phi(Type::I32, vec![(Value::Const(0), entry)], "i");
    let c = fb.icmp(CmpPred::Slt, i, tid, "c");
    fb.cond_br(c, body, exit);

    fb.switch_to(body);
    let p = fb.gep(Value::Arg(0), i, "p");
    fb.store(p, i);
    let next = fb.add(i, Value::Const(1), "next");
    fb.br(header);
    fb.add_incoming(i, next, body);

    fb.switch_to(exit);
    fb.ret(None);
    fb.finish()
}

/// Straight-line kernel with a loop of `trips` iterations that does not
/// depend on the thread.
///
/// ```text
/// entry(0):  %tid = tid.x; %q = udiv %tid, 3; br header
/// header(1): %i = phi [0, entry], [%next, body]
///            %c = icmp slt %i, trips; br %c, body, exit
/// body(2):   %v = load %out; %next = add %i, 1; br header
/// exit(3):   %p = gep %out, %q; store %p, %tid; ret
/// ```
pub(crate) fn uniform_loop(trips: i64) -> Function {
    let mut fb = FunctionBuilder::kernel("counted", out_param());
    let entry = fb.block("entry");
    let header = fb.block("header");
    let body = fb.block("body");
    let exit = fb.block("exit");

    fb.switch_to(entry);
    let tid = read(&mut fb, GridVar::ThreadId, "tid");
    let q = fb.binary(coarsen_ir::BinOp::UDiv, tid, Value::Const(3), "q");
    fb.br(header);

    fb.switch_to(header);
    let i = fb.phi(Type::I32, vec![(Value::Const(0), entry)], "i");
    let c = fb.icmp(CmpPred::Slt, i, Value::Const(trips), "c");
    fb.cond_br(c, body, exit);

    fb.switch_to(body);
    fb.load(Type::I32, Value::Arg(0), "v");
    let next = fb.add(i, Value::Const(1), "next");
    fb.br(header);
    fb.add_incoming(i, next, body);

    fb.switch_to(exit);
    let p = fb.gep(Value::Arg(0), q, "p");
    fb.store(p, tid);
    fb.ret(None);
    fb.finish()
}
