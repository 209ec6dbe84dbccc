//! Shared CFG fixtures for IR tests. Only compiled in test builds.

use crate::builder::FunctionBuilder;
use crate::function::{Function, Param};
use crate::ir::{BlockId, CmpPred, Type, Value};

/// Shorthand for `BlockId::new(n)`.
pub(crate) fn b(n: u32) -> BlockId {
    BlockId::new(n)
}

/// entry(0) → then(1) | else(2) → join(3) → ret.
///
/// `join` holds `%m = phi [%x, then], [%y, else]`.
pub(crate) fn diamond() -> Function {
    let mut fb = FunctionBuilder::new("diamond", vec![Param::new("n", Type::I32)]);
    let entry = fb.block("entry");
    let then = fb.block("then");
    let els = fb.block("else");
    let join = fb.block("join");

    fb.switch_to(entry);
    let c = fb.icmp(CmpPred::Slt, Value::Arg(0), Value::Const(4), "c");
    fb.cond_br(c, then, els);

    fb.switch_to(then);
    let x = fb.add(Value::Arg(0), Value::Const(1), "x");
    fb.br(join);

    fb.switch_to(els);
    let y = fb.add(Value::Arg(0), Value::Const(2), "y");
    fb.br(join);

    fb.switch_to(join);
    fb.phi(Type::I32, vec![(x, then), (y, els)], "m");
    fb.ret(None);
    fb.finish()
}

/// entry(0) → header(1) ⇄ body(2); header → exit(3).
///
/// `%i = phi [0, entry], [%next, body]`, `%next = add %i, 1`, loop while
/// `%i < bound`.
pub(crate) fn counted_loop(bound: i64) -> Function {
    let mut fb = FunctionBuilder::new("counted", vec![]);
    let entry = fb.block("entry");
    let header = fb.block("header");
    let body = fb.block("body");
    let exit = fb.block("exit");

    fb.switch_to(entry);
    fb.br(header);

    fb.switch_to(header);
    let i = fb.phi(Type::I32, vec![(Value::Const(0), entry)], "i");
    let c = fb.icmp(CmpPred::Slt, i, Value::Const(bound), "c");
    fb.cond_br(c, body, exit);

    fb.switch_to(body);
    let next = fb.add(i, Value::Const(1), "next");
    fb.br(header);
    fb.add_incoming(i, next, body);

    fb.switch_to(exit);
    fb.ret(None);
    fb.finish()
}
