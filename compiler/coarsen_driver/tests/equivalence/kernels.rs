//! Kernels exercised by the equivalence tests.
//!
//! Every kernel takes `(ptr addrspace(1) %out, i32 %n)`.

use coarsen_analysis::{Dimension, GridVar};
use coarsen_ir::{
    AddressSpace, BinOp, CmpPred, FunctionBuilder, Module, Param, Type, Value, DEVICE_TRIPLE,
    KERNEL_KEY,
};

fn params() -> Vec<Param> {
    vec![
        Param::new("out", Type::Ptr(AddressSpace::Global)),
        Param::new("n", Type::I32),
    ]
}

fn read(fb: &mut FunctionBuilder, var: GridVar, dim: Dimension, name: &str) -> Value {
    fb.call(var.builtin(dim), vec![], Type::I32, name)
}

/// `ctaid.x * ntid.x + tid.x`, returning `(tid, ctaid, gid)`.
fn global_id(fb: &mut FunctionBuilder) -> (Value, Value, Value) {
    let tid = read(fb, GridVar::ThreadId, Dimension::X, "tid");
    let ctaid = read(fb, GridVar::BlockId, Dimension::X, "ctaid");
    let ntid = read(fb, GridVar::BlockDim, Dimension::X, "ntid");
    let base = fb.mul(ctaid, ntid, "base");
    let gid = fb.add(base, tid, "gid");
    (tid, ctaid, gid)
}

fn module_with(func: coarsen_ir::Function) -> Module {
    let mut module = Module::new("kernels.cu", DEVICE_TRIPLE);
    module.annotate(func.name.clone(), KERNEL_KEY, 1);
    module.add_function(func);
    module
}

/// ```text
/// if (gid < n) {
///     m = tid < 4 ? tid + 1 : tid * 2;
///     out[gid] = m + ctaid;
/// }
/// ```
pub fn guarded_diamond() -> Module {
    let mut fb = FunctionBuilder::kernel("_Z7diamondPii", params());
    let entry = fb.block("entry");
    let body = fb.block("body");
    let then = fb.block("then");
    let els = fb.block("else");
    let join = fb.block("join");
    let exit = fb.block("exit");

    fb.switch_to(entry);
    let (tid, ctaid, gid) = global_id(&mut fb);
    let inside = fb.icmp(CmpPred::Slt, gid, Value::Arg(1), "inside");
    fb.cond_br(inside, body, exit);

    fb.switch_to(body);
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
    let v = fb.add(m, ctaid, "v");
    let p = fb.gep(Value::Arg(0), gid, "p");
    fb.store(p, v);
    fb.br(exit);

    fb.switch_to(exit);
    fb.ret(None);
    module_with(fb.finish())
}

/// `out[gid] = ctaid + sum(0..tid)`
pub fn triangle() -> Module {
    let mut fb = FunctionBuilder::kernel("_Z8trianglePii", params());
    let entry = fb.block("entry");
    let header = fb.block("header");
    let body = fb.block("body");
    let exit = fb.block("exit");

    fb.switch_to(entry);
    let (tid, ctaid, gid) = global_id(&mut fb);
    fb.br(header);

    fb.switch_to(header);
    let i = fb.phi(Type::I32, vec![(Value::Const(0), entry)], "i");
    let acc = fb.phi(Type::I32, vec![(ctaid, entry)], "acc");
    let c = fb.icmp(CmpPred::Slt, i, tid, "c");
    fb.cond_br(c, body, exit);

    fb.switch_to(body);
    let sum = fb.add(acc, i, "sum");
    let next = fb.add(i, Value::Const(1), "next");
    fb.add_incoming(i, next, body);
    fb.add_incoming(acc, sum, body);
    fb.br(header);

    fb.switch_to(exit);
    let p = fb.gep(Value::Arg(0), gid, "p");
    fb.store(p, acc);
    fb.ret(None);
    module_with(fb.finish())
}

/// Even blocks write `3 * ctaid`, odd blocks `tid + ctaid`.
pub fn parity() -> Module {
    let mut fb = FunctionBuilder::kernel("_Z6parityPii", params());
    let entry = fb.block("entry");
    let even = fb.block("even");
    let odd = fb.block("odd");
    let join = fb.block("join");

    fb.switch_to(entry);
    let (tid, ctaid, gid) = global_id(&mut fb);
    let low = fb.binary(BinOp::And, ctaid, Value::Const(1), "low");
    let c = fb.icmp(CmpPred::Eq, low, Value::Const(0), "c");
    fb.cond_br(c, even, odd);

    fb.switch_to(even);
    let e = fb.mul(ctaid, Value::Const(3), "e");
    fb.br(join);

    fb.switch_to(odd);
    let o = fb.add(tid, ctaid, "o");
    fb.br(join);

    fb.switch_to(join);
    let m = fb.phi(Type::I32, vec![(e, even), (o, odd)], "m");
    let p = fb.gep(Value::Arg(0), gid, "p");
    fb.store(p, m);
    fb.ret(None);
    module_with(fb.finish())
}

/// A single 2D block: row `ty` of `out` gets `10 * ty` for the first three
/// rows and `tx + 100` below.
pub fn plane() -> Module {
    let mut fb = FunctionBuilder::kernel("_Z5planePii", params());
    let entry = fb.block("entry");
    let top = fb.block("top");
    let rest = fb.block("rest");
    let join = fb.block("join");

    fb.switch_to(entry);
    let tx = read(&mut fb, GridVar::ThreadId, Dimension::X, "tx");
    let ty = read(&mut fb, GridVar::ThreadId, Dimension::Y, "ty");
    let nx = read(&mut fb, GridVar::BlockDim, Dimension::X, "nx");
    let row = fb.mul(ty, nx, "row");
    let idx = fb.add(row, tx, "idx");
    let c = fb.icmp(CmpPred::Slt, ty, Value::Const(3), "c");
    fb.cond_br(c, top, rest);

    fb.switch_to(top);
    let a = fb.mul(ty, Value::Const(10), "a");
    fb.br(join);

    fb.switch_to(rest);
    let b = fb.add(tx, Value::Const(100), "b");
    fb.br(join);

    fb.switch_to(join);
    let m = fb.phi(Type::I32, vec![(a, top), (b, rest)], "m");
    let p = fb.gep(Value::Arg(0), idx, "p");
    fb.store(p, m);
    fb.ret(None);
    module_with(fb.finish())
}
