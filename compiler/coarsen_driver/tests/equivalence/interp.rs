//! A reference interpreter for integer kernels.
//!
//! Threads run one after another to completion, so kernels must not rely on
//! barriers or on another thread's writes. Every global-memory element is an
//! `i64`; values are normalized to the width of their type after each
//! operation.

use rustc_hash::FxHashMap;

use coarsen_analysis::{classify_builtin, Dimension, GridVar};
use coarsen_driver::Dim3;
use coarsen_ir::{
    BinOp, BlockId, CastOp, CmpPred, Function, GlobalId, InstId, InstKind, Module, Type, Value,
};

const STEP_LIMIT: usize = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Val {
    Int(i64),
    Ptr { buf: usize, offset: i64 },
    Undef,
}

/// Buffers addressed by [`Val::Ptr`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Memory {
    buffers: Vec<Vec<i64>>,
}

impl Memory {
    pub fn alloc(&mut self, len: usize) -> Val {
        self.buffers.push(vec![0; len]);
        Val::Ptr {
            buf: self.buffers.len() - 1,
            offset: 0,
        }
    }

    pub fn buffer(&self, ptr: Val) -> &[i64] {
        match ptr {
            Val::Ptr { buf, .. } => &self.buffers[buf],
            other => panic!("not a pointer: {other:?}"),
        }
    }

    fn slot(&mut self, ptr: Val) -> Result<&mut i64, String> {
        let Val::Ptr { buf, offset } = ptr else {
            return Err(format!("dereferencing {ptr:?}"));
        };
        let buffer = self
            .buffers
            .get_mut(buf)
            .ok_or_else(|| format!("no buffer {buf}"))?;
        let len = buffer.len();
        usize::try_from(offset)
            .ok()
            .and_then(|idx| buffer.get_mut(idx))
            .ok_or_else(|| format!("offset {offset} out of bounds of buffer {buf} ({len})"))
    }
}

/// Physical grid position of one thread.
#[derive(Clone, Copy, Debug)]
struct ThreadCtx {
    tid: Dim3,
    ctaid: Dim3,
    ntid: Dim3,
    nctaid: Dim3,
}

impl ThreadCtx {
    fn read(&self, var: GridVar, dim: Dimension) -> i64 {
        let dims = match var {
            GridVar::ThreadId => self.tid,
            GridVar::BlockId => self.ctaid,
            GridVar::BlockDim => self.ntid,
            GridVar::GridDim => self.nctaid,
        };
        i64::from(dims.get(dim))
    }
}

/// Run `kernel` of `module` over a whole launch.
pub fn launch(
    module: &Module,
    kernel: &str,
    grid: Dim3,
    block: Dim3,
    args: &[Val],
    memory: &mut Memory,
) -> Result<(), String> {
    let func = module
        .function(kernel)
        .ok_or_else(|| format!("no kernel `{kernel}`"))?;
    let mut globals: FxHashMap<GlobalId, Val> = FxHashMap::default();
    for (idx, global) in module.globals.iter().enumerate() {
        let id = GlobalId::new(u32::try_from(idx).map_err(|e| e.to_string())?);
        globals.insert(id, memory.alloc(global.len as usize));
    }

    for bz in 0..grid.z {
        for by in 0..grid.y {
            for bx in 0..grid.x {
                for tz in 0..block.z {
                    for ty in 0..block.y {
                        for tx in 0..block.x {
                            let ctx = ThreadCtx {
                                tid: Dim3::new(tx, ty, tz),
                                ctaid: Dim3::new(bx, by, bz),
                                ntid: block,
                                nctaid: grid,
                            };
                            Thread::new(func, ctx, args, &globals).run(memory)?;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

struct Thread<'a> {
    func: &'a Function,
    ctx: ThreadCtx,
    args: &'a [Val],
    globals: &'a FxHashMap<GlobalId, Val>,
    values: FxHashMap<InstId, Val>,
}

impl<'a> Thread<'a> {
    fn new(
        func: &'a Function,
        ctx: ThreadCtx,
        args: &'a [Val],
        globals: &'a FxHashMap<GlobalId, Val>,
    ) -> Self {
        Self {
            func,
            ctx,
            args,
            globals,
            values: FxHashMap::default(),
        }
    }

    fn run(mut self, memory: &mut Memory) -> Result<(), String> {
        let func = self.func;
        let mut block = func.entry();
        let mut prev: Option<BlockId> = None;
        for _ in 0..STEP_LIMIT {
            // Phis read their incoming values simultaneously.
            let mut incoming = Vec::new();
            for phi in func.phis(block) {
                let InstKind::Phi { incoming: edges } = func.kind(phi) else {
                    unreachable!()
                };
                let from = prev.ok_or("phi in the entry block")?;
                let value = edges
                    .iter()
                    .find(|(_, pred)| *pred == from)
                    .map(|(value, _)| *value)
                    .ok_or_else(|| format!("phi {phi:?} has no edge from {from}"))?;
                incoming.push((phi, self.operand(value)?));
            }
            self.values.extend(incoming);

            let insts = func.block(block).insts();
            let mut next = None;
            for &inst in &insts[func.first_non_phi(block)..] {
                match func.kind(inst) {
                    InstKind::Br { target } => {
                        next = Some(*target);
                        break;
                    }
                    InstKind::CondBr {
                        cond,
                        then_block,
                        else_block,
                    } => {
                        let taken = self.int(*cond)? & 1 == 1;
                        next = Some(if taken { *then_block } else { *else_block });
                        break;
                    }
                    InstKind::Ret { .. } => return Ok(()),
                    InstKind::Unreachable => return Err("reached unreachable".into()),
                    _ => {
                        let value = self.execute(inst, memory)?;
                        self.values.insert(inst, value);
                    }
                }
            }
            let target = next.ok_or_else(|| format!("{block} has no terminator"))?;
            prev = Some(block);
            block = target;
        }
        Err(format!("`{}` did not finish", func.name))
    }

    fn operand(&self, value: Value) -> Result<Val, String> {
        match value {
            Value::Inst(id) => self
                .values
                .get(&id)
                .copied()
                .ok_or_else(|| format!("{id:?} read before it was defined")),
            Value::Arg(n) => self
                .args
                .get(n as usize)
                .copied()
                .ok_or_else(|| format!("missing argument {n}")),
            Value::Const(c) => Ok(Val::Int(c)),
            Value::Global(id) => self
                .globals
                .get(&id)
                .copied()
                .ok_or_else(|| format!("unknown global {id:?}")),
            Value::Undef => Ok(Val::Undef),
        }
    }

    fn int(&self, value: Value) -> Result<i64, String> {
        match self.operand(value)? {
            Val::Int(v) => Ok(v),
            other => Err(format!("expected an integer, found {other:?}")),
        }
    }

    fn unsigned(&self, value: Value) -> Result<u64, String> {
        let v = self.int(value)?;
        Ok(match self.func.value_type(value) {
            Type::I1 => (v & 1) as u64,
            Type::I32 => u64::from(v as u32),
            _ => v as u64,
        })
    }

    fn execute(&self, inst: InstId, memory: &mut Memory) -> Result<Val, String> {
        let ty = self.func.inst(inst).ty;
        let value = match self.func.kind(inst) {
            InstKind::Binary { op, lhs, rhs } => {
                let (a, b) = (self.int(*lhs)?, self.int(*rhs)?);
                let result = match op {
                    BinOp::Add => a.wrapping_add(b),
                    BinOp::Sub => a.wrapping_sub(b),
                    BinOp::Mul => a.wrapping_mul(b),
                    BinOp::SDiv | BinOp::SRem | BinOp::UDiv | BinOp::URem if b == 0 => {
                        return Err("division by zero".into())
                    }
                    BinOp::SDiv => a.wrapping_div(b),
                    BinOp::SRem => a.wrapping_rem(b),
                    BinOp::UDiv => (self.unsigned(*lhs)? / self.unsigned(*rhs)?) as i64,
                    BinOp::URem => (self.unsigned(*lhs)? % self.unsigned(*rhs)?) as i64,
                    BinOp::And => a & b,
                    BinOp::Or => a | b,
                    BinOp::Xor => a ^ b,
                    BinOp::Shl => a.wrapping_shl(b as u32),
                    BinOp::LShr => (self.unsigned(*lhs)? >> (b as u32)) as i64,
                    BinOp::AShr => a.wrapping_shr(b as u32),
                    BinOp::FAdd | BinOp::FSub | BinOp::FMul | BinOp::FDiv => {
                        return Err("floating point is not interpreted".into())
                    }
                };
                Val::Int(result)
            }
            InstKind::Cmp { pred, lhs, rhs } => {
                let holds = if pred.is_unsigned() {
                    let (a, b) = (self.unsigned(*lhs)?, self.unsigned(*rhs)?);
                    match pred {
                        CmpPred::Ult => a < b,
                        CmpPred::Ule => a <= b,
                        CmpPred::Ugt => a > b,
                        _ => a >= b,
                    }
                } else {
                    let (a, b) = (self.int(*lhs)?, self.int(*rhs)?);
                    match pred {
                        CmpPred::Eq => a == b,
                        CmpPred::Ne => a != b,
                        CmpPred::Slt => a < b,
                        CmpPred::Sle => a <= b,
                        CmpPred::Sgt => a > b,
                        _ => a >= b,
                    }
                };
                Val::Int(i64::from(holds))
            }
            InstKind::Cast { op, value } => match op {
                CastOp::ZExt => Val::Int(self.unsigned(*value)? as i64),
                CastOp::SExt | CastOp::Trunc => Val::Int(self.int(*value)?),
                CastOp::AddrSpaceCast => self.operand(*value)?,
                CastOp::SiToFp | CastOp::FpToSi => {
                    return Err("floating point is not interpreted".into())
                }
            },
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => {
                if self.int(*cond)? & 1 == 1 {
                    self.operand(*on_true)?
                } else {
                    self.operand(*on_false)?
                }
            }
            InstKind::Gep { base, index } => match self.operand(*base)? {
                Val::Ptr { buf, offset } => Val::Ptr {
                    buf,
                    offset: offset + self.int(*index)?,
                },
                other => return Err(format!("gep on {other:?}")),
            },
            InstKind::Load { ptr } => Val::Int(*memory.slot(self.operand(*ptr)?)?),
            InstKind::Store { ptr, value } => {
                let stored = self.int(*value)?;
                *memory.slot(self.operand(*ptr)?)? = stored;
                Val::Undef
            }
            InstKind::Call { callee, .. } => {
                let (var, dim) =
                    classify_builtin(callee).ok_or_else(|| format!("cannot call `{callee}`"))?;
                Val::Int(self.ctx.read(var, dim))
            }
            InstKind::Phi { .. }
            | InstKind::Br { .. }
            | InstKind::CondBr { .. }
            | InstKind::Ret { .. }
            | InstKind::Unreachable => return Err(format!("{inst:?} out of place")),
        };
        Ok(match value {
            Val::Int(v) => Val::Int(normalize(v, ty)),
            other => other,
        })
    }
}

fn normalize(v: i64, ty: Type) -> i64 {
    match ty {
        Type::I1 => v & 1,
        Type::I32 => i64::from(v as i32),
        _ => v,
    }
}
