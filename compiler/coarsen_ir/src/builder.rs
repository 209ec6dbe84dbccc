//! Incremental construction of [`Function`] bodies.

use crate::function::{Function, Param};
use crate::ir::{BinOp, BlockId, CastOp, CmpPred, InstId, InstKind, Type, Value};
use crate::module::CallingConv;

/// Appends instructions to a current block, LLVM `IRBuilder` style.
pub struct FunctionBuilder {
    func: Function,
    current: Option<BlockId>,
}

impl FunctionBuilder {
    /// Start a `void` function.
    pub fn new(name: impl Into<String>, params: Vec<Param>) -> Self {
        Self {
            func: Function::new(name, params, Type::Void),
            current: None,
        }
    }

    /// Start a `void` function using the kernel calling convention.
    pub fn kernel(name: impl Into<String>, params: Vec<Param>) -> Self {
        let mut builder = Self::new(name, params);
        builder.func.calling_conv = CallingConv::PtxKernel;
        builder
    }

    /// Add a block at the end of the layout. Does not switch to it.
    pub fn block(&mut self, name: impl Into<String>) -> BlockId {
        self.func.add_block(name)
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.current
    }

    pub fn func(&self) -> &Function {
        &self.func
    }

    pub fn finish(self) -> Function {
        self.func
    }

    fn emit(&mut self, kind: InstKind, ty: Type, name: impl Into<String>) -> InstId {
        let block = match self.current {
            Some(block) => block,
            None => {
                let entry = self.func.add_block("entry");
                self.current = Some(entry);
                entry
            }
        };
        self.func.append(block, kind, ty, name)
    }

    fn operand_type(&self, primary: Value, fallback: Value) -> Type {
        match primary {
            Value::Inst(_) | Value::Arg(_) | Value::Global(_) => self.func.value_type(primary),
            Value::Const(_) | Value::Undef => self.func.value_type(fallback),
        }
    }

    // ── Values ──────────────────────────────────────────────────────

    pub fn call(
        &mut self,
        callee: impl Into<String>,
        args: Vec<Value>,
        ty: Type,
        name: impl Into<String>,
    ) -> Value {
        let kind = InstKind::Call {
            callee: callee.into(),
            args,
        };
        Value::Inst(self.emit(kind, ty, name))
    }

    pub fn binary(&mut self, op: BinOp, lhs: Value, rhs: Value, name: impl Into<String>) -> Value {
        let ty = self.operand_type(lhs, rhs);
        Value::Inst(self.emit(InstKind::Binary { op, lhs, rhs }, ty, name))
    }

    pub fn add(&mut self, lhs: Value, rhs: Value, name: impl Into<String>) -> Value {
        self.binary(BinOp::Add, lhs, rhs, name)
    }

    pub fn mul(&mut self, lhs: Value, rhs: Value, name: impl Into<String>) -> Value {
        self.binary(BinOp::Mul, lhs, rhs, name)
    }

    pub fn icmp(&mut self, pred: CmpPred, lhs: Value, rhs: Value, name: impl Into<String>) -> Value {
        Value::Inst(self.emit(InstKind::Cmp { pred, lhs, rhs }, Type::I1, name))
    }

    pub fn cast(&mut self, op: CastOp, value: Value, ty: Type, name: impl Into<String>) -> Value {
        Value::Inst(self.emit(InstKind::Cast { op, value }, ty, name))
    }

    pub fn select(
        &mut self,
        cond: Value,
        on_true: Value,
        on_false: Value,
        name: impl Into<String>,
    ) -> Value {
        let ty = self.operand_type(on_true, on_false);
        let kind = InstKind::Select {
            cond,
            on_true,
            on_false,
        };
        Value::Inst(self.emit(kind, ty, name))
    }

    pub fn gep(&mut self, base: Value, index: Value, name: impl Into<String>) -> Value {
        let ty = self.func.value_type(base);
        Value::Inst(self.emit(InstKind::Gep { base, index }, ty, name))
    }

    pub fn load(&mut self, ty: Type, ptr: Value, name: impl Into<String>) -> Value {
        Value::Inst(self.emit(InstKind::Load { ptr }, ty, name))
    }

    pub fn store(&mut self, ptr: Value, value: Value) -> InstId {
        self.emit(InstKind::Store { ptr, value }, Type::Void, String::new())
    }

    pub fn phi(&mut self, ty: Type, incoming: Vec<(Value, BlockId)>, name: impl Into<String>) -> Value {
        Value::Inst(self.emit(InstKind::Phi { incoming }, ty, name))
    }

    /// Add an incoming edge to a phi created earlier (loop back edges).
    pub fn add_incoming(&mut self, phi: Value, value: Value, block: BlockId) {
        let Some(id) = phi.as_inst() else {
            return;
        };
        if let InstKind::Phi { incoming } = &mut self.func.inst_mut(id).kind {
            incoming.push((value, block));
        }
    }

    // ── Terminators ─────────────────────────────────────────────────

    pub fn br(&mut self, target: BlockId) -> InstId {
        self.emit(InstKind::Br { target }, Type::Void, String::new())
    }

    pub fn cond_br(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) -> InstId {
        let kind = InstKind::CondBr {
            cond,
            then_block,
            else_block,
        };
        self.emit(kind, Type::Void, String::new())
    }

    pub fn ret(&mut self, value: Option<Value>) -> InstId {
        self.emit(InstKind::Ret { value }, Type::Void, String::new())
    }
}
