//! Kernel IR: SSA instructions over basic blocks.
//!
//! The IR mirrors the subset of LLVM IR that GPU kernels lowered for the
//! NVPTX target use:
//!
//! - **[`InstKind`]**: a single operation (arithmetic, memory, call, phi,
//!   terminator). Terminators are ordinary instructions so that a branch
//!   can itself be a member of an analysis set.
//! - **[`Value`]**: an operand, either an instruction result, a function argument,
//!   a constant, a module global, or `undef`.
//! - **[`Type`]**: the handful of first-class types kernels need, with
//!   pointers tagged by [`AddressSpace`].
//!
//! Instructions and blocks live in per-function arenas (see
//! [`Function`](crate::Function)) and are referred to by the [`InstId`] and
//! [`BlockId`] handles defined here.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

// ── ID newtypes ─────────────────────────────────────────────────────

/// Instruction handle within a single [`Function`](crate::Function).
///
/// Handles are allocated sequentially and never reused, so an erased
/// instruction's handle stays invalid for the lifetime of the function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct InstId(u32);

impl InstId {
    /// Create an instruction handle from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Basic block handle within a single [`Function`](crate::Function).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// Create a block handle from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Module-level global variable handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct GlobalId(u32);

impl GlobalId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

// ── Types ───────────────────────────────────────────────────────────

/// NVPTX address spaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressSpace {
    Generic,
    Global,
    Shared,
    Constant,
    Local,
}

impl AddressSpace {
    /// Numeric address space as used by the NVPTX backend.
    pub fn raw(self) -> u32 {
        match self {
            AddressSpace::Generic => 0,
            AddressSpace::Global => 1,
            AddressSpace::Shared => 3,
            AddressSpace::Constant => 4,
            AddressSpace::Local => 5,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(AddressSpace::Generic),
            1 => Some(AddressSpace::Global),
            3 => Some(AddressSpace::Shared),
            4 => Some(AddressSpace::Constant),
            5 => Some(AddressSpace::Local),
            _ => None,
        }
    }
}

/// First-class value types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    I1,
    I32,
    I64,
    F32,
    F64,
    Ptr(AddressSpace),
}

impl Type {
    /// Does this type describe a value (anything but `void`)?
    #[inline]
    pub fn is_value(self) -> bool {
        self != Type::Void
    }

    pub fn is_float(self) -> bool {
        matches!(self, Type::F32 | Type::F64)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::I1 => f.write_str("i1"),
            Type::I32 => f.write_str("i32"),
            Type::I64 => f.write_str("i64"),
            Type::F32 => f.write_str("float"),
            Type::F64 => f.write_str("double"),
            Type::Ptr(AddressSpace::Generic) => f.write_str("ptr"),
            Type::Ptr(space) => write!(f, "ptr addrspace({})", space.raw()),
        }
    }
}

// ── Values ──────────────────────────────────────────────────────────

/// An instruction operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    /// Result of another instruction in the same function.
    Inst(InstId),
    /// The n-th function argument.
    Arg(u32),
    /// Integer constant. The consumer's type gives it its width.
    Const(i64),
    /// Address of a module global.
    Global(GlobalId),
    Undef,
}

impl Value {
    #[inline]
    pub fn as_inst(self) -> Option<InstId> {
        match self {
            Value::Inst(id) => Some(id),
            _ => None,
        }
    }

    #[inline]
    pub fn as_const(self) -> Option<i64> {
        match self {
            Value::Const(c) => Some(c),
            _ => None,
        }
    }
}

impl From<InstId> for Value {
    fn from(id: InstId) -> Self {
        Value::Inst(id)
    }
}

// ── Operators ───────────────────────────────────────────────────────

/// Two-operand arithmetic and bitwise operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,
    FAdd,
    FSub,
    FMul,
    FDiv,
}

impl BinOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::UDiv => "udiv",
            BinOp::SDiv => "sdiv",
            BinOp::URem => "urem",
            BinOp::SRem => "srem",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Xor => "xor",
            BinOp::Shl => "shl",
            BinOp::LShr => "lshr",
            BinOp::AShr => "ashr",
            BinOp::FAdd => "fadd",
            BinOp::FSub => "fsub",
            BinOp::FMul => "fmul",
            BinOp::FDiv => "fdiv",
        }
    }

    pub fn is_division(self) -> bool {
        matches!(self, BinOp::UDiv | BinOp::SDiv | BinOp::FDiv)
    }

    pub fn is_remainder(self) -> bool {
        matches!(self, BinOp::URem | BinOp::SRem)
    }
}

/// Integer comparison predicates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpPred {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
    Slt,
    Sle,
    Sgt,
    Sge,
}

impl CmpPred {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CmpPred::Eq => "eq",
            CmpPred::Ne => "ne",
            CmpPred::Ult => "ult",
            CmpPred::Ule => "ule",
            CmpPred::Ugt => "ugt",
            CmpPred::Uge => "uge",
            CmpPred::Slt => "slt",
            CmpPred::Sle => "sle",
            CmpPred::Sgt => "sgt",
            CmpPred::Sge => "sge",
        }
    }

    /// The predicate that holds exactly when `self` does not.
    pub fn inverse(self) -> Self {
        match self {
            CmpPred::Eq => CmpPred::Ne,
            CmpPred::Ne => CmpPred::Eq,
            CmpPred::Ult => CmpPred::Uge,
            CmpPred::Ule => CmpPred::Ugt,
            CmpPred::Ugt => CmpPred::Ule,
            CmpPred::Uge => CmpPred::Ult,
            CmpPred::Slt => CmpPred::Sge,
            CmpPred::Sle => CmpPred::Sgt,
            CmpPred::Sgt => CmpPred::Sle,
            CmpPred::Sge => CmpPred::Slt,
        }
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, CmpPred::Ult | CmpPred::Ule | CmpPred::Ugt | CmpPred::Uge)
    }
}

/// Value conversions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastOp {
    ZExt,
    SExt,
    Trunc,
    SiToFp,
    FpToSi,
    AddrSpaceCast,
}

impl CastOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            CastOp::ZExt => "zext",
            CastOp::SExt => "sext",
            CastOp::Trunc => "trunc",
            CastOp::SiToFp => "sitofp",
            CastOp::FpToSi => "fptosi",
            CastOp::AddrSpaceCast => "addrspacecast",
        }
    }
}

// ── Instructions ────────────────────────────────────────────────────

/// The operation an instruction performs.
///
/// Operands are [`Value`]s; control-flow targets are [`BlockId`]s. Phi
/// incoming blocks are control-flow references too and are *not* reported
/// by [`operands`](Self::operands).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstKind {
    Binary {
        op: BinOp,
        lhs: Value,
        rhs: Value,
    },
    Cmp {
        pred: CmpPred,
        lhs: Value,
        rhs: Value,
    },
    Cast {
        op: CastOp,
        value: Value,
    },
    Select {
        cond: Value,
        on_true: Value,
        on_false: Value,
    },
    Phi {
        incoming: Vec<(Value, BlockId)>,
    },
    /// Element address: `base + index` in units of the pointee.
    Gep {
        base: Value,
        index: Value,
    },
    Load {
        ptr: Value,
    },
    Store {
        ptr: Value,
        value: Value,
    },
    Call {
        callee: String,
        args: Vec<Value>,
    },
    Br {
        target: BlockId,
    },
    CondBr {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    Ret {
        value: Option<Value>,
    },
    Unreachable,
}

impl InstKind {
    /// All value operands, in operand order.
    pub fn operands(&self) -> SmallVec<[Value; 4]> {
        match self {
            InstKind::Binary { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => {
                smallvec![*lhs, *rhs]
            }
            InstKind::Cast { value, .. } => smallvec![*value],
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => smallvec![*cond, *on_true, *on_false],
            InstKind::Phi { incoming } => incoming.iter().map(|&(v, _)| v).collect(),
            InstKind::Gep { base, index } => smallvec![*base, *index],
            InstKind::Load { ptr } => smallvec![*ptr],
            InstKind::Store { ptr, value } => smallvec![*ptr, *value],
            InstKind::Call { args, .. } => args.iter().copied().collect(),
            InstKind::CondBr { cond, .. } => smallvec![*cond],
            InstKind::Ret { value: Some(v) } => smallvec![*v],
            InstKind::Br { .. } | InstKind::Ret { value: None } | InstKind::Unreachable => {
                SmallVec::new()
            }
        }
    }

    /// Mutable references to all value operands, in operand order.
    pub fn operands_mut(&mut self) -> SmallVec<[&mut Value; 4]> {
        match self {
            InstKind::Binary { lhs, rhs, .. } | InstKind::Cmp { lhs, rhs, .. } => {
                smallvec![lhs, rhs]
            }
            InstKind::Cast { value, .. } => smallvec![value],
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => smallvec![cond, on_true, on_false],
            InstKind::Phi { incoming } => incoming.iter_mut().map(|(v, _)| v).collect(),
            InstKind::Gep { base, index } => smallvec![base, index],
            InstKind::Load { ptr } => smallvec![ptr],
            InstKind::Store { ptr, value } => smallvec![ptr, value],
            InstKind::Call { args, .. } => args.iter_mut().collect(),
            InstKind::CondBr { cond, .. } => smallvec![cond],
            InstKind::Ret { value: Some(v) } => smallvec![v],
            InstKind::Br { .. } | InstKind::Ret { value: None } | InstKind::Unreachable => {
                SmallVec::new()
            }
        }
    }

    /// Instruction results this instruction reads.
    pub fn used_insts(&self) -> SmallVec<[InstId; 4]> {
        self.operands().into_iter().filter_map(Value::as_inst).collect()
    }

    /// Replace every operand equal to `old` with `new`. Returns the number
    /// of operands rewritten.
    pub fn substitute(&mut self, old: Value, new: Value) -> usize {
        let mut count = 0;
        for operand in self.operands_mut() {
            if *operand == old {
                *operand = new;
                count += 1;
            }
        }
        count
    }

    /// Control-flow successors (empty for non-terminators).
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            InstKind::Br { target } => smallvec![*target],
            InstKind::CondBr {
                then_block,
                else_block,
                ..
            } => smallvec![*then_block, *else_block],
            _ => SmallVec::new(),
        }
    }

    /// Retarget every successor edge to `old` so it points at `new`.
    pub fn replace_successor(&mut self, old: BlockId, new: BlockId) {
        match self {
            InstKind::Br { target } => {
                if *target == old {
                    *target = new;
                }
            }
            InstKind::CondBr {
                then_block,
                else_block,
                ..
            } => {
                if *then_block == old {
                    *then_block = new;
                }
                if *else_block == old {
                    *else_block = new;
                }
            }
            _ => {}
        }
    }

    /// Rewrite phi incoming blocks `old` → `new`. No-op for non-phis.
    pub fn remap_incoming_block(&mut self, old: BlockId, new: BlockId) {
        if let InstKind::Phi { incoming } = self {
            for (_, block) in incoming.iter_mut() {
                if *block == old {
                    *block = new;
                }
            }
        }
    }

    #[inline]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. } | InstKind::CondBr { .. } | InstKind::Ret { .. } | InstKind::Unreachable
        )
    }

    #[inline]
    pub fn is_phi(&self) -> bool {
        matches!(self, InstKind::Phi { .. })
    }

    #[inline]
    pub fn is_conditional_branch(&self) -> bool {
        matches!(self, InstKind::CondBr { .. })
    }

    pub fn callee(&self) -> Option<&str> {
        match self {
            InstKind::Call { callee, .. } => Some(callee),
            _ => None,
        }
    }

    /// The pointer a memory access or address computation is based on.
    pub fn address_operand(&self) -> Option<Value> {
        match self {
            InstKind::Load { ptr } | InstKind::Store { ptr, .. } => Some(*ptr),
            InstKind::Gep { base, .. } => Some(*base),
            _ => None,
        }
    }
}

/// An instruction: its operation, result type, name, and owning block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inst {
    pub kind: InstKind,
    pub ty: Type,
    /// Textual name of the result, without the leading `%`. May be empty.
    pub name: String,
    /// Owning block, or `None` once erased (or while detached).
    pub(crate) block: Option<BlockId>,
}

impl Inst {
    pub fn new(kind: InstKind, ty: Type, name: impl Into<String>) -> Self {
        Self {
            kind,
            ty,
            name: name.into(),
            block: None,
        }
    }

    #[inline]
    pub fn block(&self) -> Option<BlockId> {
        self.block
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
