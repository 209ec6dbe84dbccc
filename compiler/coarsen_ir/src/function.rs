//! Functions: block and instruction arenas plus the in-place mutation
//! primitives the coarsening passes are built from.
//!
//! Blocks are kept in a *layout* order (the order they print in); the
//! first block in layout is the entry. Instruction handles stay stable
//! across every mutation. Erasing an instruction detaches it from its block
//! but keeps its arena slot, so stale handles are detectable through
//! [`Function::is_live`].

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::ir::{BlockId, Inst, InstId, InstKind, Type, Value};
use crate::module::CallingConv;

// ── Blocks and parameters ───────────────────────────────────────────

/// A basic block: an ordered list of instruction handles.
///
/// A well-formed block starts with its phi-nodes and ends with exactly one
/// terminator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub(crate) insts: Vec<InstId>,
}

impl Block {
    #[inline]
    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }
}

/// A function parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Reverse use-def edges: instruction → the live instructions reading it.
pub type UseMap = FxHashMap<InstId, Vec<InstId>>;

// ── Function ────────────────────────────────────────────────────────

/// A function body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret_ty: Type,
    pub calling_conv: CallingConv,
    blocks: Vec<Block>,
    layout: Vec<BlockId>,
    insts: Vec<Inst>,
}

impl Function {
    /// Create an empty function. The first block added becomes the entry.
    pub fn new(name: impl Into<String>, params: Vec<Param>, ret_ty: Type) -> Self {
        Self {
            name: name.into(),
            params,
            ret_ty,
            calling_conv: CallingConv::C,
            blocks: Vec::new(),
            layout: Vec::new(),
            insts: Vec::new(),
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// The entry block (first in layout).
    ///
    /// Functions without blocks are declarations; callers check
    /// [`is_declaration`](Self::is_declaration) first.
    pub fn entry(&self) -> BlockId {
        self.layout.first().copied().unwrap_or(BlockId::new(0))
    }

    #[inline]
    pub fn is_declaration(&self) -> bool {
        self.layout.is_empty()
    }

    /// Number of block slots (valid `BlockId` indices are `0..num_blocks`).
    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Number of instruction slots, live or erased.
    #[inline]
    pub fn num_inst_slots(&self) -> usize {
        self.insts.len()
    }

    /// Blocks in layout order.
    #[inline]
    pub fn layout(&self) -> &[BlockId] {
        &self.layout
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    #[inline]
    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.index()]
    }

    #[inline]
    pub fn inst_mut(&mut self, id: InstId) -> &mut Inst {
        &mut self.insts[id.index()]
    }

    #[inline]
    pub fn kind(&self, id: InstId) -> &InstKind {
        &self.insts[id.index()].kind
    }

    /// The block's name, or its handle when anonymous. For diagnostics.
    pub fn block_label(&self, id: BlockId) -> String {
        let name = &self.blocks[id.index()].name;
        if name.is_empty() {
            id.to_string()
        } else {
            name.clone()
        }
    }

    #[inline]
    pub fn block_of(&self, id: InstId) -> Option<BlockId> {
        self.insts.get(id.index()).and_then(|inst| inst.block)
    }

    /// Is `id` a valid handle for an instruction currently placed in a block?
    #[inline]
    pub fn is_live(&self, id: InstId) -> bool {
        self.block_of(id).is_some()
    }

    /// Block and index of a live instruction.
    pub fn position(&self, id: InstId) -> Option<(BlockId, usize)> {
        let block = self.block_of(id)?;
        let pos = self.blocks[block.index()]
            .insts
            .iter()
            .position(|&other| other == id)?;
        Some((block, pos))
    }

    /// All live instructions in program order (layout order, then block order).
    pub fn instructions(&self) -> impl Iterator<Item = InstId> + '_ {
        self.layout
            .iter()
            .flat_map(move |&block| self.blocks[block.index()].insts.iter().copied())
    }

    /// The block's terminator, if its last instruction is one.
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        let last = *self.blocks[block.index()].insts.last()?;
        self.kind(last).is_terminator().then_some(last)
    }

    /// Control-flow successors of `block`.
    pub fn successors(&self, block: BlockId) -> SmallVec<[BlockId; 2]> {
        self.terminator(block)
            .map(|term| self.kind(term).successors())
            .unwrap_or_default()
    }

    /// The leading phi-nodes of `block`.
    pub fn phis(&self, block: BlockId) -> Vec<InstId> {
        self.blocks[block.index()]
            .insts
            .iter()
            .copied()
            .take_while(|&id| self.kind(id).is_phi())
            .collect()
    }

    /// Index of the first non-phi instruction of `block`.
    pub fn first_non_phi(&self, block: BlockId) -> usize {
        self.blocks[block.index()]
            .insts
            .iter()
            .take_while(|&&id| self.kind(id).is_phi())
            .count()
    }

    /// Type of an operand.
    pub fn value_type(&self, value: Value) -> Type {
        match value {
            Value::Inst(id) => self.inst(id).ty,
            Value::Arg(n) => self
                .params
                .get(n as usize)
                .map_or(Type::Void, |param| param.ty),
            Value::Const(_) | Value::Undef => Type::I32,
            Value::Global(_) => Type::Ptr(crate::ir::AddressSpace::Generic),
        }
    }

    /// Compute reverse use-def edges for every live instruction.
    ///
    /// Each user appears once per used instruction even when it reads the
    /// same value through several operands.
    pub fn use_map(&self) -> UseMap {
        let mut users: UseMap = FxHashMap::default();
        for id in self.instructions() {
            let mut used = self.kind(id).used_insts();
            used.sort_unstable();
            used.dedup();
            for def in used {
                users.entry(def).or_default().push(id);
            }
        }
        users
    }

    /// Live instructions that read `id`, in program order.
    pub fn users(&self, id: InstId) -> Vec<InstId> {
        self.instructions()
            .filter(|&user| self.kind(user).used_insts().contains(&id))
            .collect()
    }

    // ── Block construction ──────────────────────────────────────────

    /// Append a new, empty block at the end of the layout.
    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        let id = self.alloc_block(name.into());
        self.layout.push(id);
        id
    }

    /// Insert a new, empty block immediately after `after` in the layout.
    pub fn add_block_after(&mut self, after: BlockId, name: impl Into<String>) -> BlockId {
        let id = self.alloc_block(name.into());
        let pos = self
            .layout
            .iter()
            .position(|&b| b == after)
            .map_or(self.layout.len(), |p| p + 1);
        self.layout.insert(pos, id);
        id
    }

    /// Insert a new, empty block immediately before `before` in the layout.
    pub fn add_block_before(&mut self, before: BlockId, name: impl Into<String>) -> BlockId {
        let id = self.alloc_block(name.into());
        let pos = self
            .layout
            .iter()
            .position(|&b| b == before)
            .unwrap_or(self.layout.len());
        self.layout.insert(pos, id);
        id
    }

    fn alloc_block(&mut self, name: String) -> BlockId {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "kernel block counts fit in u32"
        )]
        let id = BlockId::new(self.blocks.len() as u32);
        self.blocks.push(Block {
            name,
            insts: Vec::new(),
        });
        id
    }

    // ── Instruction construction ────────────────────────────────────

    /// Allocate an instruction without placing it in a block.
    pub fn create_inst(&mut self, kind: InstKind, ty: Type, name: impl Into<String>) -> InstId {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "kernel instruction counts fit in u32"
        )]
        let id = InstId::new(self.insts.len() as u32);
        self.insts.push(Inst::new(kind, ty, name));
        id
    }

    /// Create an instruction at the end of `block`.
    pub fn append(
        &mut self,
        block: BlockId,
        kind: InstKind,
        ty: Type,
        name: impl Into<String>,
    ) -> InstId {
        let id = self.create_inst(kind, ty, name);
        let end = self.blocks[block.index()].insts.len();
        self.place(block, end, id);
        id
    }

    /// Create an instruction immediately after `anchor`.
    ///
    /// Anchoring after a phi-node places the new instruction after the
    /// block's last phi instead, keeping the phi group contiguous.
    pub fn insert_after(
        &mut self,
        anchor: InstId,
        kind: InstKind,
        ty: Type,
        name: impl Into<String>,
    ) -> InstId {
        let id = self.create_inst(kind, ty, name);
        self.attach_after(anchor, id);
        id
    }

    /// Create an instruction immediately before `anchor`.
    pub fn insert_before(
        &mut self,
        anchor: InstId,
        kind: InstKind,
        ty: Type,
        name: impl Into<String>,
    ) -> InstId {
        let id = self.create_inst(kind, ty, name);
        if let Some((block, pos)) = self.position(anchor) {
            self.place(block, pos, id);
        }
        id
    }

    /// Place a detached instruction immediately after `anchor`.
    pub fn attach_after(&mut self, anchor: InstId, id: InstId) {
        let Some((block, pos)) = self.position(anchor) else {
            debug_assert!(false, "attach_after: anchor {anchor:?} is not placed");
            return;
        };
        let at = if self.kind(anchor).is_phi() && !self.kind(id).is_phi() {
            self.first_non_phi(block)
        } else {
            pos + 1
        };
        self.place(block, at, id);
    }

    fn place(&mut self, block: BlockId, at: usize, id: InstId) {
        self.blocks[block.index()].insts.insert(at, id);
        self.insts[id.index()].block = Some(block);
    }

    /// Copy an instruction (operands unchanged) into a new detached slot.
    pub fn clone_inst(&mut self, id: InstId, name: impl Into<String>) -> InstId {
        let inst = &self.insts[id.index()];
        let (kind, ty) = (inst.kind.clone(), inst.ty);
        self.create_inst(kind, ty, name)
    }

    // ── Rewriting ───────────────────────────────────────────────────

    /// Remove an instruction from its block. Its handle stays allocated.
    pub fn erase(&mut self, id: InstId) {
        if let Some(block) = self.insts[id.index()].block.take() {
            self.blocks[block.index()].insts.retain(|&other| other != id);
        }
    }

    /// Redirect every use of `old` to `new`. Returns the number of operands
    /// rewritten.
    pub fn replace_all_uses_with(&mut self, old: InstId, new: Value) -> usize {
        self.replace_uses_except(old, new, &[])
    }

    /// Redirect every use of `old` to `new`, except uses inside `keep`.
    pub fn replace_uses_except(&mut self, old: InstId, new: Value, keep: &[InstId]) -> usize {
        let users: Vec<InstId> = self.instructions().collect();
        let mut count = 0;
        for user in users {
            if keep.contains(&user) {
                continue;
            }
            count += self.insts[user.index()]
                .kind
                .substitute(Value::Inst(old), new);
        }
        count
    }

    /// Retarget `block`'s terminator edges from `old` to `new`.
    pub fn replace_successor(&mut self, block: BlockId, old: BlockId, new: BlockId) {
        if let Some(term) = self.terminator(block) {
            self.insts[term.index()].kind.replace_successor(old, new);
        }
    }

    /// Rewrite the incoming-block entries of `block`'s phis from `old` to `new`.
    pub fn remap_phi_incoming(&mut self, block: BlockId, old: BlockId, new: BlockId) {
        for phi in self.phis(block) {
            self.insts[phi.index()].kind.remap_incoming_block(old, new);
        }
    }

    /// Split `block` before the instruction at index `at`.
    ///
    /// Instructions `at..` move to a new block placed right after `block` in
    /// the layout; `block` ends with an unconditional branch to it. Phis in
    /// the successors of the moved terminator are updated to name the new
    /// block as their predecessor.
    pub fn split_block(&mut self, block: BlockId, at: usize, name: impl Into<String>) -> BlockId {
        let new_block = self.add_block_after(block, name);
        let moved: Vec<InstId> = self.blocks[block.index()].insts.split_off(at);
        for &id in &moved {
            self.insts[id.index()].block = Some(new_block);
        }
        self.blocks[new_block.index()].insts = moved;

        for succ in self.successors(new_block) {
            self.remap_phi_incoming(succ, block, new_block);
        }

        self.append(
            block,
            InstKind::Br { target: new_block },
            Type::Void,
            String::new(),
        );
        new_block
    }

    /// Rename a value.
    pub fn set_name(&mut self, id: InstId, name: impl Into<String>) {
        self.insts[id.index()].name = name.into();
    }

    /// Rename a block.
    pub fn set_block_name(&mut self, id: BlockId, name: impl Into<String>) {
        self.blocks[id.index()].name = name.into();
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
