//! Grid rewriting.
//!
//! A kernel coarsened by `factor` at `stride` is launched with `factor`
//! times fewer threads (or blocks) along the coarsened dimension. Each
//! physical identity `id` then stands for the logical identities
//!
//! ```text
//! base = (id / stride) * (factor * stride) + id % stride
//! base + k * stride        for k in 1..factor
//! ```
//!
//! and every extent read is multiplied back by `factor` so the kernel keeps
//! seeing the logical launch size.

use smallvec::SmallVec;
use tracing::debug;

use coarsen_analysis::{Dimension, GridAnalysis, Level};
use coarsen_ir::clone::suffixed;
use coarsen_ir::{BinOp, Function, InstId, InstKind, Value};

use crate::error::KernelError;
use crate::maps::{CloneList, CoarseningMap};

/// Rewrite grid reads for coarsening along `dim` at `level`.
///
/// Returns a coarsening map holding the sibling identities. Each list is
/// registered under both the rewritten `base` and the original identity
/// read, so lookups through either resolve.
pub fn scale_kernel_grid(
    func: &mut Function,
    grid: &GridAnalysis,
    level: Level,
    dim: Dimension,
    factor: u32,
    stride: u32,
) -> Result<CoarseningMap, KernelError> {
    if factor < 2 {
        return Err(KernelError::InvalidFactor(factor));
    }
    if stride == 0 {
        return Err(KernelError::InvalidStride);
    }

    for &size in grid.sizes(level, dim) {
        scale_size(func, size, factor);
    }

    let mut map = CoarseningMap::new();
    for &id in grid.ids(level, dim) {
        let (base, siblings) = scale_id(func, id, factor, stride);
        map.insert(base, siblings.clone());
        map.insert(id, siblings);
    }

    debug!(
        function = %func.name,
        %level,
        %dim,
        factor,
        stride,
        sizes = grid.sizes(level, dim).len(),
        ids = grid.ids(level, dim).len(),
        "scaled kernel grid"
    );
    Ok(map)
}

fn binary(op: BinOp, lhs: Value, rhs: Value) -> InstKind {
    InstKind::Binary { op, lhs, rhs }
}

/// `size * factor`, replacing every other use of `size`.
fn scale_size(func: &mut Function, size: InstId, factor: u32) -> InstId {
    let ty = func.inst(size).ty;
    let name = suffixed(&func.inst(size).name, ".scaled");
    let mul = func.insert_after(
        size,
        binary(BinOp::Mul, Value::Inst(size), Value::Const(i64::from(factor))),
        ty,
        name,
    );
    func.replace_uses_except(size, Value::Inst(mul), &[mul]);
    mul
}

/// Recompute the first logical identity from `id` and derive the others.
fn scale_id(func: &mut Function, id: InstId, factor: u32, stride: u32) -> (InstId, CloneList) {
    let ty = func.inst(id).ty;
    let name = func.inst(id).name.clone();
    let stride_value = Value::Const(i64::from(stride));
    let span = i64::from(factor) * i64::from(stride);

    let div = func.insert_after(
        id,
        binary(BinOp::UDiv, Value::Inst(id), stride_value),
        ty,
        suffixed(&name, ".div"),
    );
    let mul = func.insert_after(
        div,
        binary(BinOp::Mul, Value::Inst(div), Value::Const(span)),
        ty,
        suffixed(&name, ".mul"),
    );
    let rem = func.insert_after(
        mul,
        binary(BinOp::URem, Value::Inst(id), stride_value),
        ty,
        suffixed(&name, ".rem"),
    );
    let base = func.insert_after(
        rem,
        binary(BinOp::Add, Value::Inst(mul), Value::Inst(rem)),
        ty,
        suffixed(&name, ".base"),
    );
    func.replace_uses_except(id, Value::Inst(base), &[div, rem]);

    let mut siblings: CloneList = SmallVec::with_capacity(factor as usize - 1);
    let mut bookmark = base;
    for k in 1..factor {
        let offset = i64::from(k) * i64::from(stride);
        let sibling = func.insert_after(
            bookmark,
            binary(BinOp::Add, Value::Inst(base), Value::Const(offset)),
            ty,
            suffixed(&name, &format!(".cf{}", k + 1)),
        );
        siblings.push(sibling);
        bookmark = sibling;
    }
    (base, siblings)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
