//! Grid built-in classification.
//!
//! Kernels read their position in the launch grid through special-register
//! accessors, `llvm.nvvm.read.ptx.sreg.<reg>.<dim>`:
//!
//! | register | meaning                        | [`GridVar`]   |
//! |----------|--------------------------------|---------------|
//! | `tid`    | thread index within its block  | `ThreadId`    |
//! | `ctaid`  | block index within the grid    | `BlockId`     |
//! | `ntid`   | threads per block              | `BlockDim`    |
//! | `nctaid` | blocks per grid                | `GridDim`     |
//!
//! [`GridAnalysis`] records, per dimension, every call to each accessor,
//! plus every warp-shuffle intrinsic call.

use std::fmt;

use rustc_hash::FxHashSet;

use coarsen_ir::{Function, InstId};

/// Prefix shared by all special-register accessors.
pub const SREG_PREFIX: &str = "llvm.nvvm.read.ptx.sreg.";

/// Prefix shared by warp-shuffle intrinsics (`down`, `up`, `bfly`, `idx`).
pub const SHUFFLE_PREFIX: &str = "llvm.nvvm.shfl.";

const SHUFFLE_KINDS: [&str; 4] = ["down", "up", "bfly", "idx"];

// ── Dimensions and grid variables ───────────────────────────────────

/// Launch grid axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dimension {
    X,
    Y,
    Z,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::X, Dimension::Y, Dimension::Z];

    /// 0 for x, 1 for y, 2 for z.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Dimension::X => 0,
            Dimension::Y => 1,
            Dimension::Z => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Parse `x`, `y` or `z`.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "x" => Some(Dimension::X),
            "y" => Some(Dimension::Y),
            "z" => Some(Dimension::Z),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::X => "x",
            Dimension::Y => "y",
            Dimension::Z => "z",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four grid quantities a kernel can read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GridVar {
    ThreadId,
    BlockId,
    BlockDim,
    GridDim,
}

impl GridVar {
    pub const ALL: [GridVar; 4] = [
        GridVar::ThreadId,
        GridVar::BlockId,
        GridVar::BlockDim,
        GridVar::GridDim,
    ];

    fn slot(self) -> usize {
        match self {
            GridVar::ThreadId => 0,
            GridVar::BlockId => 1,
            GridVar::BlockDim => 2,
            GridVar::GridDim => 3,
        }
    }

    /// Special-register name.
    pub fn register(self) -> &'static str {
        match self {
            GridVar::ThreadId => "tid",
            GridVar::BlockId => "ctaid",
            GridVar::BlockDim => "ntid",
            GridVar::GridDim => "nctaid",
        }
    }

    fn from_register(register: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|var| var.register() == register)
    }

    /// Callee name of the accessor for this variable along `dim`.
    pub fn builtin(self, dim: Dimension) -> String {
        format!("{SREG_PREFIX}{}.{}", self.register(), dim.as_str())
    }
}

/// Granularity of coarsening.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Level {
    /// Merge adjacent threads of a block.
    Thread,
    /// Merge adjacent blocks of the grid.
    Block,
}

impl Level {
    pub const ALL: [Level; 2] = [Level::Thread, Level::Block];

    /// The identity whose distinct values get merged.
    pub fn id_var(self) -> GridVar {
        match self {
            Level::Thread => GridVar::ThreadId,
            Level::Block => GridVar::BlockId,
        }
    }

    /// The extent that shrinks by the coarsening factor.
    pub fn size_var(self) -> GridVar {
        match self {
            Level::Thread => GridVar::BlockDim,
            Level::Block => GridVar::GridDim,
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "thread" => Some(Level::Thread),
            "block" => Some(Level::Block),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Thread => "thread",
            Level::Block => "block",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which dimensions a classification covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DimensionSelector {
    All,
    Only(Dimension),
}

impl DimensionSelector {
    pub fn includes(self, dim: Dimension) -> bool {
        match self {
            DimensionSelector::All => true,
            DimensionSelector::Only(only) => only == dim,
        }
    }
}

/// Classify a callee name as a grid accessor.
pub fn classify_builtin(callee: &str) -> Option<(GridVar, Dimension)> {
    let rest = callee.strip_prefix(SREG_PREFIX)?;
    let (register, dim) = rest.split_once('.')?;
    Some((GridVar::from_register(register)?, Dimension::parse(dim)?))
}

/// Is `callee` a warp-shuffle intrinsic?
pub fn is_shuffle(callee: &str) -> bool {
    let Some(rest) = callee.strip_prefix(SHUFFLE_PREFIX) else {
        return false;
    };
    let rest = rest.strip_prefix("sync.").unwrap_or(rest);
    SHUFFLE_KINDS.iter().any(|kind| {
        rest.strip_prefix(kind)
            .is_some_and(|tail| tail.is_empty() || tail.starts_with('.'))
    })
}

// ── Analysis ────────────────────────────────────────────────────────

/// Per-function table of grid accessor calls.
#[derive(Clone, Debug, Default)]
pub struct GridAnalysis {
    /// `table[dim][var]`, each list in program order.
    table: [[Vec<InstId>; 4]; 3],
    shuffles: Vec<InstId>,
}

impl GridAnalysis {
    /// Classify every call in `func`. Dimensions outside `selector` stay
    /// empty; shuffles are collected regardless of dimension.
    pub fn compute(func: &Function, selector: DimensionSelector) -> Self {
        let mut analysis = Self::default();
        for id in func.instructions() {
            let Some(callee) = func.kind(id).callee() else {
                continue;
            };
            if let Some((var, dim)) = classify_builtin(callee) {
                if selector.includes(dim) {
                    analysis.table[dim.index()][var.slot()].push(id);
                }
            } else if is_shuffle(callee) {
                analysis.shuffles.push(id);
            }
        }
        tracing::debug!(
            function = %func.name,
            thread_ids = analysis.count(GridVar::ThreadId),
            block_ids = analysis.count(GridVar::BlockId),
            shuffles = analysis.shuffles.len(),
            "classified grid built-ins"
        );
        analysis
    }

    /// Calls reading `var` along `dim`.
    pub fn instructions(&self, var: GridVar, dim: Dimension) -> &[InstId] {
        &self.table[dim.index()][var.slot()]
    }

    /// Identity calls merged at `level` along `dim`.
    pub fn ids(&self, level: Level, dim: Dimension) -> &[InstId] {
        self.instructions(level.id_var(), dim)
    }

    /// Extent calls scaled at `level` along `dim`.
    pub fn sizes(&self, level: Level, dim: Dimension) -> &[InstId] {
        self.instructions(level.size_var(), dim)
    }

    pub fn shuffles(&self) -> &[InstId] {
        &self.shuffles
    }

    /// Number of calls reading `var`, over all dimensions.
    pub fn count(&self, var: GridVar) -> usize {
        self.table.iter().map(|row| row[var.slot()].len()).sum()
    }

    /// Every recorded accessor call.
    pub fn builtins(&self) -> FxHashSet<InstId> {
        self.table
            .iter()
            .flat_map(|row| row.iter().flatten().copied())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.table.iter().all(|row| row.iter().all(Vec::is_empty)) && self.shuffles.is_empty()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
