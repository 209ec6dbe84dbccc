//! Static cost model.
//!
//! Every instruction gets a base cost from a [`CostTable`], scaled by the
//! trip counts of the loops around it when they are known at compile time.
//! The estimate is advisory: it is reported next to the transformation and
//! never decides whether a kernel is coarsened.

use std::fmt;

use tracing::info;

use coarsen_ir::{BinOp, BlockId, Function, FunctionAnalyses, InstId, InstKind};

use crate::divergence::DivergenceAnalysis;
use crate::grid::{Dimension, GridAnalysis, Level};

/// Libdevice prefix.
const LIBDEVICE_PREFIX: &str = "__nv_";

/// LLVM math intrinsics priced as math functions.
const MATH_INTRINSICS: [&str; 12] = [
    "llvm.sqrt.",
    "llvm.sin.",
    "llvm.cos.",
    "llvm.exp.",
    "llvm.exp2.",
    "llvm.log.",
    "llvm.log2.",
    "llvm.log10.",
    "llvm.pow.",
    "llvm.fma.",
    "llvm.fabs.",
    "llvm.floor.",
];

/// Per-category instruction costs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CostTable {
    pub default: u64,
    pub div_pow2: u64,
    pub div_non_pow2: u64,
    pub mod_pow2: u64,
    pub mod_non_pow2: u64,
    pub load: u64,
    pub store: u64,
    pub divergent_branch: u64,
    pub math_function: u64,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            default: 1,
            div_pow2: 1,
            div_non_pow2: 2,
            mod_pow2: 1,
            mod_non_pow2: 2,
            load: 4,
            store: 4,
            divergent_branch: 2,
            math_function: 8,
        }
    }
}

impl CostTable {
    /// Cost of dividing by `divisor`; unknown divisors are priced as
    /// non-power-of-two.
    pub fn div_cost(&self, divisor: Option<i64>) -> u64 {
        if divisor.is_some_and(is_pow2) {
            self.div_pow2
        } else {
            self.div_non_pow2
        }
    }

    pub fn mod_cost(&self, divisor: Option<i64>) -> u64 {
        if divisor.is_some_and(is_pow2) {
            self.mod_pow2
        } else {
            self.mod_non_pow2
        }
    }
}

fn is_pow2(value: i64) -> bool {
    value > 0 && (value & (value - 1)) == 0
}

/// Is `callee` a libdevice function or an LLVM math intrinsic?
pub fn is_math_function(callee: &str) -> bool {
    callee.starts_with(LIBDEVICE_PREFIX) || MATH_INTRINSICS.iter().any(|prefix| callee.starts_with(prefix))
}

/// Cost summary of one kernel for one coarsening configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BenefitReport {
    pub function: String,
    pub level: Level,
    pub dimension: Dimension,
    pub factor: u32,
    pub stride: u32,
    /// Weighted cost of the whole kernel, divergent instructions doubled.
    pub total_cost: u64,
    /// Weighted cost of the divergent instructions alone.
    pub divergent_cost: u64,
    /// Extra work introduced by coarsening.
    pub duplication_cost: u64,
}

impl fmt::Display for BenefitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}-level x{} stride {} along {}: total {}, divergent {}, duplication {}",
            self.function,
            self.level,
            self.factor,
            self.stride,
            self.dimension,
            self.total_cost,
            self.divergent_cost,
            self.duplication_cost
        )
    }
}

/// Applies a [`CostTable`] to kernels.
#[derive(Clone, Debug, Default)]
pub struct BenefitEstimator {
    table: CostTable,
}

impl BenefitEstimator {
    pub fn new(table: CostTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &CostTable {
        &self.table
    }

    /// Unweighted cost of one instruction.
    pub fn instruction_cost(&self, func: &Function, inst: InstId, divergent: bool) -> u64 {
        let table = &self.table;
        match func.kind(inst) {
            InstKind::Phi { .. } => 0,
            InstKind::Binary { op, rhs, .. } => match op {
                BinOp::UDiv | BinOp::SDiv => table.div_cost(rhs.as_const()),
                BinOp::URem | BinOp::SRem => table.mod_cost(rhs.as_const()),
                _ => table.default,
            },
            InstKind::Load { .. } => table.load,
            InstKind::Store { .. } => table.store,
            InstKind::CondBr { .. } if divergent => table.divergent_branch,
            InstKind::Call { callee, .. } if is_math_function(callee) => table.math_function,
            _ => table.default,
        }
    }

    /// Product of the known trip counts of the loops enclosing `block`.
    pub fn loop_weight(&self, func: &Function, analyses: &FunctionAnalyses, block: BlockId) -> u64 {
        analyses
            .loops
            .enclosing(block)
            .into_iter()
            .map(|id| analyses.loops.trip_count(func, id).unwrap_or(1).max(1))
            .fold(1u64, u64::saturating_mul)
    }

    fn weighted_cost(&self, func: &Function, analyses: &FunctionAnalyses, inst: InstId, divergent: bool) -> u64 {
        let Some(block) = func.block_of(inst) else {
            return 0;
        };
        self.instruction_cost(func, inst, divergent)
            .saturating_mul(self.loop_weight(func, analyses, block))
    }

    /// Weighted cost of every instruction, divergent ones counted twice.
    pub fn total_cost(&self, func: &Function, analyses: &FunctionAnalyses, divergence: &DivergenceAnalysis) -> u64 {
        func.instructions()
            .map(|inst| {
                let divergent = divergence.is_divergent(inst);
                let cost = self.weighted_cost(func, analyses, inst, divergent);
                if divergent {
                    cost.saturating_mul(2)
                } else {
                    cost
                }
            })
            .fold(0, u64::saturating_add)
    }

    /// Weighted cost of the divergent instructions.
    pub fn divergent_cost(&self, func: &Function, analyses: &FunctionAnalyses, divergence: &DivergenceAnalysis) -> u64 {
        divergence
            .instructions()
            .iter()
            .map(|&inst| self.weighted_cost(func, analyses, inst, true))
            .fold(0, u64::saturating_add)
    }

    /// Work added by coarsening `factor` ways at `stride`: scaling every
    /// extent read, recomputing every identity read, deriving the
    /// `factor - 1` sibling identities, and replicating divergent work.
    pub fn duplication_cost(
        &self,
        grid: &GridAnalysis,
        divergent_cost: u64,
        level: Level,
        dim: Dimension,
        factor: u32,
        stride: u32,
    ) -> u64 {
        let table = &self.table;
        let extra = u64::from(factor.saturating_sub(1));
        let stride = Some(i64::from(stride));
        let sizes = grid.sizes(level, dim).len() as u64;
        let ids = grid.ids(level, dim).len() as u64;

        let scale = sizes.saturating_mul(table.default);
        let per_id = table.div_cost(stride) + table.default + table.mod_cost(stride) + table.default;
        let recompute = ids.saturating_mul(per_id);
        let siblings = ids.saturating_mul(extra).saturating_mul(table.default);
        let replicate = divergent_cost.saturating_mul(extra);

        scale
            .saturating_add(recompute)
            .saturating_add(siblings)
            .saturating_add(replicate)
    }

    /// Full report for one configuration, logged at info level.
    pub fn estimate(
        &self,
        func: &Function,
        analyses: &FunctionAnalyses,
        grid: &GridAnalysis,
        divergence: &DivergenceAnalysis,
        factor: u32,
        stride: u32,
    ) -> BenefitReport {
        let level = divergence.level();
        let dimension = divergence.dimension();
        let total_cost = self.total_cost(func, analyses, divergence);
        let divergent_cost = self.divergent_cost(func, analyses, divergence);
        let duplication_cost = self.duplication_cost(grid, divergent_cost, level, dimension, factor, stride);
        let report = BenefitReport {
            function: func.name.clone(),
            level,
            dimension,
            factor,
            stride,
            total_cost,
            divergent_cost,
            duplication_cost,
        };
        info!(
            function = %report.function,
            total = report.total_cost,
            divergent = report.divergent_cost,
            duplication = report.duplication_cost,
            "benefit estimate"
        );
        report
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
