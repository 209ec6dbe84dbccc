//! The per-kernel coarsening pipeline.

use rustc_hash::FxHashSet;
use tracing::{debug, info};

use coarsen_analysis::{
    BenefitEstimator, BenefitReport, Dimension, DimensionSelector, DivergenceAnalysis,
    GridAnalysis, Level, RegionError,
};
use coarsen_ir::{verify_function, Function, FunctionAnalyses, GlobalId, InstKind};

use crate::engine::{CoarseningEngine, EngineStats};
use crate::error::KernelError;
use crate::extract::extract_regions;
use crate::grid_rewrite::scale_kernel_grid;

/// How one kernel is coarsened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CoarseningParams {
    pub level: Level,
    pub dim: Dimension,
    pub factor: u32,
    pub stride: u32,
}

impl CoarseningParams {
    pub fn validate(&self) -> Result<(), KernelError> {
        if self.factor < 2 {
            return Err(KernelError::InvalidFactor(self.factor));
        }
        if self.stride == 0 {
            return Err(KernelError::InvalidStride);
        }
        Ok(())
    }
}

/// A coarsened kernel and what it took to produce it.
#[derive(Clone, Debug)]
pub struct KernelOutcome {
    pub function: Function,
    /// Present when an estimator was supplied.
    pub report: Option<BenefitReport>,
    pub stats: EngineStats,
}

/// Coarsen `func`, returning the rewritten copy.
///
/// `shared` lists the module's shared-memory globals. The input is never
/// modified: on error there is nothing to roll back.
pub fn coarsen_kernel(
    func: &Function,
    shared: &FxHashSet<GlobalId>,
    params: &CoarseningParams,
    estimator: Option<&BenefitEstimator>,
) -> Result<KernelOutcome, KernelError> {
    params.validate()?;
    let CoarseningParams {
        level,
        dim,
        factor,
        stride,
    } = *params;
    let selector = DimensionSelector::Only(dim);
    let mut work = func.clone();

    let analyses = FunctionAnalyses::compute(&work);
    let grid = GridAnalysis::compute(&work, selector);
    let divergence = DivergenceAnalysis::analyze(&work, &analyses, &grid, shared, level, dim)?;
    let mut regions = divergence.regions().to_vec();
    extract_regions(&mut work, &mut regions)?;

    let analyses = FunctionAnalyses::compute(&work);
    let grid = GridAnalysis::compute(&work, selector);
    let divergence = DivergenceAnalysis::analyze(&work, &analyses, &grid, shared, level, dim)?;
    for region in divergence.outermost_regions() {
        region.check_bounds(&work, &analyses)?;
        let exiting = region.exiting();
        let unconditional = work
            .terminator(exiting)
            .is_some_and(|term| matches!(work.kind(term), InstKind::Br { .. }));
        if !unconditional {
            return Err(RegionError::ExitingNotUnconditional {
                function: work.name.clone(),
                exiting: work.block_label(exiting),
            }
            .into());
        }
    }

    let report = estimator.map(|estimator| {
        estimator.estimate(&work, &analyses, &grid, &divergence, factor, stride)
    });

    let map = scale_kernel_grid(&mut work, &grid, level, dim, factor, stride)?;
    let mut engine = CoarseningEngine::new(&divergence, map, factor);
    engine.coarsen(&mut work)?;
    engine.replace_placeholders(&mut work);
    let stats = engine.stats();
    debug!(
        function = %work.name,
        coarsened = engine.map().len(),
        unresolved = stats.placeholders_unresolved,
        "resolved placeholders"
    );

    verify_function(&work).map_err(|source| KernelError::Verify {
        function: work.name.clone(),
        source,
    })?;

    info!(
        function = %work.name,
        %level,
        %dim,
        factor,
        stride,
        instructions = stats.replicated_instructions,
        regions = stats.replicated_regions,
        "coarsened kernel"
    );
    Ok(KernelOutcome {
        function: work,
        report,
        stats,
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
