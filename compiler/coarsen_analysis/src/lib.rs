//! Analyses behind thread and block coarsening.
//!
//! - [`grid`] finds the calls that read thread/block identity and extent.
//! - [`divergence`] propagates identity dependence through data flow and
//!   control dependence, yielding divergent instructions and branches.
//! - [`region`] turns each divergent branch into a single-entry/single-exit
//!   [`DivergentRegion`].
//! - [`benefit`] estimates the static cost of a kernel and of coarsening it.
//!
//! Every analysis reads a [`coarsen_ir::Function`] and never mutates it.

pub mod benefit;
pub mod divergence;
pub mod grid;
pub mod region;

pub use benefit::{BenefitEstimator, BenefitReport, CostTable};
pub use divergence::DivergenceAnalysis;
pub use grid::{classify_builtin, is_shuffle, Dimension, DimensionSelector, GridAnalysis, GridVar, Level};
pub use region::{
    build_regions, clean_up_regions, outermost_region_indices, region_bounds, DivergentRegion,
    RegionError,
};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod test_helpers;
