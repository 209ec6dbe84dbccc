use coarsen_analysis::RegionError;
use coarsen_ir::VerifyError;

/// Why a kernel could not be coarsened.
///
/// Every variant is structural: the kernel is left untouched and the
/// failure is reported for the whole compilation unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    #[error(transparent)]
    Region(#[from] RegionError),

    #[error("coarsening factor must be at least 2, got {0}")]
    InvalidFactor(u32),

    #[error("coarsening stride must be at least 1")]
    InvalidStride,

    #[error("region headed by `{header}` in `{function}` has no single entry predecessor")]
    NoRegionPredecessor { function: String, header: String },

    #[error("region ending at `{exiting}` in `{function}` has no single exit")]
    NoRegionExit { function: String, exiting: String },

    #[error("`{function}` is malformed after coarsening: {source}")]
    Verify {
        function: String,
        #[source]
        source: VerifyError,
    },
}
