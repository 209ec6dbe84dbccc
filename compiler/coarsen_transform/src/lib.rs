//! Thread and block coarsening.
//!
//! Coarsening by a factor `N` makes one physical thread (or block) do the
//! work of `N` logical ones. For one kernel the pipeline is:
//!
//! 1. [`extract`]: normalize every divergent region so its header holds
//!    only the divergent branch and its exiting block holds only phis and
//!    an unconditional branch.
//! 2. [`grid_rewrite`]: shrink the grid by `N` and recompute the identity
//!    of every logical thread from the physical one.
//! 3. [`engine`]: replicate divergent instructions and divergent regions
//!    `N - 1` times, wiring each copy to the matching logical identity.
//!
//! [`coarsen_kernel`] runs all three on a working copy of the kernel.
//! [`naming`] and [`variants`] name and enumerate the pre-coarsened
//! variants emitted for launch-time selection.

pub mod engine;
mod error;
pub mod extract;
pub mod grid_rewrite;
mod kernel;
pub mod maps;
pub mod naming;
pub mod variants;

pub use engine::{CoarseningEngine, EngineStats};
pub use error::KernelError;
pub use extract::extract_regions;
pub use grid_rewrite::scale_kernel_grid;
pub use kernel::{coarsen_kernel, CoarseningParams, KernelOutcome};
pub use maps::{CloneList, CoarseningMap, PlaceholderMap};
pub use naming::{base_name, named_kernel_version, variant_suffix};
pub use variants::{VariantCatalog, VariantConfig};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod test_helpers;
