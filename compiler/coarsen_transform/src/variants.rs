//! The configuration space of dynamic-mode variants.
//!
//! In dynamic mode every kernel is compiled once per combination of level,
//! dimension, factor and stride, and the launch-time dispatcher picks one.

use coarsen_analysis::{Dimension, Level};

use crate::error::KernelError;
use crate::naming::{named_kernel_version, variant_suffix};

/// One point of the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VariantConfig {
    pub level: Level,
    pub dim: Dimension,
    pub factor: u32,
    pub stride: u32,
}

impl VariantConfig {
    /// Factor applied to the grid; 1 for thread-level variants.
    pub fn block_factor(&self) -> u32 {
        match self.level {
            Level::Block => self.factor,
            Level::Thread => 1,
        }
    }

    /// Factor applied to each block; 1 for block-level variants.
    pub fn thread_factor(&self) -> u32 {
        match self.level {
            Level::Thread => self.factor,
            Level::Block => 1,
        }
    }

    pub fn suffix(&self) -> String {
        variant_suffix(self.dim, self.block_factor(), self.thread_factor(), self.stride)
    }

    /// Symbol of this variant of `kernel`.
    pub fn symbol(&self, kernel: &str) -> String {
        named_kernel_version(
            kernel,
            self.dim,
            self.block_factor(),
            self.thread_factor(),
            self.stride,
        )
    }
}

/// Factors, strides, levels and dimensions to pre-compile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariantCatalog {
    factors: Vec<u32>,
    strides: Vec<u32>,
    levels: Vec<Level>,
    dims: Vec<Dimension>,
}

impl Default for VariantCatalog {
    fn default() -> Self {
        Self {
            factors: vec![2, 4, 8, 16],
            strides: vec![1, 2, 4, 8],
            levels: vec![Level::Thread, Level::Block],
            dims: vec![Dimension::X, Dimension::Y, Dimension::Z],
        }
    }
}

impl VariantCatalog {
    /// A catalog over every level and dimension.
    ///
    /// Duplicates are dropped; order is kept.
    pub fn new(factors: &[u32], strides: &[u32]) -> Result<Self, KernelError> {
        if let Some(&bad) = factors.iter().find(|&&factor| factor < 2) {
            return Err(KernelError::InvalidFactor(bad));
        }
        if strides.contains(&0) {
            return Err(KernelError::InvalidStride);
        }
        Ok(Self {
            factors: dedup(factors),
            strides: dedup(strides),
            ..Self::default()
        })
    }

    #[must_use]
    pub fn with_levels(mut self, levels: &[Level]) -> Self {
        self.levels = dedup(levels);
        self
    }

    #[must_use]
    pub fn with_dimensions(mut self, dims: &[Dimension]) -> Self {
        self.dims = dedup(dims);
        self
    }

    pub fn factors(&self) -> &[u32] {
        &self.factors
    }

    pub fn strides(&self) -> &[u32] {
        &self.strides
    }

    pub fn len(&self) -> usize {
        self.levels.len() * self.dims.len() * self.factors.len() * self.strides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every variant: levels outermost, then dimensions, factors, strides.
    pub fn iter(&self) -> impl Iterator<Item = VariantConfig> + '_ {
        self.levels.iter().flat_map(move |&level| {
            self.dims.iter().flat_map(move |&dim| {
                self.factors.iter().flat_map(move |&factor| {
                    self.strides.iter().map(move |&stride| VariantConfig {
                        level,
                        dim,
                        factor,
                        stride,
                    })
                })
            })
        })
    }
}

fn dedup<T: Copy + PartialEq>(items: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for &item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
