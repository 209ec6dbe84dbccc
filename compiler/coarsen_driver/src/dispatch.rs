//! Launch-time variant selection for dynamic mode.
//!
//! Host launches in a dynamically coarsened program go through a dispatcher.
//! At every launch it reads the [`CONFIG_VAR`] environment value
//!
//! ```text
//! <kernel>,<x|y|z>,<block|thread>,<factor>,<stride>
//! ```
//!
//! looks up the matching pre-coarsened variant in a [`KernelRegistry`] and
//! shrinks the launch geometry along the chosen dimension. When anything
//! does not line up, the original kernel is launched with the original
//! geometry.

use std::fmt;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use coarsen_analysis::{Dimension, Level};
use coarsen_ir::{AnnotationCache, Module};
use coarsen_transform::{base_name, VariantConfig};

/// Environment variable holding the launch-time configuration.
pub const CONFIG_VAR: &str = "RPC_CONFIG";

/// A launch extent along x, y and z.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dim3 {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dim3 {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub fn get(self, dim: Dimension) -> u32 {
        match dim {
            Dimension::X => self.x,
            Dimension::Y => self.y,
            Dimension::Z => self.z,
        }
    }

    #[must_use]
    pub fn with(mut self, dim: Dimension, value: u32) -> Self {
        match dim {
            Dimension::X => self.x = value,
            Dimension::Y => self.y = value,
            Dimension::Z => self.z = value,
        }
        self
    }

    /// Total number of elements.
    pub fn volume(self) -> u64 {
        u64::from(self.x) * u64::from(self.y) * u64::from(self.z)
    }
}

impl fmt::Display for Dim3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Why the original kernel is launched instead of a variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("{CONFIG_VAR} is not set")]
    Unset,

    #[error("expected 5 comma-separated fields, found {0}")]
    FieldCount(usize),

    #[error("kernel name is empty")]
    EmptyKernel,

    #[error("unknown dimension `{0}`")]
    UnknownDimension(String),

    #[error("unknown level `{0}`, expected block or thread")]
    UnknownLevel(String),

    #[error("`{value}` is not a valid {field}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("coarsening factor must be at least 2, got {0}")]
    InvalidFactor(u32),

    #[error("coarsening stride must be at least 1")]
    InvalidStride,

    #[error("configured for `{configured}`, launching `{launched}`")]
    KernelMismatch { configured: String, launched: String },

    #[error("no registered variant `{0}`")]
    UnknownVariant(String),

    #[error("stride {stride} exceeds {extent} threads / factor {factor}")]
    StrideTooLarge { stride: u32, extent: u32, factor: u32 },

    #[error("extent {extent} is not a multiple of factor {factor}")]
    Indivisible { extent: u32, factor: u32 },

    #[error("extent {extent} shrinks to zero under factor {factor}")]
    ScaledToZero { extent: u32, factor: u32 },
}

/// A parsed [`CONFIG_VAR`] value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Demangled base name of the kernel to coarsen.
    pub kernel: String,
    pub dim: Dimension,
    pub level: Level,
    pub factor: u32,
    pub stride: u32,
}

impl DispatchConfig {
    pub fn parse(text: &str) -> Result<Self, DispatchError> {
        let fields: Vec<&str> = text.split(',').map(str::trim).collect();
        let [kernel, dim, level, factor, stride] = fields[..] else {
            return Err(DispatchError::FieldCount(fields.len()));
        };
        if kernel.is_empty() {
            return Err(DispatchError::EmptyKernel);
        }
        let dim = Dimension::parse(dim)
            .ok_or_else(|| DispatchError::UnknownDimension(dim.to_owned()))?;
        let level =
            Level::parse(level).ok_or_else(|| DispatchError::UnknownLevel(level.to_owned()))?;
        let factor = parse_field("factor", factor)?;
        let stride = parse_field("stride", stride)?;
        if factor < 2 {
            return Err(DispatchError::InvalidFactor(factor));
        }
        if stride == 0 {
            return Err(DispatchError::InvalidStride);
        }
        Ok(Self {
            kernel: kernel.to_owned(),
            dim,
            level,
            factor,
            stride,
        })
    }

    /// Read and parse [`CONFIG_VAR`].
    pub fn from_env() -> Result<Self, DispatchError> {
        let value = std::env::var(CONFIG_VAR).map_err(|_| DispatchError::Unset)?;
        Self::parse(&value)
    }

    pub fn variant(&self) -> VariantConfig {
        VariantConfig {
            level: self.level,
            dim: self.dim,
            factor: self.factor,
            stride: self.stride,
        }
    }

    /// Demangled name of the selected variant, e.g. `vecAdd_0_1_4_2`.
    pub fn variant_name(&self) -> String {
        format!("{}{}", self.kernel, self.variant().suffix())
    }
}

fn parse_field(field: &'static str, value: &str) -> Result<u32, DispatchError> {
    value.parse().map_err(|_| DispatchError::InvalidNumber {
        field,
        value: value.to_owned(),
    })
}

/// One kernel launch: which symbol, on what geometry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Launch {
    pub kernel: String,
    pub grid: Dim3,
    pub block: Dim3,
}

/// Kernel symbols by demangled base name.
///
/// Registration and lookup may happen from any host thread.
#[derive(Default)]
pub struct KernelRegistry {
    kernels: RwLock<FxHashMap<String, String>>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `symbol` under its base name, replacing any previous entry.
    pub fn register(&self, symbol: &str) {
        let base = base_name(symbol);
        trace!(%base, symbol, "registered kernel");
        self.kernels.write().insert(base, symbol.to_owned());
    }

    /// Register every kernel of a device module.
    pub fn register_module(&self, module: &Module, cache: &AnnotationCache) -> usize {
        let mut count = 0;
        for func in &module.functions {
            if cache.is_kernel(module, func) {
                self.register(&func.name);
                count += 1;
            }
        }
        debug!(module = %module.name, count, "registered module kernels");
        count
    }

    pub fn lookup(&self, base: &str) -> Option<String> {
        self.kernels.read().get(base).cloned()
    }

    pub fn len(&self) -> usize {
        self.kernels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The coarsened form of `launch` under `config`.
    pub fn resolve(&self, config: &DispatchConfig, launch: &Launch) -> Result<Launch, DispatchError> {
        let launched = base_name(&launch.kernel);
        if launched != config.kernel {
            return Err(DispatchError::KernelMismatch {
                configured: config.kernel.clone(),
                launched,
            });
        }
        let name = config.variant_name();
        let symbol = self
            .lookup(&name)
            .ok_or(DispatchError::UnknownVariant(name))?;

        let DispatchConfig {
            dim, factor, stride, ..
        } = *config;
        let scaled = match config.level {
            Level::Thread => {
                let extent = launch.block.get(dim);
                if stride > extent / factor {
                    return Err(DispatchError::StrideTooLarge {
                        stride,
                        extent,
                        factor,
                    });
                }
                extent
            }
            Level::Block => launch.grid.get(dim),
        };
        if scaled / factor == 0 {
            return Err(DispatchError::ScaledToZero {
                extent: scaled,
                factor,
            });
        }
        if scaled % factor != 0 {
            return Err(DispatchError::Indivisible {
                extent: scaled,
                factor,
            });
        }

        let (grid, block) = match config.level {
            Level::Thread => (launch.grid, launch.block.with(dim, scaled / factor)),
            Level::Block => (launch.grid.with(dim, scaled / factor), launch.block),
        };
        Ok(Launch {
            kernel: symbol,
            grid,
            block,
        })
    }

    /// Pick what to launch given the raw configuration value, if any.
    pub fn dispatch(&self, config: Option<&str>, launch: Launch) -> Launch {
        let resolved = config
            .ok_or(DispatchError::Unset)
            .and_then(DispatchConfig::parse)
            .and_then(|config| self.resolve(&config, &launch));
        match resolved {
            Ok(coarsened) => {
                debug!(
                    kernel = %coarsened.kernel,
                    grid = %coarsened.grid,
                    block = %coarsened.block,
                    "launching coarsened variant"
                );
                coarsened
            }
            Err(reason) => {
                debug!(kernel = %launch.kernel, %reason, "launching original kernel");
                launch
            }
        }
    }

    /// [`dispatch`](Self::dispatch) with the value of [`CONFIG_VAR`].
    pub fn dispatch_from_env(&self, launch: Launch) -> Launch {
        let config = std::env::var(CONFIG_VAR).ok();
        self.dispatch(config.as_deref(), launch)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
