//! Coarsening configuration and its command-line surface.
//!
//! Arguments use the `--key=value` form; `-o <path>` takes its value from the
//! next argument. [`CoarseningConfig::parse_args`] rejects what it cannot
//! read, and [`CoarseningConfig::validate`] rejects combinations the pass
//! cannot run with.

use std::fmt;
use std::path::PathBuf;

use coarsen_analysis::{Dimension, Level};
use coarsen_transform::{base_name, CoarseningParams, KernelError, VariantCatalog};

/// What the pass produces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Replace each selected kernel with its thread-coarsened version.
    #[default]
    Thread,
    /// Replace each selected kernel with its block-coarsened version.
    Block,
    /// Keep the kernels, add every catalog variant next to them and route
    /// host launches through the dispatcher.
    Dynamic,
}

impl Mode {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "thread" => Some(Mode::Thread),
            "block" => Some(Mode::Block),
            "dynamic" => Some(Mode::Dynamic),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Thread => "thread",
            Mode::Block => "block",
            Mode::Dynamic => "dynamic",
        }
    }

    /// The coarsening level of a static mode; `None` for dynamic.
    pub fn level(self) -> Option<Level> {
        match self {
            Mode::Thread => Some(Level::Thread),
            Mode::Block => Some(Level::Block),
            Mode::Dynamic => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kernels the pass touches.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum KernelSelector {
    #[default]
    All,
    /// Kernels whose demangled base name is exactly this. An empty name
    /// selects everything but is only accepted in dynamic mode.
    Named(String),
}

impl KernelSelector {
    pub fn parse(text: &str) -> Self {
        if text == "all" {
            KernelSelector::All
        } else {
            KernelSelector::Named(text.to_owned())
        }
    }

    /// Does the kernel with symbol `symbol` match?
    pub fn matches(&self, symbol: &str) -> bool {
        match self {
            KernelSelector::All => true,
            KernelSelector::Named(name) => name.is_empty() || base_name(symbol) == *name,
        }
    }
}

/// Output format of the transformed module.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EmitFormat {
    #[default]
    Json,
    /// LLVM-like listing. Not read back.
    Text,
}

impl EmitFormat {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "json" => Some(EmitFormat::Json),
            "text" => Some(EmitFormat::Text),
            _ => None,
        }
    }
}

/// A configuration the pass cannot run with.
///
/// The pass reports these as diagnostics and leaves the module unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown option `{0}`")]
    UnknownOption(String),

    #[error("option `{0}` needs a value")]
    MissingValue(&'static str),

    #[error("unexpected argument `{0}`")]
    UnexpectedArgument(String),

    #[error("unknown dimension `{0}`, expected x, y or z")]
    UnknownDimension(String),

    #[error("unknown mode `{0}`, expected thread, block or dynamic")]
    UnknownMode(String),

    #[error("unknown emit format `{0}`, expected json or text")]
    UnknownEmit(String),

    #[error("`{value}` is not a valid value for {flag}")]
    InvalidNumber { flag: &'static str, value: String },

    #[error("coarsening factor must be at least 2, got {0}")]
    InvalidFactor(u32),

    #[error("coarsening stride must be at least 1")]
    InvalidStride,

    #[error("{mode} mode needs a kernel name")]
    EmptyKernelName { mode: Mode },

    #[error("dynamic mode needs at least one factor and one stride")]
    EmptyCatalog,

    #[error("launch in `{function}` passes {args} arguments, expected {expected}")]
    UnsupportedLaunch {
        function: String,
        args: usize,
        expected: usize,
    },
}

impl From<KernelError> for ConfigError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::InvalidFactor(factor) => ConfigError::InvalidFactor(factor),
            _ => ConfigError::InvalidStride,
        }
    }
}

/// Everything the pass and the CLI need to know.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoarseningConfig {
    /// Module file to read.
    pub input: Option<PathBuf>,
    pub kernel: KernelSelector,
    pub factor: u32,
    pub stride: u32,
    pub dim: Dimension,
    pub mode: Mode,
    /// Dynamic-mode catalog factors.
    pub factors: Vec<u32>,
    /// Dynamic-mode catalog strides.
    pub strides: Vec<u32>,
    pub output: Option<PathBuf>,
    pub emit: EmitFormat,
    /// Print the static cost estimate of every coarsened kernel.
    pub benefit: bool,
}

impl Default for CoarseningConfig {
    fn default() -> Self {
        let catalog = VariantCatalog::default();
        Self {
            input: None,
            kernel: KernelSelector::All,
            factor: 2,
            stride: 1,
            dim: Dimension::X,
            mode: Mode::Thread,
            factors: catalog.factors().to_vec(),
            strides: catalog.strides().to_vec(),
            output: None,
            emit: EmitFormat::Json,
            benefit: false,
        }
    }
}

impl CoarseningConfig {
    /// Parse command-line arguments (without the program name).
    pub fn parse_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut i = 0;
        while i < args.len() {
            let arg = args[i].as_str();
            if arg == "-o" {
                let path = args.get(i + 1).ok_or(ConfigError::MissingValue("-o"))?;
                config.output = Some(PathBuf::from(path));
                i += 2;
                continue;
            }

            if let Some(name) = arg.strip_prefix("--kernel=") {
                config.kernel = KernelSelector::parse(name);
            } else if let Some(value) = arg.strip_prefix("--factor=") {
                config.factor = parse_number("--factor", value)?;
            } else if let Some(value) = arg.strip_prefix("--stride=") {
                config.stride = parse_number("--stride", value)?;
            } else if let Some(value) = arg.strip_prefix("--dimension=") {
                config.dim = Dimension::parse(value)
                    .ok_or_else(|| ConfigError::UnknownDimension(value.to_owned()))?;
            } else if let Some(value) = arg.strip_prefix("--mode=") {
                config.mode =
                    Mode::parse(value).ok_or_else(|| ConfigError::UnknownMode(value.to_owned()))?;
            } else if let Some(value) = arg.strip_prefix("--factors=") {
                config.factors = parse_list("--factors", value)?;
            } else if let Some(value) = arg.strip_prefix("--strides=") {
                config.strides = parse_list("--strides", value)?;
            } else if let Some(value) = arg.strip_prefix("--output=") {
                config.output = Some(PathBuf::from(value));
            } else if let Some(value) = arg.strip_prefix("--emit=") {
                config.emit = EmitFormat::parse(value)
                    .ok_or_else(|| ConfigError::UnknownEmit(value.to_owned()))?;
            } else if arg == "--benefit" {
                config.benefit = true;
            } else if arg.starts_with('-') {
                return Err(ConfigError::UnknownOption(arg.to_owned()));
            } else if config.input.is_none() {
                config.input = Some(PathBuf::from(arg));
            } else {
                return Err(ConfigError::UnexpectedArgument(arg.to_owned()));
            }
            i += 1;
        }
        Ok(config)
    }

    /// Check the settings the selected mode depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.mode {
            Mode::Thread | Mode::Block => {
                if self.kernel == KernelSelector::Named(String::new()) {
                    return Err(ConfigError::EmptyKernelName { mode: self.mode });
                }
                self.params().map(|_| ())
            }
            Mode::Dynamic => self.catalog().map(|_| ()),
        }
    }

    /// Parameters of a static mode.
    pub fn params(&self) -> Result<CoarseningParams, ConfigError> {
        let params = CoarseningParams {
            level: self.mode.level().unwrap_or(Level::Thread),
            dim: self.dim,
            factor: self.factor,
            stride: self.stride,
        };
        params.validate()?;
        Ok(params)
    }

    /// The dynamic-mode variant catalog.
    pub fn catalog(&self) -> Result<VariantCatalog, ConfigError> {
        let catalog = VariantCatalog::new(&self.factors, &self.strides)?;
        if catalog.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        Ok(catalog)
    }
}

fn parse_number(flag: &'static str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        flag,
        value: value.to_owned(),
    })
}

fn parse_list(flag: &'static str, value: &str) -> Result<Vec<u32>, ConfigError> {
    value
        .split(',')
        .filter(|item| !item.trim().is_empty())
        .map(|item| parse_number(flag, item))
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
