//! The module-level coarsening pass.
//!
//! Device modules get their kernels coarsened: in a static mode each
//! selected kernel is replaced by its coarsened version; in dynamic mode every
//! catalog variant is added next to the original and annotated as a kernel.
//! Host modules have their runtime launch calls checked and, in dynamic mode,
//! redirected to the dispatcher.

use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

use coarsen_analysis::{BenefitEstimator, BenefitReport};
use coarsen_ir::{AnnotationCache, Function, GlobalId, InstId, InstKind, Module, KERNEL_KEY};
use coarsen_transform::{coarsen_kernel, CoarseningParams, EngineStats, KernelError};

use crate::config::{CoarseningConfig, ConfigError, Mode};

/// Runtime entry point the host calls to launch a kernel.
pub const LAUNCH_SYMBOL: &str = "cudaLaunchKernel";

/// Dispatcher entry point that replaces [`LAUNCH_SYMBOL`] in dynamic mode.
pub const DISPATCH_SYMBOL: &str = "rpcLaunchKernel";

/// `(func, gridDim, blockDim, args, sharedMem, stream)`.
pub const LAUNCH_ARITY: usize = 6;

/// A kernel the pass could not coarsen. Fatal for the whole module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot coarsen kernel `{kernel}`: {source}")]
pub struct PassError {
    pub kernel: String,
    #[source]
    pub source: KernelError,
}

/// One emitted kernel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelSummary {
    /// Symbol of the kernel it was derived from.
    pub kernel: String,
    /// Symbol it was emitted under.
    pub symbol: String,
    pub stats: EngineStats,
}

/// What a pass run did to a module.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassOutcome {
    pub changed: bool,
    pub kernels: Vec<KernelSummary>,
    /// Cost estimates, when the pass runs with an estimator.
    pub reports: Vec<BenefitReport>,
    /// Launch calls found in a host module.
    pub launches: usize,
    /// Launch calls routed through the dispatcher.
    pub redirected: usize,
    pub diagnostics: Vec<ConfigError>,
}

impl PassOutcome {
    fn rejected(err: ConfigError) -> Self {
        warn!(%err, "module left unchanged");
        Self {
            diagnostics: vec![err],
            ..Self::default()
        }
    }
}

/// Coarsens the kernels of a module according to a [`CoarseningConfig`].
pub struct CoarseningPass<'a> {
    config: &'a CoarseningConfig,
    annotations: &'a AnnotationCache,
    estimator: Option<BenefitEstimator>,
}

impl<'a> CoarseningPass<'a> {
    /// Estimates costs when `config.benefit` is set.
    pub fn new(config: &'a CoarseningConfig, annotations: &'a AnnotationCache) -> Self {
        Self {
            config,
            annotations,
            estimator: config.benefit.then(BenefitEstimator::default),
        }
    }

    #[must_use]
    pub fn with_estimator(mut self, estimator: BenefitEstimator) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn run(&self, module: &mut Module) -> Result<PassOutcome, PassError> {
        if let Err(err) = self.config.validate() {
            return Ok(PassOutcome::rejected(err));
        }
        if module.is_device() {
            self.run_device(module)
        } else {
            Ok(self.run_host(module))
        }
    }

    /// Indices of the kernels the selector picks, in module order.
    fn selected_kernels(&self, module: &Module) -> Vec<usize> {
        module
            .functions
            .iter()
            .enumerate()
            .filter(|(_, func)| {
                self.annotations.is_kernel(module, func) && self.config.kernel.matches(&func.name)
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    fn run_device(&self, module: &mut Module) -> Result<PassOutcome, PassError> {
        let selected = self.selected_kernels(module);
        if selected.is_empty() {
            info!(module = %module.name, "no kernel to coarsen");
            return Ok(PassOutcome::default());
        }
        debug!(module = %module.name, kernels = selected.len(), mode = %self.config.mode, "coarsening module");

        let shared = module.shared_globals();
        let mut outcome = PassOutcome::default();
        match self.config.mode {
            Mode::Thread | Mode::Block => {
                let params = match self.config.params() {
                    Ok(params) => params,
                    Err(err) => return Ok(PassOutcome::rejected(err)),
                };
                let mut replacements = Vec::with_capacity(selected.len());
                for idx in selected {
                    let (coarsened, stats) =
                        self.coarsen(&module.functions[idx], &shared, &params, &mut outcome)?;
                    outcome.kernels.push(KernelSummary {
                        kernel: coarsened.name.clone(),
                        symbol: coarsened.name.clone(),
                        stats,
                    });
                    replacements.push((idx, coarsened));
                }
                // Nothing is written back until every kernel succeeded.
                for (idx, coarsened) in replacements {
                    module.functions[idx] = coarsened;
                }
            }
            Mode::Dynamic => {
                let catalog = match self.config.catalog() {
                    Ok(catalog) => catalog,
                    Err(err) => return Ok(PassOutcome::rejected(err)),
                };
                let mut variants = Vec::with_capacity(selected.len() * catalog.len());
                for idx in selected {
                    let func = &module.functions[idx];
                    for variant in catalog.iter() {
                        let params = CoarseningParams {
                            level: variant.level,
                            dim: variant.dim,
                            factor: variant.factor,
                            stride: variant.stride,
                        };
                        let (mut coarsened, stats) =
                            self.coarsen(func, &shared, &params, &mut outcome)?;
                        coarsened.name = variant.symbol(&func.name);
                        outcome.kernels.push(KernelSummary {
                            kernel: func.name.clone(),
                            symbol: coarsened.name.clone(),
                            stats,
                        });
                        variants.push(coarsened);
                    }
                }
                for variant in variants {
                    module.annotate(variant.name.clone(), KERNEL_KEY, 1);
                    module.add_function(variant);
                }
                // The annotation list grew.
                self.annotations.evict(module.id());
            }
        }

        outcome.changed = !outcome.kernels.is_empty();
        info!(
            module = %module.name,
            emitted = outcome.kernels.len(),
            "coarsened module"
        );
        Ok(outcome)
    }

    fn coarsen(
        &self,
        func: &Function,
        shared: &FxHashSet<GlobalId>,
        params: &CoarseningParams,
        outcome: &mut PassOutcome,
    ) -> Result<(Function, EngineStats), PassError> {
        let result = coarsen_kernel(func, shared, params, self.estimator.as_ref()).map_err(
            |source| PassError {
                kernel: func.name.clone(),
                source,
            },
        )?;
        if let Some(report) = result.report {
            outcome.reports.push(report);
        }
        Ok((result.function, result.stats))
    }

    fn run_host(&self, module: &mut Module) -> PassOutcome {
        let mut launches: Vec<(usize, InstId)> = Vec::new();
        for (idx, func) in module.functions.iter().enumerate() {
            for inst in func.instructions() {
                let InstKind::Call { callee, args } = func.kind(inst) else {
                    continue;
                };
                if callee != LAUNCH_SYMBOL {
                    continue;
                }
                if args.len() != LAUNCH_ARITY {
                    return PassOutcome::rejected(ConfigError::UnsupportedLaunch {
                        function: func.name.clone(),
                        args: args.len(),
                        expected: LAUNCH_ARITY,
                    });
                }
                launches.push((idx, inst));
            }
        }
        if launches.is_empty() {
            debug!(module = %module.name, "no kernel launches");
            return PassOutcome::default();
        }

        let mut outcome = PassOutcome {
            launches: launches.len(),
            ..PassOutcome::default()
        };
        if self.config.mode != Mode::Dynamic {
            info!(
                module = %module.name,
                launches = outcome.launches,
                "launch geometry is left to the caller"
            );
            return outcome;
        }

        for &(idx, inst) in &launches {
            if let InstKind::Call { callee, .. } = &mut module.functions[idx].inst_mut(inst).kind {
                DISPATCH_SYMBOL.clone_into(callee);
            }
        }
        if module.function(DISPATCH_SYMBOL).is_none() {
            if let Some(launch) = module.function(LAUNCH_SYMBOL) {
                let decl = Function::new(DISPATCH_SYMBOL, launch.params.clone(), launch.ret_ty);
                module.add_function(decl);
            }
        }
        outcome.redirected = launches.len();
        outcome.changed = true;
        info!(
            module = %module.name,
            redirected = outcome.redirected,
            "routed launches through the dispatcher"
        );
        outcome
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
