//! Driving thread and block coarsening over whole modules.
//!
//! - [`config`]: the coarsening configuration and its command-line form.
//! - [`pass`]: the module pass (kernel discovery, static and dynamic mode,
//!   host launch rewriting).
//! - [`dispatch`]: launch-time selection of a pre-coarsened variant.
//!
//! The `coarsen` binary reads a module from JSON, runs the pass and writes
//! the result.

pub mod config;
pub mod dispatch;
pub mod pass;

pub use config::{CoarseningConfig, ConfigError, EmitFormat, KernelSelector, Mode};
pub use dispatch::{
    Dim3, DispatchConfig, DispatchError, KernelRegistry, Launch, CONFIG_VAR,
};
pub use pass::{
    CoarseningPass, KernelSummary, PassError, PassOutcome, DISPATCH_SYMBOL, LAUNCH_ARITY,
    LAUNCH_SYMBOL,
};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install the tracing subscriber.
///
/// Does nothing unless `RUST_LOG` is set, e.g.
/// `RUST_LOG=coarsen_transform=debug`. Safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(
                    tracing_tree::HierarchicalLayer::new(2)
                        .with_writer(std::io::stderr)
                        .with_targets(true)
                        .with_bracketed_fields(true),
                )
                .with(filter)
                .init();
        }
    });
}
