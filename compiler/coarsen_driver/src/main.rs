//! Coarsening CLI
//!
//! Reads a module as JSON, coarsens its kernels and writes the result.

use std::path::Path;

use coarsen_driver::{
    init_tracing, CoarseningConfig, CoarseningPass, EmitFormat, PassOutcome,
};
use coarsen_ir::{AnnotationCache, Module};

fn main() {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }
    match args[1].as_str() {
        "help" | "--help" | "-h" => {
            print_usage();
            return;
        }
        "version" | "--version" | "-V" => {
            println!("coarsen {}", env!("CARGO_PKG_VERSION"));
            return;
        }
        _ => {}
    }

    let config = match CoarseningConfig::parse_args(&args[1..]) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!("Run `coarsen help` for usage.");
            std::process::exit(1);
        }
    };
    let Some(input) = config.input.as_deref() else {
        eprintln!("error: missing module path");
        eprintln!("Usage: coarsen <module.json> [options]");
        std::process::exit(1);
    };

    let mut module = match read_module(input) {
        Ok(module) => module,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    let cache = AnnotationCache::new();
    let outcome = match CoarseningPass::new(&config, &cache).run(&mut module) {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };
    report(&config, &outcome);

    let rendered = match config.emit {
        EmitFormat::Json => match serde_json::to_string_pretty(&module) {
            Ok(json) => json,
            Err(err) => {
                eprintln!("error: cannot serialize module: {err}");
                std::process::exit(1);
            }
        },
        EmitFormat::Text => module.to_string(),
    };
    match &config.output {
        Some(path) => {
            if let Err(err) = std::fs::write(path, rendered) {
                eprintln!("error: cannot write '{}': {err}", path.display());
                std::process::exit(1);
            }
        }
        None => println!("{rendered}"),
    }
}

fn read_module(path: &Path) -> Result<Module, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| format!("cannot read '{}': {err}", path.display()))?;
    serde_json::from_str(&text).map_err(|err| format!("'{}' is not a module: {err}", path.display()))
}

/// Diagnostics and statistics go to stderr so stdout stays the module.
fn report(config: &CoarseningConfig, outcome: &PassOutcome) {
    for diagnostic in &outcome.diagnostics {
        eprintln!("warning: {diagnostic}; module left unchanged");
    }
    for kernel in &outcome.kernels {
        eprintln!(
            "coarsened {} -> {}: {} instructions, {} regions",
            kernel.kernel,
            kernel.symbol,
            kernel.stats.replicated_instructions,
            kernel.stats.replicated_regions
        );
    }
    if outcome.redirected > 0 {
        eprintln!("redirected {} kernel launches", outcome.redirected);
    }
    if config.benefit {
        for report in &outcome.reports {
            eprintln!("benefit: {report}");
        }
    }
}

fn print_usage() {
    println!("GPU thread/block coarsening");
    println!();
    println!("Usage: coarsen <module.json> [options]");
    println!();
    println!("Options:");
    println!("  --kernel=<name|all>      Kernel to coarsen, by demangled name (default: all)");
    println!("  --factor=<n>             Coarsening factor, at least 2 (default: 2)");
    println!("  --stride=<n>             Distance between merged ids (default: 1)");
    println!("  --dimension=<x|y|z>      Dimension to coarsen (default: x)");
    println!("  --mode=<mode>            thread, block or dynamic (default: thread)");
    println!("  --factors=<a,b,..>       Dynamic mode factors (default: 2,4,8,16)");
    println!("  --strides=<a,b,..>       Dynamic mode strides (default: 1,2,4,8)");
    println!("  --emit=<json|text>       Output format (default: json)");
    println!("  --benefit                Print the estimated cost of each kernel");
    println!("  -o <path>                Output file (default: stdout)");
    println!();
    println!("Commands:");
    println!("  help                     Show this help message");
    println!("  version                  Show version information");
}
