// SPDX-License-Identifier: BSD-3-Clause
use std::io::{self, Write};

use anyhow::{Context, Error, Result};
use clap::Parser;

use funcptr::analysis::{pointer, report};
use funcptr::llvm;

mod cli;

fn main() -> Result<()> {
    let args = cli::Args::parse();

    // Diagnostics go to stderr; the report on stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(if args.tracing {
            tracing::Level::TRACE
        } else {
            tracing::Level::WARN
        })
        .init();

    let is_textual = args.module.extension().is_some_and(|e| e == "ll");
    let llvm_module = if is_textual {
        llvm_ir::Module::from_ir_path(&args.module)
    } else {
        llvm_ir::Module::from_bc_path(&args.module)
    }
    .map_err(Error::msg)
    .with_context(|| format!("Couldn't parse LLVM module at {}", args.module.display()))?;

    let program = llvm::lower(&llvm_module).context("Malformed LLVM module")?;

    let opts = pointer::Options {
        max_sweeps: args.max_sweeps,
    };
    let outs = pointer::analysis(&program, &opts).context("Points-to analysis failed")?;
    let report = report::report(&program, &outs.facts)?;

    let mut stdout = io::stdout().lock();
    if !args.quiet {
        write!(stdout, "{}", report)?;
    }
    if args.metrics {
        writeln!(stdout)?;
        writeln!(stdout, "metrics")?;
        writeln!(stdout, "-------")?;
        writeln!(stdout, "sweeps: {}", outs.sweeps)?;
        writeln!(stdout, "tracked sites: {}", outs.facts.len())?;
    }

    Ok(())
}
