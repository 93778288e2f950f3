// SPDX-License-Identifier: BSD-3-Clause
use std::path::PathBuf;

/// Function-pointer points-to analysis for LLVM bitcode
#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// LLVM module (`.bc` bitcode or `.ll` assembly), already in SSA form
    /// with promoted allocas (e.g. via `opt -passes=mem2reg`)
    #[arg()]
    pub module: PathBuf,

    /// Print sweep and site counts after the report
    #[arg(long)]
    pub metrics: bool,

    /// Suppress the report
    #[arg(long)]
    pub quiet: bool,

    /// Override the defensive sweep cap
    #[arg(long)]
    pub max_sweeps: Option<usize>,

    /// Verbose tracing
    #[arg(long)]
    pub tracing: bool,
}
