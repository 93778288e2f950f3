// SPDX-License-Identifier: BSD-3-Clause
//! Function-pointer points-to analysis for LLVM bitcode: computes, for each
//! indirect call site in a module, the conservative set of functions it may
//! invoke at runtime, and reports the result per source line.

pub mod analysis;
pub mod ir;
pub mod llvm;

pub use analysis::facts::{FactStore, PointsToSet, Site};
pub use analysis::Error;
pub use ir::{ArgId, CallId, Callee, FuncId, PhiId, Program, ProgramBuilder, Value};
