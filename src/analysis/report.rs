// SPDX-License-Identifier: BSD-3-Clause
//! Per-call-site report over the converged facts.

use std::fmt::Display;

use tracing::warn;

use crate::analysis::facts::FactStore;
use crate::analysis::{pointer, Error};
use crate::ir::{Program, Value};

/// One reportable call site: its source line and the distinct resolved callee
/// names, in first-discovery order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub line: u32,
    pub names: Vec<String>,
}

/// Records in program order, one per call site that has a source line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub records: Vec<Record>,
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for r in &self.records {
            writeln!(f, "{}: {}", r.line, r.names.join(", "))?;
        }
        Ok(())
    }
}

/// Resolve every non-debug call site against the converged store, using the
/// same resolution rule as the call transfer. Candidates that are not named
/// concrete functions are dropped. A call without a source line is an input
/// quality problem, not an analysis failure: it is logged and omitted.
pub fn report(program: &Program, facts: &FactStore) -> Result<Report, Error> {
    let mut records = Vec::new();
    for (id, call) in program.call_sites() {
        if call.is_debug {
            continue;
        }
        let candidates = pointer::callee_candidates(program, facts, id)?;
        let Some(line) = call.line else {
            warn!(call = %call.label, "no debug location, omitting call from report");
            continue;
        };
        let mut names: Vec<String> = Vec::new();
        for cand in candidates {
            let Value::Function(fid) = cand else {
                continue;
            };
            let name = &program.function(fid).name;
            if name.is_empty() {
                continue;
            }
            if !names.iter().any(|n| n == name) {
                names.push(name.clone());
            }
        }
        records.push(Record { line, names });
    }
    Ok(Report { records })
}
