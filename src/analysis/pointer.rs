// SPDX-License-Identifier: BSD-3-Clause
//! Function-pointer points-to analysis.
//!
//! Flow- and context-insensitive: facts are merged over whole function
//! bodies and shared across all callers. Possible-callee facts propagate
//! through four channels, one transfer function each:
//!
//! - call sites bind actual arguments to callee parameters,
//! - call sites absorb the callee's possible return targets,
//! - phi nodes merge their incoming values,
//! - direct stores into a parameter's own backing storage seed that
//!   parameter's set.
//!
//! Stores through any other storage (locals, globals, fields) are unmodeled;
//! this matches the reference semantics and is a documented soundness
//! limitation, not a gap to close.
//!
//! The driver is chaotic iteration: full program sweeps until a sweep changes
//! no set. Every set is a subset of the finite universe of functions and
//! sites and only ever grows, so convergence is guaranteed; a defensive sweep
//! cap turns a non-terminating bug into a diagnostic.

use tracing::debug;

use crate::analysis::facts::{FactStore, Site};
use crate::analysis::Error;
use crate::ir::{ArgId, CallId, Callee, FuncId, Inst, PhiId, Program, Ret, Store, Value};

#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Override the defensive sweep cap.
    pub max_sweeps: Option<usize>,
}

#[derive(Debug)]
pub struct Outputs {
    /// The converged fact store.
    pub facts: FactStore,
    /// Sweeps taken to reach the fixpoint (including the final no-change
    /// sweep).
    pub sweeps: usize,
}

/// Run the analysis to its fixpoint.
pub fn analysis(program: &Program, opts: &Options) -> Result<Outputs, Error> {
    let mut facts = FactStore::new(program);
    let cap = opts
        .max_sweeps
        .unwrap_or_else(|| default_sweep_cap(program, &facts));
    let mut sweeps = 0;
    loop {
        if sweeps >= cap {
            return Err(Error::SweepLimit(cap));
        }
        sweeps += 1;
        if !sweep(program, &mut facts)? {
            break;
        }
    }
    debug!(sweeps, sites = facts.len(), "fixpoint reached");
    Ok(Outputs { facts, sweeps })
}

/// Total insertions are bounded by |sites| * |universe|, and every sweep
/// before convergence inserts at least one element.
fn default_sweep_cap(program: &Program, facts: &FactStore) -> usize {
    facts.len() * (program.num_functions() + facts.len()) + 1
}

/// One full pass of every transfer function over the whole program. Program
/// order within a sweep is irrelevant to the final result (monotonicity),
/// only to convergence speed. Returns whether any set changed.
pub fn sweep(program: &Program, facts: &mut FactStore) -> Result<bool, Error> {
    let mut changed = false;
    for (fid, f) in program.functions() {
        for b in &f.blocks {
            for inst in &b.insts {
                changed |= match inst {
                    Inst::Call(id) => transfer_call(program, facts, *id)?,
                    Inst::Phi(id) => transfer_phi(program, facts, *id)?,
                    Inst::Store(s) => transfer_store(facts, s)?,
                    Inst::Ret(_) | Inst::Other => false,
                };
            }
        }
        changed |= transfer_function(program, facts, fid)?;
    }
    Ok(changed)
}

/// Resolve a value to its current candidate set: a concrete function is the
/// singleton `{f}`, a tracked value contributes its site's set, and anything
/// else is outside the domain the analysis can reason about.
pub(crate) fn resolve(program: &Program, facts: &FactStore, v: Value) -> Result<Vec<Value>, Error> {
    match Site::of_value(v) {
        Some(site) => Ok(facts.get(site)?.iter().collect()),
        None => match v {
            Value::Function(_) => Ok(vec![v]),
            _ => Err(Error::UnexpectedValueKind(program.describe(v))),
        },
    }
}

/// The callee-candidate set of a call, per the resolution rule shared by the
/// call transfer and the report layer.
pub(crate) fn callee_candidates(
    program: &Program,
    facts: &FactStore,
    id: CallId,
) -> Result<Vec<Value>, Error> {
    match program.call_site(id).callee {
        Callee::Direct(f) => Ok(vec![Value::Function(f)]),
        Callee::Indirect(v) => resolve(program, facts, v),
    }
}

/// Merge the set a tracked value originates from into `dst`. Concrete
/// functions and opaque values have no set of their own and contribute
/// nothing here.
fn merge_value(facts: &mut FactStore, dst: Site, v: Value) -> Result<bool, Error> {
    match Site::of_value(v) {
        Some(src) => facts.merge_sites(dst, src),
        None => Ok(false),
    }
}

fn transfer_call(program: &Program, facts: &mut FactStore, id: CallId) -> Result<bool, Error> {
    let call = program.call_site(id);
    if call.is_debug {
        return Ok(false);
    }
    let candidates = callee_candidates(program, facts, id)?;
    let mut changed = false;
    for cand in candidates {
        // Non-function facts (e.g. a stored null that reached a callee set)
        // cannot be called; skip them like the reference does.
        let Value::Function(fid) = cand else {
            continue;
        };
        let callee = program.function(fid);
        for (index, param) in callee.params.iter().enumerate() {
            if !param.is_fn_ptr {
                continue;
            }
            // A candidate may declare more parameters than this call passes;
            // the extra positions bind nothing.
            let Some(&actual) = call.args.get(index) else {
                continue;
            };
            let dst = Site::Argument(ArgId {
                func: fid,
                index: index as u32,
            });
            changed |= match actual {
                Value::Function(_) => facts.add(dst, actual)?,
                _ => merge_value(facts, dst, actual)?,
            };
        }
        if callee.returns_fn_ptr {
            changed |= facts.merge_sites(Site::Call(id), Site::Function(fid))?;
        }
    }
    Ok(changed)
}

fn transfer_phi(program: &Program, facts: &mut FactStore, id: PhiId) -> Result<bool, Error> {
    let phi = program.phi_node(id);
    if !phi.is_fn_ptr {
        return Ok(false);
    }
    let mut changed = false;
    for inc in &phi.incoming {
        let v = inc.value;
        // Incoming values land in the set as-is, except phi results: chains
        // of phis are flattened solely through the merge below, so a phi
        // value never appears inside another phi's set.
        if !matches!(v, Value::Phi(_)) {
            changed |= facts.add(Site::Phi(id), v)?;
        }
        changed |= merge_value(facts, Site::Phi(id), v)?;
    }
    Ok(changed)
}

fn transfer_store(facts: &mut FactStore, store: &Store) -> Result<bool, Error> {
    if !store.dest_is_fn_ptr {
        return Ok(false);
    }
    // Only a parameter's own backing storage is modeled.
    let Value::Argument(arg) = store.dest else {
        return Ok(false);
    };
    facts.add(Site::Argument(arg), store.value)
}

fn transfer_function(program: &Program, facts: &mut FactStore, fid: FuncId) -> Result<bool, Error> {
    let f = program.function(fid);
    if !f.returns_fn_ptr {
        return Ok(false);
    }
    let mut changed = false;
    for b in &f.blocks {
        for inst in &b.insts {
            if let Inst::Ret(Ret { value: Some(v) }) = inst {
                for target in resolve(program, facts, *v)? {
                    changed |= facts.add(Site::Function(fid), target)?;
                }
            }
        }
    }
    Ok(changed)
}
