// SPDX-License-Identifier: BSD-3-Clause
//! The fact store: one grow-only points-to set per tracked site.

use std::fmt::Display;

use rustc_hash::FxHashMap;

use crate::analysis::Error;
use crate::ir::{ArgId, CallId, FuncId, Inst, PhiId, Program, Value};

/// A tracked analysis subject. `Function` stands for the function's
/// return-value set.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Site {
    Call(CallId),
    Phi(PhiId),
    Argument(ArgId),
    Function(FuncId),
}

impl Site {
    /// The site a tracked value's facts live at. `Function` values resolve to
    /// a singleton rather than a set and `Opaque` values are untracked, so
    /// neither has an origin site.
    pub fn of_value(v: Value) -> Option<Site> {
        match v {
            Value::Call(id) => Some(Site::Call(id)),
            Value::Phi(id) => Some(Site::Phi(id)),
            Value::Argument(id) => Some(Site::Argument(id)),
            Value::Function(_) | Value::Opaque => None,
        }
    }
}

impl Display for Site {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Site::Call(id) => write!(f, "call site #{}", id.0),
            Site::Phi(id) => write!(f, "phi #{}", id.0),
            Site::Argument(a) => write!(f, "argument {} of function #{}", a.index, a.func.0),
            Site::Function(id) => write!(f, "return set of function #{}", id.0),
        }
    }
}

/// Insertion-ordered set of values, deduplicated by identity. Order is not
/// significant for correctness, only for the report, which preserves
/// first-discovery order. Sets only grow.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PointsToSet {
    elems: Vec<Value>,
}

impl PointsToSet {
    pub fn contains(&self, v: Value) -> bool {
        self.elems.contains(&v)
    }

    /// Insert-if-absent; reports whether membership changed.
    pub fn insert(&mut self, v: Value) -> bool {
        if self.contains(v) {
            false
        } else {
            self.elems.push(v);
            true
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        self.elems.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Subset check, for the monotonicity property.
    pub fn is_subset_of(&self, other: &PointsToSet) -> bool {
        self.elems.iter().all(|v| other.contains(*v))
    }
}

/// Mutable mapping from each tracked site to its points-to set. Registered in
/// one whole-program sweep by [`FactStore::new`], mutated only by the
/// transfer functions, and read-only for the report layer.
#[derive(Clone, Debug)]
pub struct FactStore {
    sets: FxHashMap<Site, PointsToSet>,
}

impl FactStore {
    /// Register an empty set for every qualifying site: every call site
    /// unconditionally; phis, arguments, and function returns only when their
    /// static type is a function pointer.
    pub fn new(program: &Program) -> Self {
        let mut sets = FxHashMap::default();
        for (fid, f) in program.functions() {
            if f.returns_fn_ptr {
                sets.insert(Site::Function(fid), PointsToSet::default());
            }
            for (index, param) in f.params.iter().enumerate() {
                if param.is_fn_ptr {
                    let arg = ArgId {
                        func: fid,
                        index: index as u32,
                    };
                    sets.insert(Site::Argument(arg), PointsToSet::default());
                }
            }
            for b in &f.blocks {
                for inst in &b.insts {
                    match inst {
                        Inst::Call(id) => {
                            sets.insert(Site::Call(*id), PointsToSet::default());
                        }
                        Inst::Phi(id) => {
                            if program.phi_node(*id).is_fn_ptr {
                                sets.insert(Site::Phi(*id), PointsToSet::default());
                            }
                        }
                        Inst::Store(_) | Inst::Ret(_) | Inst::Other => (),
                    }
                }
            }
        }
        FactStore { sets }
    }

    pub fn get(&self, site: Site) -> Result<&PointsToSet, Error> {
        self.sets.get(&site).ok_or(Error::UnknownSite(site))
    }

    pub fn add(&mut self, site: Site, v: Value) -> Result<bool, Error> {
        self.sets
            .get_mut(&site)
            .ok_or(Error::UnknownSite(site))
            .map(|set| set.insert(v))
    }

    /// Union `src`'s set into `dst`'s; reports whether `dst` grew.
    pub fn merge_sites(&mut self, dst: Site, src: Site) -> Result<bool, Error> {
        // Sets are small; cloning sidesteps aliasing when dst == src.
        let from = self.get(src)?.clone();
        let into = self.sets.get_mut(&dst).ok_or(Error::UnknownSite(dst))?;
        let mut changed = false;
        for v in from.iter() {
            changed |= into.insert(v);
        }
        Ok(changed)
    }

    pub fn sites(&self) -> impl Iterator<Item = (Site, &PointsToSet)> {
        self.sets.iter().map(|(s, set)| (*s, set))
    }

    /// Number of tracked sites.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
