// SPDX-License-Identifier: BSD-3-Clause
//! The points-to analysis proper: the fact store, the transfer functions and
//! fixpoint driver, and the call-site report built from the converged facts.

pub mod facts;
pub mod pointer;
pub mod report;

use self::facts::Site;

/// Analysis failures. All variants are fatal for the run: the analysis is
/// deterministic and pure, so re-running on the same input reproduces the
/// same error. Missing debug locations are *not* errors — the report layer
/// logs and skips those calls.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A tracked site was queried but never registered. Initialization
    /// registers every qualifying site before the first sweep, so this is an
    /// internal-invariant violation, not an input condition.
    #[error("internal error: no points-to set registered for {0}")]
    UnknownSite(Site),

    /// Resolution of a callee or returned value met a value outside the
    /// tracked domain. The analysis cannot soundly continue for that value.
    #[error("cannot resolve {0}: unexpected value kind")]
    UnexpectedValueKind(String),

    /// The defensive sweep cap was exceeded. Monotone growth over a finite
    /// universe guarantees convergence, so hitting the cap means a transfer
    /// function is not monotone.
    #[error("internal error: fixpoint not reached within {0} sweeps")]
    SweepLimit(usize),
}
