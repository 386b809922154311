// Copyright 2024 ilqr developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Error types surfaced across the solver boundary.
//!
//! Mirrors the small, `thiserror`-backed error enum this corpus favors for library
//! crates (one variant per terminal condition, `#[error(...)]` carrying the message):
//! recoverable conditions (non-finite rollout, ill-conditioned backward pass before the
//! restart budget is exhausted, line-search exhaustion) are handled internally and never
//! reach this type.

use thiserror::Error;

/// Terminal failures of [`crate::solver::IlqrSolver::solve`].
///
/// Ordinary non-convergence (stalling, cost blowup, reaching the iteration budget) is
/// *not* an error: it is reported via [`crate::stats::TerminationReason`] inside the `Ok`
/// value. A variant here is only raised when recovery inside the solver itself has been
/// exhausted or an invariant the implementation relies on has been violated.
#[derive(Debug, Error)]
pub enum IlqrError {
    /// The backward pass could not find a positive-definite regularized `Quu` even after
    /// exhausting the configured restart budget ([`crate::options::SolverOptions::max_backward_restarts`]).
    #[error(
        "backward pass did not recover a positive-definite Quu after {restarts} restart(s) \
         (outer iteration {iteration})"
    )]
    BackwardPassDivergent {
        /// Number of sweep restarts attempted before giving up.
        restarts: u32,
        /// Outer iteration index at which the sweep was abandoned.
        iteration: u32,
    },

    /// The forward pass's fallback branch (which clamps the candidate cost to `J_prev`)
    /// was followed by a reported cost greater than `J_prev`. This can only happen if the
    /// implementation has a bug; it is not a condition a well-formed problem can trigger.
    #[error(
        "cost increased during forward pass after fallback (J={j}, J_prev={j_prev}) at outer \
         iteration {iteration}; this is an invariant violation"
    )]
    CostIncreasedAfterFallback {
        /// Cost reported after fallback.
        j: f64,
        /// Cost prior to this outer iteration.
        j_prev: f64,
        /// Outer iteration index at which the invariant was violated.
        iteration: u32,
    },

    /// An option value was out of the range the solver requires.
    #[error("invalid option: {text}")]
    InvalidOption {
        /// Description of the violated constraint.
        text: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_mention_the_offending_values() {
        let err = IlqrError::CostIncreasedAfterFallback { j: 12.0, j_prev: 10.0, iteration: 3 };
        let msg = err.to_string();
        assert!(msg.contains("12"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<IlqrError>();
    }
}