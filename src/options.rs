// Copyright 2024 ilqr developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Solver configuration.

#[cfg(feature = "serde1")]
use serde::{Deserialize, Serialize};

use crate::error::IlqrError;

/// Which quantity the backward pass's Levenberg–Marquardt-style damping is added to.
///
/// See [`SolverOptions::bp_reg_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub enum RegularizationType {
    /// `Quu_reg = Quu + rho * Bᵀ B`, `Qux_reg = Qux + rho * Bᵀ A`.
    State,
    /// `Quu_reg = Quu + rho * I`, `Qux_reg = Qux` (unchanged).
    Control,
}

/// Tunable knobs of the iLQR solver.
///
/// All fields are public and can be set directly; the `with_*` builders additionally
/// validate the handful of values whose sign or range the algorithm depends on, in the
/// style of `argmin`'s `with_tolerance`-style constructors.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde1", derive(Serialize, Deserialize))]
pub struct SolverOptions {
    /// Maximum number of outer iterations.
    pub iterations: u32,
    /// Convergence threshold on the (positive) cost decrease `dJ`.
    pub cost_tolerance: f64,
    /// Convergence threshold on the Todorov gradient heuristic.
    pub gradient_norm_tolerance: f64,
    /// Early-abort threshold: once the accepted cost exceeds this, the solver stops.
    pub max_cost_value: f64,
    /// Per-component magnitude limit enforced on states produced during rollout.
    pub max_state_value: f64,
    /// Which quantity backward-pass regularization is added to.
    pub bp_reg_type: RegularizationType,
    /// Multiplicative damping rate `phi > 1`.
    pub bp_reg_increase_factor: f64,
    /// Floor for nonzero damping, `rho_min`.
    pub bp_reg_min: f64,
    /// One-shot `rho` bump applied when the forward pass exhausts its line search.
    pub bp_reg_fp: f64,
    /// Maximum backtracking steps per forward pass.
    pub iterations_linesearch: u32,
    /// Lower bound of the accepted actual/predicted cost-decrease ratio `z`.
    pub line_search_lower_bound: f64,
    /// Upper bound of the accepted actual/predicted cost-decrease ratio `z`.
    pub line_search_upper_bound: f64,
    /// Budget on `dJ_zero_counter` before the solver reports a stalled termination.
    pub dj_counter_limit: u32,
    /// Cap on backward-pass sweep restarts per outer iteration before giving up.
    pub max_backward_restarts: u32,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            iterations: 300,
            cost_tolerance: 1e-4,
            gradient_norm_tolerance: 1e-5,
            max_cost_value: 1e8,
            max_state_value: 1e8,
            bp_reg_type: RegularizationType::Control,
            bp_reg_increase_factor: 1.6,
            bp_reg_min: 1e-8,
            bp_reg_fp: 10.0,
            iterations_linesearch: 10,
            line_search_lower_bound: 1e-8,
            line_search_upper_bound: 10.0,
            dj_counter_limit: 3,
            max_backward_restarts: 10,
        }
    }
}

impl SolverOptions {
    /// Set the maximum number of outer iterations.
    #[must_use]
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the cost-tolerance convergence threshold. Must be strictly positive.
    pub fn with_cost_tolerance(mut self, tol: f64) -> Result<Self, IlqrError> {
        if tol <= 0.0 {
            return Err(IlqrError::InvalidOption {
                text: "cost_tolerance must be > 0".into(),
            });
        }
        self.cost_tolerance = tol;
        Ok(self)
    }

    /// Set the gradient-norm convergence threshold. Must be strictly positive.
    pub fn with_gradient_norm_tolerance(mut self, tol: f64) -> Result<Self, IlqrError> {
        if tol <= 0.0 {
            return Err(IlqrError::InvalidOption {
                text: "gradient_norm_tolerance must be > 0".into(),
            });
        }
        self.gradient_norm_tolerance = tol;
        Ok(self)
    }

    /// Set the regularization increase factor `phi`. Must be strictly greater than 1.
    pub fn with_bp_reg_increase_factor(mut self, phi: f64) -> Result<Self, IlqrError> {
        if phi <= 1.0 {
            return Err(IlqrError::InvalidOption {
                text: "bp_reg_increase_factor must be > 1".into(),
            });
        }
        self.bp_reg_increase_factor = phi;
        Ok(self)
    }

    /// Set which quantity backward-pass regularization is added to.
    #[must_use]
    pub fn with_bp_reg_type(mut self, ty: RegularizationType) -> Self {
        self.bp_reg_type = ty;
        self
    }

    /// Set the per-component state magnitude limit enforced during rollout.
    #[must_use]
    pub fn with_max_state_value(mut self, max_state_value: f64) -> Self {
        self.max_state_value = max_state_value;
        self
    }

    /// Set the early-abort cost threshold.
    #[must_use]
    pub fn with_max_cost_value(mut self, max_cost_value: f64) -> Self {
        self.max_cost_value = max_cost_value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_are_internally_consistent() {
        let opts = SolverOptions::default();
        assert!(opts.bp_reg_increase_factor > 1.0);
        assert!(opts.line_search_lower_bound < opts.line_search_upper_bound);
        assert!(opts.cost_tolerance > 0.0);
    }

    #[test]
    fn rejects_non_positive_tolerance() {
        let err = SolverOptions::default().with_cost_tolerance(0.0).unwrap_err();
        assert!(err.to_string().contains("cost_tolerance"));
    }

    #[test]
    fn rejects_increase_factor_at_or_below_one() {
        assert!(SolverOptions::default()
            .with_bp_reg_increase_factor(1.0)
            .is_err());
        assert!(SolverOptions::default()
            .with_bp_reg_increase_factor(0.5)
            .is_err());
        assert!(SolverOptions::default()
            .with_bp_reg_increase_factor(2.0)
            .is_ok());
    }
}