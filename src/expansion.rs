// Copyright 2024 ilqr developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Per-knot dynamics and cost expansions.

use nalgebra::{SMatrix, SVector};

use crate::oracle::{CostModel, Dynamics};
use crate::trajectory::Trajectory;

/// Quadratic model of the stage cost at an interior knot, plus the gradients the
/// backward pass needs.
#[derive(Debug, Clone, Copy)]
pub struct StageExpansion<const NX: usize, const NU: usize> {
    /// `Qx`, the state gradient.
    pub qx: SVector<f64, NX>,
    /// `Qu`, the control gradient.
    pub qu: SVector<f64, NU>,
    /// `Qxx`, the state Hessian. Symmetric.
    pub qxx: SMatrix<f64, NX, NX>,
    /// `Quu`, the control Hessian. Symmetric.
    pub quu: SMatrix<f64, NU, NU>,
    /// `Qux`, the cross term.
    pub qux: SMatrix<f64, NU, NX>,
}

impl<const NX: usize, const NU: usize> StageExpansion<NX, NU> {
    fn zero() -> Self {
        StageExpansion {
            qx: SVector::zeros(),
            qu: SVector::zeros(),
            qxx: SMatrix::zeros(),
            quu: SMatrix::zeros(),
            qux: SMatrix::zeros(),
        }
    }
}

/// Quadratic model of the terminal cost.
#[derive(Debug, Clone, Copy)]
pub struct TerminalExpansion<const NX: usize> {
    /// `Qx[N]`.
    pub qx: SVector<f64, NX>,
    /// `Qxx[N]`. Symmetric.
    pub qxx: SMatrix<f64, NX, NX>,
}

impl<const NX: usize> TerminalExpansion<NX> {
    fn zero() -> Self {
        TerminalExpansion {
            qx: SVector::zeros(),
            qxx: SMatrix::zeros(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DynamicsJacobian<const NX: usize, const NU: usize> {
    a: SMatrix<f64, NX, NX>,
    b: SMatrix<f64, NX, NU>,
}

/// Preallocated per-knot cache of dynamics Jacobians and cost expansions.
///
/// Refilled from scratch at the top of every outer iteration ([`ExpansionCache::refill`]).
/// The backward pass treats it as write-once-then-read-only for a given iteration: it
/// works on a local copy of the stage expansions rather than mutating this cache, so a
/// sweep restart can reset to the pristine values without a second oracle
/// call.
pub struct ExpansionCache<const NX: usize, const NU: usize> {
    dynamics: Vec<DynamicsJacobian<NX, NU>>,
    stage: Vec<StageExpansion<NX, NU>>,
    terminal: TerminalExpansion<NX>,
}

impl<const NX: usize, const NU: usize> ExpansionCache<NX, NU> {
    /// Allocate a cache for `n_interior` interior knots (`N - 1`).
    pub fn new(n_interior: usize) -> Self {
        ExpansionCache {
            dynamics: vec![
                DynamicsJacobian {
                    a: SMatrix::zeros(),
                    b: SMatrix::zeros(),
                };
                n_interior
            ],
            stage: vec![StageExpansion::zero(); n_interior],
            terminal: TerminalExpansion::zero(),
        }
    }

    /// Number of interior knots held (`N - 1`).
    pub fn len(&self) -> usize {
        self.stage.len()
    }

    /// `true` only for a degenerate zero-horizon cache; never true for a real trajectory.
    pub fn is_empty(&self) -> bool {
        self.stage.is_empty()
    }

    /// `A[k]`, `B[k]` for interior knot `k`.
    pub fn dynamics_at(&self, k: usize) -> (&SMatrix<f64, NX, NX>, &SMatrix<f64, NX, NU>) {
        (&self.dynamics[k].a, &self.dynamics[k].b)
    }

    /// The stage expansion at interior knot `k`.
    pub fn stage_at(&self, k: usize) -> &StageExpansion<NX, NU> {
        &self.stage[k]
    }

    /// The terminal expansion at knot `N - 1`.
    pub fn terminal(&self) -> &TerminalExpansion<NX> {
        &self.terminal
    }

    /// Call the dynamics-Jacobian and cost-expansion oracles at every knot of `traj`,
    /// overwriting the cache in place. Must happen once at the top of every outer
    /// iteration; values from a previous iteration are never reused.
    pub fn refill(
        &mut self,
        dynamics: &impl Dynamics<NX, NU>,
        cost: &impl CostModel<NX, NU>,
        traj: &Trajectory<NX, NU>,
    ) {
        let n_interior = self.stage.len();
        for k in 0..n_interior {
            let knot = traj.knot(k);
            let (a, b) = dynamics.jacobians(&knot.x, &knot.u, knot.dt);
            self.dynamics[k] = DynamicsJacobian { a, b };
            self.stage[k] = cost.stage_expansion(&knot.x, &knot.u, k);
        }
        let terminal_knot = traj.knot(traj.len() - 1);
        self.terminal = cost.terminal_expansion(&terminal_knot.x);
    }

    /// A scratch copy of the stage expansions the backward pass may freely mutate, reset
    /// cheaply (`clone_from`, no reallocation once sized) on every sweep restart.
    pub(crate) fn stage_scratch(&self) -> Vec<StageExpansion<NX, NU>> {
        self.stage.clone()
    }

    pub(crate) fn reset_scratch(&self, scratch: &mut Vec<StageExpansion<NX, NU>>) {
        scratch.clone_from(&self.stage);
    }
}
