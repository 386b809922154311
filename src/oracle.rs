// Copyright 2024 ilqr developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! External collaborators: the dynamics and cost oracles the iLQR core treats as
//! opaque. Problem construction, parsing and I/O around these traits are out of scope
//! for this crate; this module only names the interface the backward/forward passes
//! call into.

use nalgebra::{SMatrix, SVector};

use crate::expansion::{StageExpansion, TerminalExpansion};
use crate::trajectory::Trajectory;

/// Discrete-time dynamics and their Jacobians, evaluated zero-order-hold over `dt`.
///
/// Implementations are expected to be pure and deterministic: [`Dynamics::step`] and
/// [`Dynamics::jacobians`] are called many times per outer iteration with no cache
/// between calls, so any internal memoization must be invisible to the caller. A
/// non-finite component in the result of `step` is how an implementation signals an
/// invalid state to the forward pass's rollout; it is not reported through `Result`.
pub trait Dynamics<const NX: usize, const NU: usize> {
    /// Integrate one step: `x' = f(x, u, dt)`.
    fn step(&self, x: &SVector<f64, NX>, u: &SVector<f64, NU>, dt: f64) -> SVector<f64, NX>;

    /// Jacobians of `step` at `(x, u)`: `(df/dx, df/du)`.
    fn jacobians(
        &self,
        x: &SVector<f64, NX>,
        u: &SVector<f64, NU>,
        dt: f64,
    ) -> (SMatrix<f64, NX, NX>, SMatrix<f64, NX, NU>);
}

/// Quadratic expansion of a stage-and-terminal cost functional.
///
/// `k` is the knot index, in case the stage cost is time-varying (e.g. tracking a
/// reference trajectory). [`CostModel::trajectory_cost`] has a default implementation
/// that sums [`CostModel::stage_cost`] over all interior knots plus
/// [`CostModel::terminal_cost`] at the last knot; override it only if a specialized
/// total-cost computation is cheaper than knot-by-knot summation; it must still agree
/// with the linear/quadratic terms returned by the expansion methods at zero deviation.
pub trait CostModel<const NX: usize, const NU: usize> {
    /// Stage cost at knot `k`.
    fn stage_cost(&self, x: &SVector<f64, NX>, u: &SVector<f64, NU>, k: usize) -> f64;

    /// Terminal cost at the last knot.
    fn terminal_cost(&self, x: &SVector<f64, NX>) -> f64;

    /// Quadratic expansion of the stage cost at knot `k`.
    fn stage_expansion(
        &self,
        x: &SVector<f64, NX>,
        u: &SVector<f64, NU>,
        k: usize,
    ) -> StageExpansion<NX, NU>;

    /// Quadratic expansion of the terminal cost.
    fn terminal_expansion(&self, x: &SVector<f64, NX>) -> TerminalExpansion<NX>;

    /// Total cost of a full trajectory.
    fn trajectory_cost(&self, traj: &Trajectory<NX, NU>) -> f64 {
        let n = traj.len();
        let mut total = 0.0;
        for k in 0..n - 1 {
            let knot = traj.knot(k);
            total += self.stage_cost(&knot.x, &knot.u, k);
        }
        total + self.terminal_cost(traj.state(n - 1))
    }
}