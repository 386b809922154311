// Copyright 2024 ilqr developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Forward pass: rollout and backtracking line search.

use nalgebra::SVector;

use crate::backward::Gains;
use crate::error::IlqrError;
use crate::oracle::{CostModel, Dynamics};
use crate::options::SolverOptions;
use crate::regularization::Regularization;
use crate::trajectory::{KnotPoint, Trajectory};

/// Outcome of one forward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForwardResult {
    /// Cost of the accepted candidate (equal to `j_prev` on a fallback).
    pub j: f64,
    /// Realized cost decrease, `j_prev - j` (`0.0` on a fallback).
    pub dj: f64,
    /// Step size accepted (`0.0` on a fallback).
    pub alpha: f64,
    /// Actual-to-predicted cost-decrease ratio (`0.0` on a fallback).
    pub z: f64,
    /// Number of backtracking steps consumed before acceptance or exhaustion.
    pub steps: u32,
    /// Whether the line search was exhausted and the accepted trajectory was replayed
    /// unchanged.
    pub fallback: bool,
}

/// Integrate `traj`'s own controls through `dynamics`, unconditionally, to populate its
/// states from `x[0]` onward. Used once, before the first backward pass, to turn a
/// caller-supplied `(x0, initial_controls)` guess into a dynamically consistent
/// trajectory. This first pass has no gains yet and nothing to fall back to, so unlike
/// [`rollout`] it does not bound intermediate states against `max_state_value`.
pub(crate) fn open_loop_rollout<const NX: usize, const NU: usize>(
    dynamics: &impl Dynamics<NX, NU>,
    traj: &mut Trajectory<NX, NU>,
) {
    let n = traj.len();
    for k in 0..n - 1 {
        let knot = *traj.knot(k);
        let x_next = dynamics.step(&knot.x, &knot.u, knot.dt);
        traj.knot_mut(k + 1).x = x_next;
    }
}

/// Roll `accepted`'s controls forward through `dynamics` with gains `gains` scaled by
/// `alpha`, writing the result into `candidate`. Returns `false` if the rollout produced a
/// non-finite or out-of-bound state, in which case `candidate` holds a partial result.
pub(crate) fn rollout<const NX: usize, const NU: usize>(
    dynamics: &impl Dynamics<NX, NU>,
    accepted: &Trajectory<NX, NU>,
    candidate: &mut Trajectory<NX, NU>,
    gains: &Gains<NX, NU>,
    alpha: f64,
    max_state_value: f64,
) -> bool {
    let n = accepted.len();
    *candidate.knot_mut(0) = *accepted.knot(0);

    for k in 0..n - 1 {
        let x = *candidate.state(k);
        let dt = accepted.knot(k).dt;
        let dx = x - accepted.state(k);
        let gain = gains[k];
        let u: SVector<f64, NU> = accepted.control(k) + alpha * gain.d + gain.k * dx;
        let x_next = dynamics.step(&x, &u, dt);

        if !x_next.iter().all(|v| v.is_finite()) {
            return false;
        }
        if x_next.iter().any(|v| v.abs() > max_state_value) {
            return false;
        }

        *candidate.knot_mut(k) = KnotPoint::new(x, u, dt);
        if k + 1 < n {
            let next_dt = accepted.knot(k + 1).dt;
            candidate.knot_mut(k + 1).x = x_next;
            candidate.knot_mut(k + 1).dt = next_dt;
        }
    }
    true
}

/// Run the backtracking line search, mutating `candidate` in place.
///
/// On success, `candidate` holds the accepted trajectory. On exhaustion, `candidate` is
/// reset to `accepted` and `reg` is bumped so the next backward pass damps harder.
pub fn run<const NX: usize, const NU: usize>(
    dynamics: &impl Dynamics<NX, NU>,
    cost: &impl CostModel<NX, NU>,
    accepted: &Trajectory<NX, NU>,
    candidate: &mut Trajectory<NX, NU>,
    gains: &Gains<NX, NU>,
    j_prev: f64,
    dv: (f64, f64),
    reg: &mut Regularization,
    options: &SolverOptions,
    iteration: u32,
) -> Result<ForwardResult, IlqrError> {
    let mut alpha = 1.0_f64;

    for step in 0..options.iterations_linesearch {
        if !rollout(dynamics, accepted, candidate, gains, alpha, options.max_state_value) {
            alpha *= 0.5;
            continue;
        }

        let j = cost.trajectory_cost(candidate);
        let dj = j_prev - j;
        let predicted = -(alpha * dv.0 + alpha * alpha * dv.1);
        let z = if predicted > 0.0 { dj / predicted } else { -1.0 };

        let z_in_window =
            z > options.line_search_lower_bound && z <= options.line_search_upper_bound;

        // Accept as soon as the cost actually decreases, even with an out-of-window z
        // ratio; a decrease is never rejected for having "too good" or "too poor" a
        // fit to the quadratic model.
        if z_in_window || dj > 0.0 {
            return Ok(ForwardResult {
                j,
                dj,
                alpha,
                z,
                steps: step,
                fallback: false,
            });
        }

        alpha *= 0.5;
    }

    candidate.copy_from(accepted);
    let j = cost.trajectory_cost(candidate);
    if j > j_prev {
        return Err(IlqrError::CostIncreasedAfterFallback { j, j_prev, iteration });
    }

    reg.increase();
    reg.bump(options.bp_reg_fp);

    Ok(ForwardResult {
        j: j_prev,
        dj: 0.0,
        alpha: 0.0,
        z: 0.0,
        steps: options.iterations_linesearch,
        fallback: true,
    })
}
