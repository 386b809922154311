// Copyright 2024 ilqr developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The outer iteration driver.

use tracing::{debug, info, info_span};

use crate::backward::{self, CostToGo, Gains};
use crate::error::IlqrError;
use crate::expansion::{ExpansionCache, StageExpansion};
use crate::forward;
use crate::oracle::{CostModel, Dynamics};
use crate::options::SolverOptions;
use crate::regularization::Regularization;
use crate::stats::{IterationRecord, SolverStats, TerminationReason};
use crate::trajectory::Trajectory;

/// Result of a completed [`IlqrSolver::solve`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome<const NX: usize, const NU: usize> {
    /// The best trajectory found.
    pub trajectory: Trajectory<NX, NU>,
    /// Feedback and feedforward gains from the last completed backward pass, one per
    /// interior knot. Useful for closed-loop tracking of `trajectory`.
    pub gains: Gains<NX, NU>,
    /// Why the solver stopped.
    pub termination: TerminationReason,
    /// Per-iteration history.
    pub stats: SolverStats,
}

/// Drives the backward/forward iteration to (locally) minimize a trajectory's cost.
///
/// Owns the scratch buffers the sweep needs (expansion cache, gains, cost-to-go, a spare
/// trajectory for the forward pass's candidate) so that `solve()` performs no heap
/// allocation in its inner loop beyond what the `Dynamics`/`CostModel` implementations
/// themselves allocate.
pub struct IlqrSolver<D, C, const NX: usize, const NU: usize> {
    dynamics: D,
    cost: C,
    options: SolverOptions,
    reg: Regularization,
    cache: ExpansionCache<NX, NU>,
    work: Vec<StageExpansion<NX, NU>>,
    gains: Gains<NX, NU>,
    cost_to_go: CostToGo<NX>,
    candidate: Trajectory<NX, NU>,
}

impl<D, C, const NX: usize, const NU: usize> IlqrSolver<D, C, NX, NU>
where
    D: Dynamics<NX, NU>,
    C: CostModel<NX, NU>,
{
    /// Construct a solver around `dynamics` and `cost`, sized for a trajectory of
    /// `horizon` knots (`N >= 2`).
    pub fn new(dynamics: D, cost: C, horizon: usize, dt: f64, options: SolverOptions) -> Self {
        let n_interior = horizon - 1;
        let cache = ExpansionCache::new(n_interior);
        let work = cache.stage_scratch();
        IlqrSolver {
            dynamics,
            cost,
            reg: Regularization::new(options.bp_reg_increase_factor, options.bp_reg_min),
            cache,
            work,
            gains: backward::zero_gains(n_interior),
            cost_to_go: backward::zero_cost_to_go(horizon),
            candidate: Trajectory::zeroed(horizon, dt),
            options,
        }
    }

    /// Solve starting from `initial`, an open-loop (possibly infeasible) guess.
    ///
    /// `initial` need not satisfy the dynamics: its controls and first state are rolled
    /// forward open-loop before the first backward pass, so only those two parts of
    /// `initial` matter.
    pub fn solve(
        &mut self,
        mut accepted: Trajectory<NX, NU>,
    ) -> Result<SolveOutcome<NX, NU>, IlqrError> {
        let solve_span = info_span!("ilqr_solve");
        let _solve_enter = solve_span.enter();

        forward::open_loop_rollout(&self.dynamics, &mut accepted);

        let mut j_prev = self.cost.trajectory_cost(&accepted);
        let mut stats = SolverStats::new();

        for iteration in 0..self.options.iterations {
            let span = info_span!("ilqr_iteration", iteration, cost = j_prev);
            let _enter = span.enter();

            self.cache.refill(&self.dynamics, &self.cost, &accepted);

            let dv = backward::run(
                &self.cache,
                &mut self.work,
                &mut self.gains,
                &mut self.cost_to_go,
                &mut self.reg,
                &self.options,
                iteration,
            )?;

            let result = forward::run(
                &self.dynamics,
                &self.cost,
                &accepted,
                &mut self.candidate,
                &self.gains,
                j_prev,
                dv,
                &mut self.reg,
                &self.options,
                iteration,
            )?;

            // The Todorov gradient is normalized against the nominal trajectory the
            // backward pass computed `K`/`d` against, i.e. `accepted` as it stood before
            // this iteration's forward pass, not the just-accepted candidate.
            let gradient_norm = todorov_gradient(&accepted, &self.gains);

            if result.fallback {
                stats.dj_zero_counter += 1;
            }

            debug!(
                iteration,
                cost = result.j,
                dj = result.dj,
                gradient = gradient_norm,
                rho = self.reg.rho,
                fallback = result.fallback,
                "outer iteration complete"
            );

            stats.history.push(IterationRecord {
                iteration,
                cost: result.j,
                cost_decrease: result.dj,
                gradient_norm,
                line_search_ratio: result.z,
                regularization: self.reg.rho,
                line_search_steps: result.steps,
            });

            // Cost-blowup is checked against the candidate's cost before the candidate is
            // committed: on blowup, the caller gets back the last valid `accepted`
            // trajectory, not the divergent one the forward pass just produced.
            if result.j > self.options.max_cost_value {
                info!(cost = result.j, "cost blowup, stopping");
                return Ok(self.finish(accepted, stats, TerminationReason::CostBlowup));
            }

            if !result.fallback {
                accepted.copy_from(&self.candidate);
            }

            j_prev = result.j;

            if let Some(reason) =
                evaluate_convergence(&result, gradient_norm, stats.dj_zero_counter, &self.options)
            {
                info!(?reason, iteration, "converged");
                return Ok(self.finish(accepted, stats, reason));
            }
        }

        info!("reached maximum iterations");
        Ok(self.finish(accepted, stats, TerminationReason::MaxIterationsReached))
    }

    fn finish(
        &self,
        trajectory: Trajectory<NX, NU>,
        stats: SolverStats,
        termination: TerminationReason,
    ) -> SolveOutcome<NX, NU> {
        SolveOutcome {
            trajectory,
            gains: self.gains.clone(),
            termination,
            stats,
        }
    }
}

fn evaluate_convergence<const NX: usize, const NU: usize>(
    result: &forward::ForwardResult,
    gradient_norm: f64,
    dj_zero_counter: u32,
    options: &SolverOptions,
) -> Option<TerminationReason> {
    if !result.fallback && result.dj > 0.0 && result.dj < options.cost_tolerance {
        return Some(TerminationReason::Converged);
    }
    if gradient_norm < options.gradient_norm_tolerance {
        return Some(TerminationReason::Converged);
    }
    if dj_zero_counter >= options.dj_counter_limit {
        return Some(TerminationReason::Stalled);
    }
    None
}

/// Todorov's heuristic convergence measure: the mean, over interior knots, of the
/// feedforward correction relative to the control magnitude it is applied to.
fn todorov_gradient<const NX: usize, const NU: usize>(
    traj: &Trajectory<NX, NU>,
    gains: &Gains<NX, NU>,
) -> f64 {
    if gains.is_empty() {
        return 0.0;
    }
    let mut total = 0.0;
    for (k, gain) in gains.iter().enumerate() {
        let u = traj.control(k);
        let mut worst = 0.0_f64;
        for i in 0..NU {
            let ratio = gain.d[i].abs() / (u[i].abs() + 1.0);
            worst = worst.max(ratio);
        }
        total += worst;
    }
    total / gains.len() as f64
}
