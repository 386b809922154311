// Copyright 2024 ilqr developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! End-to-end scenarios exercising the solver against small example problems. These
//! problems are test fixtures only, not part of the public API: the crate ships the
//! solver, not example dynamics or cost models.

use std::sync::Once;

use nalgebra::{SMatrix, SVector};

use ilqr::{
    CostModel, Dynamics, IlqrSolver, SolverOptions, StageExpansion, TerminalExpansion,
    TerminationReason, Trajectory,
};

/// Install a `tracing_subscriber` fmt subscriber once so the solver's per-iteration
/// spans and events (cost, dJ, gradient, rho) are actually exercised under test, rather
/// than going to a no-op default subscriber.
fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .init();
    });
}

/// A 1-D double integrator: position and velocity, acceleration as the control.
struct DoubleIntegrator;

impl Dynamics<2, 1> for DoubleIntegrator {
    fn step(&self, x: &SVector<f64, 2>, u: &SVector<f64, 1>, dt: f64) -> SVector<f64, 2> {
        SVector::from([x[0] + dt * x[1], x[1] + dt * u[0]])
    }

    fn jacobians(
        &self,
        _x: &SVector<f64, 2>,
        _u: &SVector<f64, 1>,
        dt: f64,
    ) -> (SMatrix<f64, 2, 2>, SMatrix<f64, 2, 1>) {
        let a = SMatrix::<f64, 2, 2>::new(1.0, dt, 0.0, 1.0);
        let b = SMatrix::<f64, 2, 1>::new(0.0, dt);
        (a, b)
    }
}

/// Quadratic tracking cost towards a fixed reference `(xf, 0)`, with diagonal weights.
struct TrackingCost<const NX: usize, const NU: usize> {
    q: SVector<f64, NX>,
    r: SVector<f64, NU>,
    qf: SVector<f64, NX>,
    xf: SVector<f64, NX>,
}

impl<const NX: usize, const NU: usize> CostModel<NX, NU> for TrackingCost<NX, NU> {
    fn stage_cost(&self, x: &SVector<f64, NX>, u: &SVector<f64, NU>, _k: usize) -> f64 {
        let dx = x - self.xf;
        let mut cost = 0.0;
        for i in 0..NX {
            cost += 0.5 * self.q[i] * dx[i] * dx[i];
        }
        for i in 0..NU {
            cost += 0.5 * self.r[i] * u[i] * u[i];
        }
        cost
    }

    fn terminal_cost(&self, x: &SVector<f64, NX>) -> f64 {
        let dx = x - self.xf;
        let mut cost = 0.0;
        for i in 0..NX {
            cost += 0.5 * self.qf[i] * dx[i] * dx[i];
        }
        cost
    }

    fn stage_expansion(
        &self,
        x: &SVector<f64, NX>,
        u: &SVector<f64, NU>,
        _k: usize,
    ) -> StageExpansion<NX, NU> {
        let dx = x - self.xf;
        StageExpansion {
            qx: self.q.component_mul(&dx),
            qu: self.r.component_mul(u),
            qxx: SMatrix::from_diagonal(&self.q),
            quu: SMatrix::from_diagonal(&self.r),
            qux: SMatrix::zeros(),
        }
    }

    fn terminal_expansion(&self, x: &SVector<f64, NX>) -> TerminalExpansion<NX> {
        let dx = x - self.xf;
        TerminalExpansion {
            qx: self.qf.component_mul(&dx),
            qxx: SMatrix::from_diagonal(&self.qf),
        }
    }
}

fn double_integrator_cost() -> TrackingCost<2, 1> {
    TrackingCost {
        q: SVector::from([1.0, 1.0]),
        r: SVector::from([1.0]),
        qf: SVector::from([100.0, 100.0]),
        xf: SVector::from([0.0, 0.0]),
    }
}

fn initial_guess(horizon: usize, dt: f64, x0: SVector<f64, 2>) -> Trajectory<2, 1> {
    let mut traj = Trajectory::<2, 1>::zeroed(horizon, dt);
    traj.knot_mut(0).x = x0;
    traj
}

/// A torque-limited pendulum, swinging up from hanging (`theta = 0`) to inverted
/// (`theta = pi`). State is `(theta, theta_dot)`; the control is joint torque.
struct Pendulum {
    mass: f64,
    length: f64,
    gravity: f64,
    damping: f64,
}

impl Pendulum {
    fn inertia(&self) -> f64 {
        self.mass * self.length * self.length
    }
}

impl Dynamics<2, 1> for Pendulum {
    fn step(&self, x: &SVector<f64, 2>, u: &SVector<f64, 1>, dt: f64) -> SVector<f64, 2> {
        let theta = x[0];
        let theta_dot = x[1];
        let inertia = self.inertia();
        let accel = (u[0] - self.mass * self.gravity * self.length * theta.sin()
            - self.damping * theta_dot)
            / inertia;
        SVector::from([theta + dt * theta_dot, theta_dot + dt * accel])
    }

    fn jacobians(
        &self,
        x: &SVector<f64, 2>,
        _u: &SVector<f64, 1>,
        dt: f64,
    ) -> (SMatrix<f64, 2, 2>, SMatrix<f64, 2, 1>) {
        let theta = x[0];
        let inertia = self.inertia();
        let d_accel_d_theta = -self.mass * self.gravity * self.length * theta.cos() / inertia;
        let d_accel_d_theta_dot = -self.damping / inertia;
        let d_accel_d_u = 1.0 / inertia;

        let a = SMatrix::<f64, 2, 2>::new(
            1.0,
            dt,
            dt * d_accel_d_theta,
            1.0 + dt * d_accel_d_theta_dot,
        );
        let b = SMatrix::<f64, 2, 1>::new(0.0, dt * d_accel_d_u);
        (a, b)
    }
}

fn swing_up_pendulum() -> Pendulum {
    Pendulum {
        mass: 1.0,
        length: 1.0,
        gravity: 9.81,
        damping: 0.1,
    }
}

fn swing_up_cost() -> TrackingCost<2, 1> {
    TrackingCost {
        q: SVector::from([1.0, 0.1]),
        r: SVector::from([0.01]),
        qf: SVector::from([500.0, 50.0]),
        xf: SVector::from([std::f64::consts::PI, 0.0]),
    }
}

/// S1: a 1-D double integrator driven to the origin converges within the iteration
/// budget and lands close to the target state.
#[test]
fn s1_double_integrator_converges_near_the_target() {
    init_tracing();
    let horizon = 51;
    let dt = 0.1;
    let initial = initial_guess(horizon, dt, SVector::from([1.0, 0.0]));

    let options = SolverOptions::default().with_iterations(50);
    let mut solver =
        IlqrSolver::new(DoubleIntegrator, double_integrator_cost(), horizon, dt, options);
    let outcome = solver.solve(initial).unwrap();

    assert!(outcome.stats.history.len() <= 50);
    let final_state = outcome.trajectory.state(horizon - 1);
    assert!(final_state.norm() < 1e-2, "final state {final_state:?} not near target");
}

/// S2: the nonlinear pendulum swing-up converges without the solver raising, and the
/// damping scalar used by the backward pass is back at (or near) zero by the time the
/// solver stops, even though it may have needed to lean on regularization partway
/// through the swing.
#[test]
fn s2_pendulum_swing_up_converges_and_relaxes_regularization() {
    init_tracing();
    let horizon = 101;
    let dt = 0.03;
    let initial = initial_guess(horizon, dt, SVector::from([0.0, 0.0]));

    let options = SolverOptions::default().with_iterations(200);
    let mut solver =
        IlqrSolver::new(swing_up_pendulum(), swing_up_cost(), horizon, dt, options);
    let outcome = solver.solve(initial).unwrap();

    assert!(matches!(
        outcome.termination,
        TerminationReason::Converged | TerminationReason::MaxIterationsReached
    ));

    let last = outcome.stats.history.last().expect("at least one iteration ran");
    assert!(last.regularization < 1.0, "rho did not relax: {}", last.regularization);

    let initial_cost = outcome.stats.history.first().unwrap().cost;
    assert!(last.cost < initial_cost, "swing-up cost did not improve");
}

/// S3: an initial control large enough to push the very first rollout knot outside
/// `max_state_value` repeatedly stalls the forward pass rather than panicking or
/// silently diverging; the solver reports a stalled termination.
#[test]
fn s3_divergent_initial_guess_stalls_without_raising() {
    init_tracing();
    let horizon = 10;
    let dt = 0.1;
    // |x0| = 1 already exceeds max_state_value, so every rollout after the first knot
    // fails regardless of the computed gains.
    let initial = initial_guess(horizon, dt, SVector::from([1.0, 0.0]));

    let options = SolverOptions::default()
        .with_max_state_value(0.5)
        .with_max_cost_value(f64::MAX);
    let mut solver =
        IlqrSolver::new(DoubleIntegrator, double_integrator_cost(), horizon, dt, options);
    let outcome = solver.solve(initial).unwrap();

    assert_eq!(outcome.termination, TerminationReason::Stalled);
    assert!(outcome.stats.dj_zero_counter >= 3);
}

/// S4: re-solving from an already-converged trajectory (so the supplied controls are
/// already the LQR-optimal feedback along that trajectory) drives the Todorov gradient
/// below tolerance in the very first iteration.
#[test]
fn s4_lqr_optimal_initial_guess_converges_in_one_iteration() {
    init_tracing();
    let horizon = 30;
    let dt = 0.1;
    let initial = initial_guess(horizon, dt, SVector::from([1.0, 0.0]));

    let options = SolverOptions::default();
    let mut warm_solver = IlqrSolver::new(
        DoubleIntegrator,
        double_integrator_cost(),
        horizon,
        dt,
        options.clone(),
    );
    let warm_outcome = warm_solver.solve(initial).unwrap();
    assert_eq!(warm_outcome.termination, TerminationReason::Converged);

    let mut one_shot_solver = IlqrSolver::new(
        DoubleIntegrator,
        double_integrator_cost(),
        horizon,
        dt,
        options.with_iterations(1),
    );
    let outcome = one_shot_solver.solve(warm_outcome.trajectory).unwrap();

    let first = outcome.stats.history.first().expect("one iteration ran");
    assert!(
        first.gradient_norm < SolverOptions::default().gradient_norm_tolerance,
        "gradient {} not below tolerance",
        first.gradient_norm
    );
}

/// S5: an unreasonably tight `max_cost_value` makes the solver stop early rather than
/// keep iterating a divergent problem, and the recorded cost reflects the blowup.
#[test]
fn s5_cost_blowup_guard_stops_early() {
    init_tracing();
    let horizon = 51;
    let dt = 0.1;
    let initial = initial_guess(horizon, dt, SVector::from([1.0, 0.0]));

    let options = SolverOptions::default().with_max_cost_value(10.0);
    let mut solver =
        IlqrSolver::new(DoubleIntegrator, double_integrator_cost(), horizon, dt, options);
    let outcome = solver.solve(initial).unwrap();

    assert_eq!(outcome.termination, TerminationReason::CostBlowup);
    let last = outcome.stats.history.last().unwrap();
    assert!(last.cost > 10.0);
}

/// S6: with no backtracking budget at all, every forward pass is exhausted
/// immediately: the trajectory never advances, the damping scalar picks up the
/// one-shot forward-pass penalty, and the solver eventually reports a stall.
#[test]
fn s6_forward_pass_fallback_leaves_trajectory_unchanged() {
    init_tracing();
    let horizon = 10;
    let dt = 0.1;
    let initial = initial_guess(horizon, dt, SVector::from([1.0, 0.0]));

    let mut options = SolverOptions::default();
    options.iterations_linesearch = 0;
    let mut solver =
        IlqrSolver::new(DoubleIntegrator, double_integrator_cost(), horizon, dt, options);
    let outcome = solver.solve(initial.clone()).unwrap();

    assert_eq!(outcome.termination, TerminationReason::Stalled);
    let first = outcome.stats.history.first().unwrap();
    assert_eq!(first.cost_decrease, 0.0);
    assert!(first.regularization > 0.0);

    // The open-loop rollout of `initial` is what the candidate trajectory was reset to
    // on every fallback, so the accepted trajectory at termination matches it exactly.
    let mut rolled = initial;
    for k in 0..horizon - 1 {
        let x = *rolled.state(k);
        let u = *rolled.control(k);
        let dt_k = rolled.knot(k).dt;
        let x_next = DoubleIntegrator.step(&x, &u, dt_k);
        rolled.knot_mut(k + 1).x = x_next;
    }
    assert_eq!(outcome.trajectory, rolled);
}
