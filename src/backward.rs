// Copyright 2024 ilqr developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Backward pass: the descending Riccati sweep.

use nalgebra::{SMatrix, SVector};

use crate::error::IlqrError;
use crate::expansion::{ExpansionCache, StageExpansion};
use crate::options::{RegularizationType, SolverOptions};
use crate::regularization::Regularization;

/// Feedback and feedforward gains at one interior knot.
#[derive(Debug, Clone, Copy)]
pub struct GainKnot<const NX: usize, const NU: usize> {
    /// `K[k]`, the feedback gain.
    pub k: SMatrix<f64, NU, NX>,
    /// `d[k]`, the feedforward term.
    pub d: SVector<f64, NU>,
}

impl<const NX: usize, const NU: usize> GainKnot<NX, NU> {
    fn zero() -> Self {
        GainKnot {
            k: SMatrix::zeros(),
            d: SVector::zeros(),
        }
    }
}

/// Gains for every interior knot, `k = 0..N-1`.
pub type Gains<const NX: usize, const NU: usize> = Vec<GainKnot<NX, NU>>;

/// Allocate a zeroed gain sequence for `n_interior` interior knots.
pub fn zero_gains<const NX: usize, const NU: usize>(n_interior: usize) -> Gains<NX, NU> {
    vec![GainKnot::zero(); n_interior]
}

/// Quadratic cost-to-go model at one knot.
#[derive(Debug, Clone, Copy)]
pub struct CostToGoKnot<const NX: usize> {
    /// `S.xx[k]`. Symmetric.
    pub sxx: SMatrix<f64, NX, NX>,
    /// `S.x[k]`.
    pub sx: SVector<f64, NX>,
}

impl<const NX: usize> CostToGoKnot<NX> {
    fn zero() -> Self {
        CostToGoKnot {
            sxx: SMatrix::zeros(),
            sx: SVector::zeros(),
        }
    }
}

/// Cost-to-go for every knot, `k = 0..N` (includes the terminal knot).
pub type CostToGo<const NX: usize> = Vec<CostToGoKnot<NX>>;

/// Allocate a zeroed cost-to-go sequence for `n` knots.
pub fn zero_cost_to_go<const NX: usize>(n: usize) -> CostToGo<NX> {
    vec![CostToGoKnot::zero(); n]
}

fn symmetrize<const D: usize>(m: SMatrix<f64, D, D>) -> SMatrix<f64, D, D> {
    0.5 * (m + m.transpose())
}

/// Run the backward sweep.
///
/// Reads `cache` and `reg.rho`, writes `gains` and `cost_to_go`, and returns the
/// line-search scalars `(dV1, dV2)`. `work` is caller-owned scratch, sized once at solver
/// construction to `cache.len()` stage expansions; no allocation happens inside this
/// function. On an ill-conditioned `Quu_reg`, the whole sweep is restarted (not resumed)
/// from a pristine copy of `cache`'s stage expansions back into `work`, up to
/// `options.max_backward_restarts` times; beyond that,
/// [`IlqrError::BackwardPassDivergent`] is returned.
pub fn run<const NX: usize, const NU: usize>(
    cache: &ExpansionCache<NX, NU>,
    work: &mut Vec<StageExpansion<NX, NU>>,
    gains: &mut Gains<NX, NU>,
    cost_to_go: &mut CostToGo<NX>,
    reg: &mut Regularization,
    options: &SolverOptions,
    iteration: u32,
) -> Result<(f64, f64), IlqrError> {
    let n_interior = cache.len();
    debug_assert_eq!(gains.len(), n_interior);
    debug_assert_eq!(cost_to_go.len(), n_interior + 1);
    debug_assert_eq!(work.len(), n_interior);

    let mut restarts = 0u32;

    'restart: loop {
        if restarts > options.max_backward_restarts {
            return Err(IlqrError::BackwardPassDivergent { restarts, iteration });
        }
        cache.reset_scratch(work);

        let terminal = cache.terminal();
        cost_to_go[n_interior] = CostToGoKnot {
            sxx: terminal.qxx,
            sx: terminal.qx,
        };

        let mut dv = (0.0_f64, 0.0_f64);
        let identity_u = SMatrix::<f64, NU, NU>::identity();

        for k in (0..n_interior).rev() {
            let (a, b) = cache.dynamics_at(k);
            let s_next = cost_to_go[k + 1];

            let stage = &mut work[k];
            stage.qx += a.transpose() * s_next.sx;
            stage.qu += b.transpose() * s_next.sx;
            stage.qxx = symmetrize(stage.qxx + a.transpose() * s_next.sxx * a);
            stage.quu = symmetrize(stage.quu + b.transpose() * s_next.sxx * b);
            stage.qux += b.transpose() * s_next.sxx * a;

            let (quu_reg, qux_reg) = match options.bp_reg_type {
                RegularizationType::State => (
                    symmetrize(stage.quu + reg.rho * (b.transpose() * b)),
                    stage.qux + reg.rho * (b.transpose() * a),
                ),
                RegularizationType::Control => {
                    (symmetrize(stage.quu + reg.rho * identity_u), stage.qux)
                }
            };

            let chol = match nalgebra::linalg::Cholesky::new(quu_reg) {
                Some(chol) => chol,
                None => {
                    reg.increase();
                    restarts += 1;
                    continue 'restart;
                }
            };

            let gain_k = -chol.solve(&qux_reg);
            let gain_d = -chol.solve(&stage.qu);

            let sx = stage.qx
                + gain_k.transpose() * stage.quu * gain_d
                + gain_k.transpose() * stage.qu
                + stage.qux.transpose() * gain_d;
            let sxx = symmetrize(
                stage.qxx
                    + gain_k.transpose() * stage.quu * gain_k
                    + gain_k.transpose() * stage.qux
                    + stage.qux.transpose() * gain_k,
            );

            dv.0 += gain_d.dot(&stage.qu);
            dv.1 += 0.5 * (gain_d.transpose() * stage.quu * gain_d)[(0, 0)];

            cost_to_go[k] = CostToGoKnot { sxx, sx };
            gains[k] = GainKnot { k: gain_k, d: gain_d };
        }

        reg.decrease();
        return Ok(dv);
    }
}
