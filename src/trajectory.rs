// Copyright 2024 ilqr developers
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Knot points and the trajectory store.

use nalgebra::SVector;

/// A single discrete-time knot `(x, u, dt)`.
///
/// Knot `N-1` (the last one) carries `u` but it is never read by the solver; callers may
/// leave it zeroed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KnotPoint<const NX: usize, const NU: usize> {
    /// State at this knot.
    pub x: SVector<f64, NX>,
    /// Control applied over `[x, x + dt]`.
    pub u: SVector<f64, NU>,
    /// Step duration.
    pub dt: f64,
}

impl<const NX: usize, const NU: usize> KnotPoint<NX, NU> {
    /// Construct a knot point from its state, control and step duration.
    pub fn new(x: SVector<f64, NX>, u: SVector<f64, NU>, dt: f64) -> Self {
        KnotPoint { x, u, dt }
    }

    fn zero(dt: f64) -> Self {
        KnotPoint {
            x: SVector::zeros(),
            u: SVector::zeros(),
            dt,
        }
    }
}

/// An ordered sequence of `N` knot points.
///
/// The solver keeps exactly two instances alive for the lifetime of a `solve()` call: the
/// *accepted* trajectory and the *candidate* trajectory written by the forward pass
/// Swapping between them is always a copy, never a pointer swap, so that
/// references taken into the accepted trajectory during a sweep stay valid.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory<const NX: usize, const NU: usize> {
    knots: Vec<KnotPoint<NX, NU>>,
}

impl<const NX: usize, const NU: usize> Trajectory<NX, NU> {
    /// Wrap an already-populated sequence of knots.
    pub fn new(knots: Vec<KnotPoint<NX, NU>>) -> Self {
        assert!(knots.len() >= 2, "a trajectory needs at least two knots");
        Trajectory { knots }
    }

    /// Allocate a trajectory of `n` zeroed knots, each with step duration `dt`.
    pub fn zeroed(n: usize, dt: f64) -> Self {
        assert!(n >= 2, "a trajectory needs at least two knots");
        Trajectory {
            knots: (0..n).map(|_| KnotPoint::zero(dt)).collect(),
        }
    }

    /// Number of knots `N`.
    pub fn len(&self) -> usize {
        self.knots.len()
    }

    /// Always `false`: a trajectory always has at least two knots.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All knots, in order.
    pub fn knots(&self) -> &[KnotPoint<NX, NU>] {
        &self.knots
    }

    /// The knot at index `k`.
    pub fn knot(&self, k: usize) -> &KnotPoint<NX, NU> {
        &self.knots[k]
    }

    /// Mutable access to the knot at index `k`.
    pub fn knot_mut(&mut self, k: usize) -> &mut KnotPoint<NX, NU> {
        &mut self.knots[k]
    }

    /// State at knot `k`.
    pub fn state(&self, k: usize) -> &SVector<f64, NX> {
        &self.knots[k].x
    }

    /// Control at knot `k`.
    pub fn control(&self, k: usize) -> &SVector<f64, NU> {
        &self.knots[k].u
    }

    /// Overwrite every knot with `other`'s, element-wise. No allocation: both trajectories
    /// must already have the same length (always true for the accepted/candidate pair
    /// owned by one solver).
    pub fn copy_from(&mut self, other: &Trajectory<NX, NU>) {
        self.knots.copy_from_slice(&other.knots);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_from_is_element_wise_not_a_swap() {
        let mut a = Trajectory::<2, 1>::zeroed(3, 0.1);
        let mut b = Trajectory::<2, 1>::zeroed(3, 0.1);
        b.knot_mut(1).x = SVector::from([1.0, 2.0]);

        a.copy_from(&b);
        assert_eq!(a.state(1)[0], 1.0);
        assert_eq!(a.state(1)[1], 2.0);

        // mutating b afterwards must not affect a: this is a copy, not a shared reference.
        b.knot_mut(1).x = SVector::from([9.0, 9.0]);
        assert_eq!(a.state(1)[0], 1.0);
    }

    #[test]
    #[should_panic]
    fn rejects_degenerate_trajectories() {
        let _ = Trajectory::<2, 1>::zeroed(1, 0.1);
    }
}