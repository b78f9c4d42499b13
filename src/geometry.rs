//! Geometry provider contract.
//!
//! A curve only has to supply its height function `x3(x1)` and first two
//! derivatives. Positions, arclength, the inverse arclength map, basis
//! vectors, metric and curvature tensors and Christoffel symbols are all
//! derived from it here.

use std::fmt::Debug;

use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};

use crate::error::ShellError;

pub const ARC_PANELS: usize = 32;
pub const MAX_NEWTON_ITER: usize = 60;
pub const NEWTON_TOLERANCE: f64 = 1e-13;
/// Relative offset from a singular point at which one-sided limits are taken
const LIMIT_STEP: f64 = 1e-9;

const GAUSS_NODES: [f64; 5] = [
    -0.906_179_845_938_664,
    -0.538_469_310_105_683_1,
    0.0,
    0.538_469_310_105_683_1,
    0.906_179_845_938_664,
];
const GAUSS_WEIGHTS: [f64; 5] = [
    0.236_926_885_056_189_1,
    0.478_628_670_499_366_5,
    0.568_888_888_888_888_9,
    0.478_628_670_499_366_5,
    0.236_926_885_056_189_1,
];

/// Derivative order of the height function with respect to `x1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diff {
    None,
    X1,
    X11,
}

/// Curve parameter that basis vectors are differentiated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    /// The raw horizontal coordinate `x1`
    X1,
    /// The arclength `theta1`
    Theta,
}

/// Covariant basis `[a1, a2, a3]`: tangent, span direction, unit normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Basis {
    pub a: [Vector3<f64>; 3],
}

/// Composite 5-point Gauss-Legendre quadrature of `f` over `[a, b]`
pub fn gauss_legendre<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, panels: usize) -> f64 {
    let panels = panels.max(1);
    let h = (b - a) / panels as f64;
    let mut total = 0.0;
    for p in 0..panels {
        let mid = a + (p as f64 + 0.5) * h;
        let half = 0.5 * h;
        for (node, weight) in std::iter::zip(GAUSS_NODES, GAUSS_WEIGHTS) {
            total += weight * f(mid + half * node);
        }
    }
    total * 0.5 * h
}

pub trait Geometry: Clone + Debug {
    fn chord(&self) -> f64;

    /// Shape coefficients in the order `with_coefficients` expects them
    fn coefficients(&self) -> Vec<f64>;

    fn with_coefficients(&self, coefficients: &[f64]) -> Result<Self, ShellError>;

    fn with_chord(&self, chord: f64) -> Self;

    fn x3(&self, x1: f64, diff: Diff) -> f64;

    /// Equality constraints the curve needs enforced (e.g. continuity at
    /// segment joins). Zero when satisfied.
    fn continuity_residuals(&self) -> Vec<f64> {
        Vec::new()
    }

    /// Position `(x1, x3)` on the curve
    fn r(&self, x1: f64) -> Vector2<f64> {
        Vector2::new(x1, self.x3(x1, Diff::None))
    }

    /// Rate of arclength per unit `x1`
    fn speed(&self, x1: f64) -> f64 {
        let d = self.x3(x1, Diff::X1);
        (1.0 + d * d).sqrt()
    }

    fn slope_angle(&self, x1: f64) -> f64 {
        self.x3(x1, Diff::X1).atan2(1.0)
    }

    /// Arclength from the origin to `x1`
    ///
    /// # Returns
    /// The arclength and an estimate of its quadrature error
    fn arclength(&self, x1: f64) -> (f64, f64) {
        let fine = gauss_legendre(|t| self.speed(t), 0.0, x1, ARC_PANELS);
        let coarse = gauss_legendre(|t| self.speed(t), 0.0, x1, ARC_PANELS / 2);
        (fine, (fine - coarse).abs())
    }

    /// Total arclength up to the chord
    fn length(&self) -> f64 {
        gauss_legendre(|t| self.speed(t), 0.0, self.chord(), ARC_PANELS)
    }

    /// Inverse of `arclength`: the `x1` at which the curve has length `theta`
    ///
    /// # Arguments
    /// * `theta` - Target arclength
    /// * `bounds` - Optional `(min, max)` clamp for `x1`. Defaults to `x1 >= 0`
    fn calculate_x1(&self, theta: f64, bounds: Option<(f64, f64)>) -> f64 {
        let length = self.length();
        let guess = if length > 0.0 {
            theta * self.chord() / length
        } else {
            theta
        };
        let start = clamp_x1(guess, bounds);
        let s_start = self.arclength(start).0;
        march_x1(self, start, s_start, theta, bounds)
    }

    /// `calculate_x1` for an ascending list of targets, marching from one
    /// target to the next instead of integrating from the origin each time
    fn calculate_x1_grid(&self, thetas: &[f64], bounds: Option<(f64, f64)>) -> Vec<f64> {
        let mut x1 = clamp_x1(0.0, bounds);
        let mut s = self.arclength(x1).0;
        let mut out = Vec::with_capacity(thetas.len());
        for &theta in thetas {
            let next = march_x1(self, x1, s, theta, bounds);
            s += gauss_legendre(|t| self.speed(t), x1, next, 4);
            x1 = next;
            out.push(x1);
        }
        out
    }

    /// Covariant basis at `x1`. The arclength frame stays defined where the
    /// slope is infinite (a vertical tangent, e.g. a round leading edge).
    fn basis(&self, x1: f64, frame: Frame) -> Basis {
        match frame {
            Frame::X1 => {
                let d = self.x3(x1, Diff::X1);
                let s = (1.0 + d * d).sqrt();
                Basis {
                    a: [
                        Vector3::new(1.0, 0.0, d),
                        Vector3::y(),
                        Vector3::new(-d / s, 0.0, 1.0 / s),
                    ],
                }
            }
            Frame::Theta => {
                let (tangent, normal) = unit_frame(self, x1);
                Basis {
                    a: [tangent, Vector3::y(), normal],
                }
            }
        }
    }

    /// Derivative of each basis vector along the curve parameter of `frame`
    fn basis_derivative(&self, x1: f64, frame: Frame) -> Basis {
        match frame {
            Frame::X1 => {
                let d = self.x3(x1, Diff::X1);
                let dd = self.x3(x1, Diff::X11);
                let s = (1.0 + d * d).sqrt();
                let ds = d * dd / s;
                Basis {
                    a: [
                        Vector3::new(0.0, 0.0, dd),
                        Vector3::zeros(),
                        Vector3::new(-dd / s + d * ds / (s * s), 0.0, -ds / (s * s)),
                    ],
                }
            }
            Frame::Theta => {
                let kappa = signed_curvature(self, x1);
                let (tangent, normal) = unit_frame(self, x1);
                Basis {
                    a: [normal * kappa, Vector3::zeros(), -tangent * kappa],
                }
            }
        }
    }

    fn metric_tensor(&self, x1: f64, frame: Frame) -> Matrix3<f64> {
        let basis = self.basis(x1, frame);
        Matrix3::from_fn(|i, j| basis.a[i].dot(&basis.a[j]))
    }

    fn metric_tensor_derivative(&self, x1: f64, frame: Frame) -> Matrix3<f64> {
        let basis = self.basis(x1, frame);
        let diff = self.basis_derivative(x1, frame);
        Matrix3::from_fn(|i, j| diff.a[i].dot(&basis.a[j]) + basis.a[i].dot(&diff.a[j]))
    }

    /// Second fundamental form restricted to the in-plane directions
    fn curvature_tensor(&self, x1: f64, frame: Frame) -> Matrix2<f64> {
        let basis = self.basis(x1, frame);
        let diff = self.basis_derivative(x1, frame);
        // the span direction is straight, so only a1,1 contributes
        Matrix2::new(basis.a[2].dot(&diff.a[0]), 0.0, 0.0, 0.0)
    }

    /// Christoffel symbol `Γ^l_ij` of the mid-line parametrization
    /// `r(x1, x2) = p(x1) + x2 n(x1)`. Indices are 1-based: 1 is the
    /// tangent, 2 the in-plane normal.
    fn christoffel(&self, i: usize, j: usize, l: usize, x1: f64) -> f64 {
        let basis = self.basis(x1, Frame::X1);
        let diff = self.basis_derivative(x1, Frame::X1);
        let tangent = basis.a[0];
        let normal = basis.a[2];

        let second = match (i, j) {
            (1, 1) => diff.a[0],
            (1, 2) | (2, 1) => diff.a[2],
            _ => Vector3::zeros(),
        };
        let dual = match l {
            1 => tangent / tangent.norm_squared(),
            _ => normal,
        };
        dual.dot(&second)
    }
}

/// A point just inside `[0, chord]` next to `x1`, where a curve with an
/// infinite slope at `x1` is regular again
fn interior<G: Geometry + ?Sized>(geometry: &G, x1: f64) -> f64 {
    let nudge = LIMIT_STEP * geometry.chord();
    if x1 + nudge <= geometry.chord() {
        x1 + nudge
    } else {
        x1 - nudge
    }
}

/// Unit tangent and normal from the slope angle
fn unit_frame<G: Geometry + ?Sized>(geometry: &G, x1: f64) -> (Vector3<f64>, Vector3<f64>) {
    let mut phi = geometry.x3(x1, Diff::X1).atan();
    if !phi.is_finite() {
        phi = geometry.x3(interior(geometry, x1), Diff::X1).atan();
    }
    let (sin, cos) = phi.sin_cos();
    (Vector3::new(cos, 0.0, sin), Vector3::new(-sin, 0.0, cos))
}

/// `x3'' / (1 + x3'^2)^(3/2)`, taken as its one-sided limit where the
/// derivatives diverge
fn signed_curvature<G: Geometry + ?Sized>(geometry: &G, x1: f64) -> f64 {
    let kappa = |x: f64| {
        let d = geometry.x3(x, Diff::X1);
        let dd = geometry.x3(x, Diff::X11);
        dd / (1.0 + d * d).powf(1.5)
    };
    match kappa(x1) {
        k if k.is_finite() => k,
        _ => kappa(interior(geometry, x1)),
    }
}

/// Slope of `s(x1)` for a Newton step. Where the speed diverges the mean
/// speed over the step is used instead; it is finite and at least 1.
fn step_speed<G: Geometry + ?Sized>(geometry: &G, x1: f64, mismatch: f64) -> f64 {
    let speed = geometry.speed(x1);
    if speed.is_finite() {
        return speed;
    }
    let end = (x1 + mismatch).clamp(0.0, geometry.chord().max(x1));
    if end == x1 {
        return 1.0;
    }
    gauss_legendre(|t| geometry.speed(t), x1, end, 4) / (end - x1)
}

fn clamp_x1(x1: f64, bounds: Option<(f64, f64)>) -> f64 {
    match bounds {
        Some((lo, hi)) => x1.clamp(lo, hi),
        None => x1.max(0.0),
    }
}

/// Newton iteration on `s(x1) = theta` starting from a point of known length.
/// Steps that leave the bracket found so far are replaced by bisection.
fn march_x1<G: Geometry + ?Sized>(
    geometry: &G,
    x_start: f64,
    s_start: f64,
    theta: f64,
    bounds: Option<(f64, f64)>,
) -> f64 {
    let mut x1 = x_start;
    let mut s = s_start;
    let (mut below, mut above) = (f64::NEG_INFINITY, f64::INFINITY);
    for _ in 0..MAX_NEWTON_ITER {
        let mismatch = theta - s;
        if mismatch.abs() <= NEWTON_TOLERANCE * (1.0 + theta.abs()) {
            break;
        }
        if mismatch > 0.0 {
            below = x1;
        } else {
            above = x1;
        }

        let mut next = x1 + mismatch / step_speed(geometry, x1, mismatch);
        if !(next > below && next < above) && below.is_finite() && above.is_finite() {
            next = 0.5 * (below + above);
        }
        let next = clamp_x1(next, bounds);
        if !next.is_finite() {
            return f64::NAN;
        }
        if next == x1 {
            break;
        }
        s += gauss_legendre(|t| geometry.speed(t), x1, next, 4);
        x1 = next;
    }
    x1
}
