//! Class/Shape Transformation curves.
//!
//! `x3(x1) = c C(psi) S(psi) + psi dz` with `psi = x1 / c`, class function
//! `C = psi^N1 (1 - psi)^N2` and a Bernstein shape function `S`.

use crate::{
    error::ShellError,
    geometry::{Diff, Geometry},
};

#[derive(Debug, Clone, PartialEq)]
pub struct Cst {
    pub shape: Vec<f64>,
    pub deltaz: f64,
    pub chord: f64,
    pub n1: f64,
    pub n2: f64,
}

impl Cst {
    /// Creates a CST curve
    ///
    /// # Arguments
    /// * `coefficients` - Bernstein coefficients followed by the trailing-edge
    ///     offset `dz`
    /// * `chord` - Horizontal extent of the curve
    /// * `n1` - Leading class exponent
    /// * `n2` - Trailing class exponent
    pub fn new(coefficients: &[f64], chord: f64, n1: f64, n2: f64) -> Result<Cst, ShellError> {
        if coefficients.len() < 2 {
            return Err(ShellError::Configuration(
                "CST needs at least one shape coefficient and a dz term".to_owned(),
            ));
        }
        if !chord.is_finite() || chord <= 0.0 {
            return Err(ShellError::Configuration(format!(
                "CST chord must be positive, got {chord}"
            )));
        }
        if n1 < 0.0 || n2 < 0.0 {
            return Err(ShellError::Configuration(format!(
                "CST class exponents must be non-negative, got N1={n1}, N2={n2}"
            )));
        }

        let (deltaz, shape) = coefficients
            .split_last()
            .ok_or_else(|| ShellError::Configuration("Empty CST coefficients".to_owned()))?;

        Ok(Cst {
            shape: shape.to_vec(),
            deltaz: *deltaz,
            chord,
            n1,
            n2,
        })
    }

    /// Clamped root, free tip: `N1 = 2`, `N2 = 0`, no tip offset
    pub fn cantilever(shape: &[f64], chord: f64) -> Result<Cst, ShellError> {
        let mut coefficients = shape.to_vec();
        coefficients.push(0.0);
        Cst::new(&coefficients, chord, 2.0, 0.0)
    }

    fn order(&self) -> usize {
        self.shape.len() - 1
    }

    /// Class function and its first two derivatives in `psi`
    fn class(&self, psi: f64) -> [f64; 3] {
        let (n1, n2) = (self.n1, self.n2);
        let q = 1.0 - psi;
        let c = power(1.0, psi, n1) * power(1.0, q, n2);
        let dc = power(n1, psi, n1 - 1.0) * power(1.0, q, n2)
            - power(1.0, psi, n1) * power(n2, q, n2 - 1.0);
        let ddc = power(n1 * (n1 - 1.0), psi, n1 - 2.0) * power(1.0, q, n2)
            - 2.0 * power(n1, psi, n1 - 1.0) * power(n2, q, n2 - 1.0)
            + power(1.0, psi, n1) * power(n2 * (n2 - 1.0), q, n2 - 2.0);
        [c, dc, ddc]
    }

    /// Bernstein shape function and its first two derivatives in `psi`
    fn shape_function(&self, psi: f64) -> [f64; 3] {
        let n = self.order();
        let a = &self.shape;

        let s = (0..=n).map(|i| a[i] * bernstein(i, n, psi)).sum();
        let ds = if n >= 1 {
            n as f64
                * (0..n)
                    .map(|i| (a[i + 1] - a[i]) * bernstein(i, n - 1, psi))
                    .sum::<f64>()
        } else {
            0.0
        };
        let dds = if n >= 2 {
            (n * (n - 1)) as f64
                * (0..n - 1)
                    .map(|i| (a[i + 2] - 2.0 * a[i + 1] + a[i]) * bernstein(i, n - 2, psi))
                    .sum::<f64>()
        } else {
            0.0
        };
        [s, ds, dds]
    }
}

impl Geometry for Cst {
    fn chord(&self) -> f64 {
        self.chord
    }

    fn coefficients(&self) -> Vec<f64> {
        let mut coefficients = self.shape.clone();
        coefficients.push(self.deltaz);
        coefficients
    }

    fn with_coefficients(&self, coefficients: &[f64]) -> Result<Self, ShellError> {
        if coefficients.len() != self.shape.len() + 1 {
            return Err(ShellError::Configuration(format!(
                "CST expects {} coefficients, got {}",
                self.shape.len() + 1,
                coefficients.len()
            )));
        }
        Cst::new(coefficients, self.chord, self.n1, self.n2)
    }

    fn with_chord(&self, chord: f64) -> Self {
        Cst {
            chord,
            ..self.clone()
        }
    }

    fn x3(&self, x1: f64, diff: Diff) -> f64 {
        let c = self.chord;
        let psi = x1 / c;
        let [cl, dcl, ddcl] = self.class(psi);
        let [s, ds, dds] = self.shape_function(psi);

        match diff {
            Diff::None => c * cl * s + psi * self.deltaz,
            Diff::X1 => dcl * s + cl * ds + self.deltaz / c,
            Diff::X11 => (ddcl * s + 2.0 * dcl * ds + cl * dds) / c,
        }
    }
}

/// `coefficient * base^exponent`, zero whenever the coefficient is zero,
/// even where the power diverges
fn power(coefficient: f64, base: f64, exponent: f64) -> f64 {
    if coefficient == 0.0 {
        return 0.0;
    }
    coefficient * base.powf(exponent)
}

fn binomial(n: usize, k: usize) -> f64 {
    (0..k).fold(1.0, |acc, i| acc * (n - i) as f64 / (i + 1) as f64)
}

fn bernstein(i: usize, n: usize, psi: f64) -> f64 {
    binomial(n, i) * psi.powi(i as i32) * (1.0 - psi).powi((n - i) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn finite_difference(curve: &Cst, x: f64, diff: Diff) -> f64 {
        let h = 1e-5;
        let lower = match diff {
            Diff::X1 => Diff::None,
            _ => Diff::X1,
        };
        (curve.x3(x + h, lower) - curve.x3(x - h, lower)) / (2.0 * h)
    }

    #[test]
    fn zero_coefficients_give_a_straight_line() {
        let line = Cst::cantilever(&[0.0, 0.0], 1.0).unwrap();
        for x in [0.0, 0.3, 1.0] {
            assert_eq!(line.x3(x, Diff::None), 0.0);
            assert_eq!(line.x3(x, Diff::X1), 0.0);
            assert_eq!(line.x3(x, Diff::X11), 0.0);
        }
    }

    #[test]
    fn cantilever_root_is_clamped() {
        let curve = Cst::cantilever(&[0.02, -0.01, 0.03], 1.0).unwrap();
        assert_eq!(curve.x3(0.0, Diff::None), 0.0);
        assert_eq!(curve.x3(0.0, Diff::X1), 0.0);
        assert_relative_eq!(curve.x3(0.0, Diff::X11), 2.0 * 0.02);
    }

    #[test]
    fn cantilever_reproduces_cubic() {
        // psi^2 (a0 (1 - psi) + a1 psi) = a0 psi^2 + (a1 - a0) psi^3
        let (a0, a1) = (0.3, -0.2);
        let curve = Cst::cantilever(&[a0, a1], 1.0).unwrap();
        let x = 0.7;
        assert_relative_eq!(
            curve.x3(x, Diff::None),
            a0 * x * x + (a1 - a0) * x.powi(3),
            epsilon = 1e-15
        );
    }

    #[test]
    fn derivatives_match_finite_differences() {
        let curve = Cst::new(&[0.17, 0.12, 0.15, 0.1, 0.002], 0.8, 0.5, 1.0).unwrap();
        for x in [0.1, 0.35, 0.6, 0.75] {
            assert_relative_eq!(
                curve.x3(x, Diff::X1),
                finite_difference(&curve, x, Diff::X1),
                epsilon = 1e-7
            );
            assert_relative_eq!(
                curve.x3(x, Diff::X11),
                finite_difference(&curve, x, Diff::X11),
                epsilon = 1e-5
            );
        }
    }

    #[test]
    fn trailing_edge_offset_sets_the_tip_height() {
        let curve = Cst::new(&[0.1, 0.2, 0.05], 2.0, 0.5, 1.0).unwrap();
        assert_relative_eq!(curve.x3(2.0, Diff::None), 0.05, epsilon = 1e-15);
    }

    #[test]
    fn chord_scales_the_shape_similarly() {
        let curve = Cst::cantilever(&[0.1, 0.05], 1.0).unwrap();
        let doubled = curve.with_chord(2.0);
        assert_relative_eq!(doubled.length(), 2.0 * curve.length(), epsilon = 1e-12);
    }

    #[test]
    fn coefficient_count_is_checked() {
        let curve = Cst::cantilever(&[0.0, 0.0], 1.0).unwrap();
        assert_eq!(curve.coefficients(), vec![0.0, 0.0, 0.0]);
        assert!(curve.with_coefficients(&[0.1, 0.2]).is_err());
        let updated = curve.with_coefficients(&[0.1, 0.2, 0.0]).unwrap();
        assert_eq!(updated.shape, vec![0.1, 0.2]);
    }

    #[test]
    fn invalid_construction_is_rejected() {
        assert!(Cst::new(&[0.1], 1.0, 1.0, 1.0).is_err());
        assert!(Cst::new(&[0.1, 0.0], 0.0, 1.0, 1.0).is_err());
        assert!(Cst::new(&[0.1, 0.0], 1.0, -1.0, 1.0).is_err());
    }
}
