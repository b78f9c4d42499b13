//! Strain and stress tensors.
//!
//! The shell path differences metric and curvature tensors of the parent and
//! child curves. The beam path builds strains from covariant displacement
//! gradients instead.

use nalgebra::{Matrix2, Matrix3, Vector2};

use crate::datatypes::{LoadingCondition, Properties};

/// Membrane strain `½(A_child − A_parent)` on the in-plane 2×2 block
pub fn membrane_strain(metric_parent: &Matrix3<f64>, metric_child: &Matrix3<f64>) -> Matrix2<f64> {
    let difference = metric_child - metric_parent;
    0.5 * difference.fixed_view::<2, 2>(0, 0).into_owned()
}

/// Change of curvature `−(B_child − B_parent)`.
///
/// The transverse component is not taken from the curvature difference: it
/// is set to `−ν ρ[0][0]`, the plane-stress reduction the energy relies on.
pub fn bending_strain(
    curvature_parent: &Matrix2<f64>,
    curvature_child: &Matrix2<f64>,
    poisson: f64,
) -> Matrix2<f64> {
    let mut rho = -(curvature_child - curvature_parent);
    rho[(1, 1)] = -poisson * rho[(0, 0)];
    rho
}

/// Isotropic plane-stress elasticity tensor `C[αβγη]` of a thin shell,
/// written on the covariant metric (the coordinates are orthogonal, so the
/// contravariant form of the law is used with covariant components).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstitutiveTensor {
    pub c: [[[[f64; 2]; 2]; 2]; 2],
}

impl ConstitutiveTensor {
    pub fn new(metric: &Matrix3<f64>, properties: &Properties) -> ConstitutiveTensor {
        let nu = properties.poisson;
        let c0 = properties.young / 2.0 / (1.0 + nu);
        let c3 = 2.0 * nu / (1.0 - nu);
        let a = |i: usize, j: usize| metric[(i, j)];

        let mut c = [[[[0.0; 2]; 2]; 2]; 2];
        for alpha in 0..2 {
            for beta in 0..2 {
                for gamma in 0..2 {
                    for eta in 0..2 {
                        let a1 = a(alpha, gamma) * a(beta, eta);
                        let a2 = a(alpha, eta) * a(beta, gamma);
                        let a3 = a(alpha, beta) * a(gamma, eta);
                        c[alpha][beta][gamma][eta] = c0 * (a1 + a2 + c3 * a3);
                    }
                }
            }
        }
        ConstitutiveTensor { c }
    }

    /// `Σ C[αβγη] x[αβ] y[γη]`
    pub fn contract(&self, x: &Matrix2<f64>, y: &Matrix2<f64>) -> f64 {
        let mut total = 0.0;
        for alpha in 0..2 {
            for beta in 0..2 {
                for gamma in 0..2 {
                    for eta in 0..2 {
                        total += self.c[alpha][beta][gamma][eta]
                            * x[(alpha, beta)]
                            * y[(gamma, eta)];
                    }
                }
            }
        }
        total
    }
}

/// Strain energy per unit area at one sample point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyDensity {
    pub membrane: f64,
    pub bending: f64,
}

impl EnergyDensity {
    pub fn total(&self) -> f64 {
        self.membrane + self.bending
    }
}

/// Membrane energy weighted by `h/2`, bending by `h³/24`
pub fn energy_density(
    tensor: &ConstitutiveTensor,
    gamma: &Matrix2<f64>,
    rho: &Matrix2<f64>,
    thickness: f64,
) -> EnergyDensity {
    EnergyDensity {
        membrane: (thickness / 2.0) * tensor.contract(gamma, gamma),
        bending: (thickness.powi(3) / 24.0) * tensor.contract(rho, rho),
    }
}

/// Displacement of a mid-line point and the parent Christoffel symbols there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplacementField {
    pub u: Vector2<f64>,
    /// `∂u/∂x1`; the mid-line carries no through-thickness gradient
    pub du: Vector2<f64>,
    /// `christoffel[l][i][j] = Γ^(l+1)_(i+1)(j+1)`
    pub christoffel: [[[f64; 2]; 2]; 2],
}

/// Small-strain tensor from covariant derivatives,
/// `ε_ij = ½(u_i|j + u_j|i)` with `u_i|j = ∂_j u_i − Γ^l_ij u_l`
pub fn covariant_strain(field: &DisplacementField) -> Matrix2<f64> {
    let gradient = Matrix2::new(field.du[0], 0.0, field.du[1], 0.0);
    let covariant = Matrix2::from_fn(|i, j| {
        let correction: f64 = (0..2)
            .map(|l| field.christoffel[l][i][j] * field.u[l])
            .sum();
        gradient[(i, j)] - correction
    });
    0.5 * (covariant + covariant.transpose())
}

/// Stress from strain for the chosen constitutive law
pub fn stress(
    epsilon: &Matrix2<f64>,
    properties: &Properties,
    condition: LoadingCondition,
) -> Matrix2<f64> {
    let e = properties.young;
    let nu = properties.poisson;
    let trace = epsilon.trace();

    match condition {
        LoadingCondition::Uniaxial => e * epsilon,
        LoadingCondition::PlaneStress => {
            (e / (1.0 - nu * nu)) * ((1.0 - nu) * epsilon + nu * trace * Matrix2::identity())
        }
        LoadingCondition::ThreeDimensional => {
            let lambda = e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu));
            let mu = e / (2.0 * (1.0 + nu));
            2.0 * mu * epsilon + lambda * trace * Matrix2::identity()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn material() -> Properties {
        Properties::new(70e9, 0.3, [0.01, 0.01]).unwrap()
    }

    #[test]
    fn identical_metrics_give_zero_strain() {
        let a = Matrix3::new(1.2, 0.1, 0.0, 0.1, 1.0, 0.0, 0.0, 0.0, 1.0);
        assert_eq!(membrane_strain(&a, &a), Matrix2::zeros());
        let b = Matrix2::new(0.4, 0.0, 0.0, 0.0);
        assert_eq!(bending_strain(&b, &b, 0.3), Matrix2::zeros());
    }

    #[test]
    fn membrane_strain_is_symmetric() {
        let parent = Matrix3::identity();
        let child = Matrix3::new(1.1, 0.02, 0.3, 0.02, 0.97, -0.1, 0.3, -0.1, 1.0);
        let gamma = membrane_strain(&parent, &child);
        assert_eq!(gamma[(0, 1)], gamma[(1, 0)]);
        assert_relative_eq!(gamma[(0, 0)], 0.05, epsilon = 1e-15);
    }

    #[test]
    fn bending_strain_uses_poisson_reduction() {
        let parent = Matrix2::new(0.1, 0.0, 0.0, 0.0);
        let child = Matrix2::new(0.5, 0.0, 0.0, 0.7);
        let rho = bending_strain(&parent, &child, 0.25);
        assert_relative_eq!(rho[(0, 0)], -0.4);
        assert_relative_eq!(rho[(1, 1)], 0.1);
    }

    #[test]
    fn constitutive_tensor_reduces_to_plane_stress() {
        let p = material();
        let c = ConstitutiveTensor::new(&Matrix3::identity(), &p);
        let nu = p.poisson;
        assert_relative_eq!(c.c[0][0][0][0], p.young / (1.0 - nu * nu), max_relative = 1e-12);
        assert_relative_eq!(c.c[0][0][1][1], p.young * nu / (1.0 - nu * nu), max_relative = 1e-12);
        assert_relative_eq!(c.c[0][1][0][1], p.young / (2.0 * (1.0 + nu)), max_relative = 1e-12);
        assert_eq!(c.c[0][0][0][1], 0.0);
    }

    #[test]
    fn reduced_bending_energy_matches_beam_theory() {
        // ρ[1][1] = −νρ[0][0] turns the plate law into E h³ κ² / 24
        let p = material();
        let c = ConstitutiveTensor::new(&Matrix3::identity(), &p);
        let rho = bending_strain(&Matrix2::zeros(), &Matrix2::new(2.0, 0.0, 0.0, 0.0), p.poisson);
        let density = energy_density(&c, &Matrix2::zeros(), &rho, 0.01);
        assert_relative_eq!(
            density.bending,
            p.young * 0.01f64.powi(3) / 24.0 * 4.0,
            max_relative = 1e-12
        );
        assert_eq!(density.membrane, 0.0);
    }

    #[test]
    fn energy_density_is_non_negative() {
        let p = material();
        let metrics = [
            Matrix3::identity(),
            Matrix3::new(1.3, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0),
            Matrix3::new(0.8, 0.1, 0.0, 0.1, 1.1, 0.0, 0.0, 0.0, 1.0),
        ];
        let strains = [
            Matrix2::new(1e-3, 0.0, 0.0, -2e-3),
            Matrix2::new(-4e-3, 1e-3, 1e-3, 5e-4),
            Matrix2::new(0.0, -3e-3, -3e-3, 0.0),
            Matrix2::new(2e-3, 2e-3, 2e-3, 2e-3),
        ];
        for metric in &metrics {
            let c = ConstitutiveTensor::new(metric, &p);
            for gamma in &strains {
                for rho in &strains {
                    let density = energy_density(&c, gamma, rho, 0.01);
                    assert!(density.membrane >= 0.0);
                    assert!(density.bending >= 0.0);
                    assert!(density.total() >= 0.0);
                }
            }
        }
    }

    #[test]
    fn straight_stretch_gives_axial_strain() {
        let field = DisplacementField {
            u: Vector2::new(0.002, 0.0),
            du: Vector2::new(0.002, 0.0),
            christoffel: [[[0.0; 2]; 2]; 2],
        };
        let epsilon = covariant_strain(&field);
        assert_relative_eq!(epsilon[(0, 0)], 0.002);
        assert_eq!(epsilon[(0, 1)], 0.0);
        assert_eq!(epsilon[(1, 1)], 0.0);
    }

    #[test]
    fn christoffel_correction_is_symmetrized() {
        let mut christoffel = [[[0.0; 2]; 2]; 2];
        christoffel[1][0][0] = 0.5;
        let field = DisplacementField {
            u: Vector2::new(0.0, 0.1),
            du: Vector2::new(0.0, 0.2),
            christoffel,
        };
        let epsilon = covariant_strain(&field);
        assert_relative_eq!(epsilon[(0, 0)], -0.05);
        assert_relative_eq!(epsilon[(0, 1)], 0.1);
        assert_eq!(epsilon[(0, 1)], epsilon[(1, 0)]);
    }

    #[test]
    fn stress_laws() {
        let p = material();
        let epsilon = Matrix2::new(1e-3, 0.0, 0.0, 0.0);
        let uniaxial = stress(&epsilon, &p, LoadingCondition::Uniaxial);
        assert_relative_eq!(uniaxial[(0, 0)], 70e6, max_relative = 1e-12);
        assert_eq!(uniaxial[(1, 1)], 0.0);

        let plane = stress(&epsilon, &p, LoadingCondition::PlaneStress);
        assert_relative_eq!(plane[(0, 0)], 70e6 / (1.0 - 0.09), max_relative = 1e-12);
        assert_relative_eq!(plane[(1, 1)], 70e6 * 0.3 / (1.0 - 0.09), max_relative = 1e-12);

        let solid = stress(&epsilon, &p, LoadingCondition::ThreeDimensional);
        let lambda = 70e9 * 0.3 / (1.3 * 0.4);
        let mu = 70e9 / 2.6;
        assert_relative_eq!(solid[(0, 0)], (2.0 * mu + lambda) * 1e-3, max_relative = 1e-12);
        assert_relative_eq!(solid[(1, 1)], lambda * 1e-3, max_relative = 1e-12);
    }
}
