//! Beam reduction: the free variables are axial strains of the mesh
//! intervals and strains come from covariant derivatives of the
//! displacement field.

use nalgebra::{Matrix2, Vector2};

use crate::{
    datatypes::{BoundaryConditions, LoadingCondition, Properties, ShapePoint},
    energy::{beam_strain_energy, external_work, residual, Evaluation, Loading, StrainSample},
    error::ShellError,
    geometry::{Diff, Geometry},
    mesher::Mesh1D,
    solver::{minimum_potential, Bounds, Loadable, Solution, SolverConfig, Structure},
    strain::{covariant_strain, stress, DisplacementField},
};

/// Default bound on the interval strains
pub const STRAIN_BOUND: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct BeamModel<G: Geometry> {
    parent: G,
    child: G,
    properties: Properties,
    boundary_conditions: BoundaryConditions,
    mesh: Mesh1D,
    loading: Loading,
    condition: LoadingCondition,
}

impl<G: Geometry> BeamModel<G> {
    /// Creates a beam model
    ///
    /// # Arguments
    /// * `parent` - Undeformed geometry
    /// * `child` - Deformed shape, stretched along `x1` by the mesh factors
    /// * `properties` - Material and cross-section
    /// * `boundary_conditions` - Concentrated loads at parent chord fractions
    /// * `mesh` - Parent samples; one free strain per interval
    pub fn new(
        parent: G,
        child: G,
        properties: Properties,
        boundary_conditions: BoundaryConditions,
        mesh: Mesh1D,
    ) -> Result<BeamModel<G>, ShellError> {
        if !(parent.chord() > 0.0 && child.chord() > 0.0) {
            return Err(ShellError::Configuration(
                "Beam parent and child need positive chords".to_owned(),
            ));
        }
        Ok(BeamModel {
            parent,
            child,
            properties,
            boundary_conditions,
            mesh,
            loading: Loading::Direct,
            condition: LoadingCondition::default(),
        })
    }

    pub fn with_condition(self, condition: LoadingCondition) -> BeamModel<G> {
        BeamModel { condition, ..self }
    }

    pub fn n_free(&self) -> usize {
        self.mesh.alpha.len()
    }

    fn stretched_mesh(&self, strains: &[f64]) -> Result<Mesh1D, ShellError> {
        if strains.len() != self.n_free() {
            return Err(ShellError::Configuration(format!(
                "Beam has {} intervals but {} strains were given",
                self.n_free(),
                strains.len()
            )));
        }
        self.mesh
            .with_alpha(strains.iter().map(|e| 1.0 + e).collect())
    }

    /// Displacement field at one sample
    fn field(&self, x_p: f64, x_c: f64, alpha: f64) -> DisplacementField {
        let c_p = self.parent.chord();
        let c_c = self.child.chord();
        let x1_p = x_p * c_p;
        let x1_c = x_c * c_c;

        let u = self.child.r(x1_c) - self.parent.r(x1_p);
        let tangent = |g: &G, x1: f64| Vector2::new(1.0, g.x3(x1, Diff::X1));
        let du = alpha * (c_c / c_p) * tangent(&self.child, x1_c) - tangent(&self.parent, x1_p);

        let mut christoffel = [[[0.0; 2]; 2]; 2];
        for (l, plane) in christoffel.iter_mut().enumerate() {
            for (i, row) in plane.iter_mut().enumerate() {
                for (j, value) in row.iter_mut().enumerate() {
                    *value = self.parent.christoffel(i + 1, j + 1, l + 1, x1_p);
                }
            }
        }

        DisplacementField { u, du, christoffel }
    }

    /// Minimizes the potential over the interval strains, each bounded by
    /// `STRAIN_BOUND`
    pub fn find_stable(&self, x0: &[f64], config: &SolverConfig) -> Result<Solution, ShellError> {
        let bounds = Bounds::symmetric(self.n_free(), STRAIN_BOUND);
        minimum_potential(self, x0, &bounds, config)
    }

    /// Evaluates the beam with the same axial strain on every interval, once
    /// per entry of `strains`
    pub fn sweep_geometries(&self, strains: &[f64]) -> Result<Vec<Evaluation>, ShellError> {
        strains
            .iter()
            .map(|&e| self.evaluate(&vec![e; self.n_free()]))
            .collect()
    }
}

impl<G: Geometry> Structure for BeamModel<G> {
    fn evaluate(&self, x: &[f64]) -> Result<Evaluation, ShellError> {
        let mesh = self.stretched_mesh(x)?;
        let n = mesh.n;

        let mut strains = Vec::with_capacity(n);
        let mut stresses = Vec::with_capacity(n);
        for k in 0..n {
            let field = self.field(mesh.x_p[k], mesh.x_c[k], mesh.alpha_x[k]);
            let epsilon = covariant_strain(&field);
            stresses.push(stress(&epsilon, &self.properties, self.condition));
            strains.push(epsilon);
        }

        let dx = mesh.dx_p * self.parent.chord();
        let area = self.properties.area();
        let strain_energy = beam_strain_energy(&stresses, &strains, dx, area);

        let samples = (0..n)
            .map(|k| {
                let weight = if k == 0 || k + 1 == n { 0.5 } else { 1.0 };
                StrainSample {
                    position: mesh.x_p[k] * self.parent.chord(),
                    gamma: strains[k],
                    rho: Matrix2::zeros(),
                    density: weight * 0.5 * area * stresses[k].component_mul(&strains[k]).sum(),
                }
            })
            .collect();

        let displacements: Vec<Vector2<f64>> = self
            .boundary_conditions
            .concentrated
            .iter()
            .map(|load| {
                let (x_c, _) = mesh.map_point(load.x);
                self.child.r(x_c * self.child.chord()) - self.parent.r(load.x * self.parent.chord())
            })
            .collect();
        let slopes = vec![0.0; displacements.len()];
        let (work, effective_loads) = external_work(
            &self.boundary_conditions.loads(),
            &displacements,
            &slopes,
            &self.loading,
        )?;

        Ok(Evaluation {
            strain_energy,
            residual: residual(strain_energy, &work),
            work,
            displacements,
            effective_loads,
            samples,
            chord: self.child.chord(),
            length: self.child.length(),
        })
    }

    fn deformed_shape(&self, x: &[f64]) -> Result<Vec<ShapePoint>, ShellError> {
        let mesh = self.stretched_mesh(x)?;
        Ok(std::iter::zip(&mesh.x_p, &mesh.x_c)
            .map(|(x_p, x_c)| ShapePoint {
                parent: self.parent.r(x_p * self.parent.chord()),
                child: self.child.r(x_c * self.child.chord()),
            })
            .collect())
    }
}

impl<G: Geometry> Loadable for BeamModel<G> {
    fn boundary_conditions(&self) -> &BoundaryConditions {
        &self.boundary_conditions
    }

    fn with_boundary_conditions(&self, boundary_conditions: BoundaryConditions) -> Self {
        BeamModel {
            boundary_conditions,
            ..self.clone()
        }
    }

    fn with_loading(&self, loading: Loading) -> Self {
        BeamModel {
            loading,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cst::Cst;
    use approx::assert_relative_eq;

    fn straight_beam(mesh: Mesh1D) -> BeamModel<Cst> {
        let line = Cst::cantilever(&[0.0, 0.0], 1.0).unwrap();
        BeamModel::new(
            line.clone(),
            line,
            Properties::default(),
            BoundaryConditions::default(),
            mesh,
        )
        .unwrap()
    }

    #[test]
    fn unstretched_beam_has_no_energy() {
        let beam = straight_beam(Mesh1D::uniform(10).unwrap());
        let evaluation = beam.evaluate(&[0.0]).unwrap();
        assert_eq!(evaluation.strain_energy, 0.0);
        assert_eq!(evaluation.residual, 0.0);
    }

    #[test]
    fn uniform_stretch_gives_axial_energy() {
        let beam = straight_beam(Mesh1D::uniform(10).unwrap());
        let e = 1e-3;
        let evaluation = beam.evaluate(&[e]).unwrap();
        let p = Properties::default();
        assert_relative_eq!(
            evaluation.strain_energy,
            0.5 * p.young * p.area() * e * e,
            max_relative = 1e-9
        );
        assert_relative_eq!(evaluation.displacements[0].x, e, epsilon = 1e-15);
        assert_relative_eq!(evaluation.work.potential, 10000.0 * e, max_relative = 1e-12);
        for sample in &evaluation.samples {
            assert_relative_eq!(sample.gamma[(0, 0)], e, epsilon = 1e-12);
        }
    }

    #[test]
    fn residual_is_quadratic_in_strain() {
        let beam = straight_beam(Mesh1D::uniform(10).unwrap());
        let strains = [-0.002, 0.0, 0.002];
        let sweep = beam.sweep_geometries(&strains).unwrap();
        assert_eq!(sweep.len(), 3);
        // symmetric strain energy, work odd in strain
        assert_relative_eq!(sweep[0].strain_energy, sweep[2].strain_energy, max_relative = 1e-9);
        assert!(sweep[2].residual < sweep[0].residual);
    }

    #[test]
    fn axial_load_equilibrium() {
        let beam = straight_beam(Mesh1D::uniform(10).unwrap());
        let solution = beam.find_stable(&[0.0], &SolverConfig::default()).unwrap();
        let p = Properties::default();
        let expected = 10000.0 / (p.young * p.area());
        assert_relative_eq!(solution.coefficients[0], expected, max_relative = 1e-3);
        assert_relative_eq!(solution.evaluation.displacements[0].y, 0.0);
    }

    #[test]
    fn interval_count_is_checked() {
        let beam = straight_beam(Mesh1D::new(vec![1.0, 1.0], vec![0.0, 0.5, 1.0], 11).unwrap());
        assert_eq!(beam.n_free(), 2);
        assert!(beam.evaluate(&[0.0]).is_err());
        assert!(beam.evaluate(&[0.0, 0.001]).is_ok());
    }

    #[test]
    fn loading_conditions_order_stiffness() {
        let mesh = Mesh1D::uniform(10).unwrap();
        let e = 1e-3;
        let uniaxial = straight_beam(mesh.clone()).evaluate(&[e]).unwrap();
        let plane = straight_beam(mesh.clone())
            .with_condition(LoadingCondition::PlaneStress)
            .evaluate(&[e])
            .unwrap();
        let solid = straight_beam(mesh)
            .with_condition(LoadingCondition::ThreeDimensional)
            .evaluate(&[e])
            .unwrap();
        assert!(uniaxial.strain_energy < plane.strain_energy);
        assert!(plane.strain_energy < solid.strain_energy);
    }

    #[test]
    fn deformed_shape_is_stretched() {
        let beam = straight_beam(Mesh1D::uniform(5).unwrap());
        let shape = beam.deformed_shape(&[0.01]).unwrap();
        assert_relative_eq!(shape[4].child.x, 1.01);
        assert_relative_eq!(shape[4].displacement().x, 0.01, epsilon = 1e-15);
    }
}
