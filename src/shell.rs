//! Thin-shell equilibrium model.
//!
//! Parent and child points are paired by their arclength fraction: sample
//! `k` sits at `x_p[k]` of the parent length and at `x_c[k]` of the child
//! length. The child chord is solved for so that both curves have the
//! target length before any strain is measured.

use std::{fmt, sync::Arc};

use argmin::{
    core::{CostFunction, Error, Executor, State},
    solver::brent::BrentOpt,
};
use nalgebra::{Matrix2, Matrix3, Vector2};

use crate::{
    datatypes::{BoundaryConditions, Properties, ShapePoint},
    energy::{external_work, residual, shell_strain_energy, Evaluation, Loading, StrainSample},
    error::ShellError,
    geometry::{Frame, Geometry},
    mesher::Mesh1D,
    solver::{Loadable, Structure},
    strain::{bending_strain, energy_density, membrane_strain, ConstitutiveTensor},
};

pub const CHORD_SNAP: f64 = 1e-7;
pub const CHORD_BOUND_FACTOR: f64 = 0.5;
const BRENT_MAX_ITERS: u64 = 200;
/// Relative length mismatch above which chord matching is treated as failed
const LENGTH_MISMATCH: f64 = 1e-6;

/// Maps the optimizer's free variables onto a full coefficient vector.
#[derive(Clone, Default)]
pub enum CoefficientMap {
    /// Every coefficient is free
    #[default]
    Identity,
    /// Free variables overwrite `indices` of a fixed template
    Free {
        template: Vec<f64>,
        indices: Vec<usize>,
    },
    Custom(Arc<dyn Fn(&[f64]) -> Vec<f64> + Send + Sync>),
}

impl CoefficientMap {
    pub fn free_indices(template: Vec<f64>, indices: Vec<usize>) -> Result<CoefficientMap, ShellError> {
        if let Some(i) = indices.iter().find(|&&i| i >= template.len()) {
            return Err(ShellError::Configuration(format!(
                "Free index {i} is out of range for {} coefficients",
                template.len()
            )));
        }
        Ok(CoefficientMap::Free { template, indices })
    }

    pub fn custom<F>(map: F) -> CoefficientMap
    where
        F: Fn(&[f64]) -> Vec<f64> + Send + Sync + 'static,
    {
        CoefficientMap::Custom(Arc::new(map))
    }

    pub fn apply(&self, x: &[f64]) -> Result<Vec<f64>, ShellError> {
        match self {
            CoefficientMap::Identity => Ok(x.to_vec()),
            CoefficientMap::Free { template, indices } => {
                if x.len() != indices.len() {
                    return Err(ShellError::Configuration(format!(
                        "{} free variables given for {} free coefficients",
                        x.len(),
                        indices.len()
                    )));
                }
                let mut coefficients = template.clone();
                for (&i, &v) in std::iter::zip(indices, x) {
                    coefficients[i] = v;
                }
                Ok(coefficients)
            }
            CoefficientMap::Custom(map) => Ok(map(x)),
        }
    }
}

impl fmt::Debug for CoefficientMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoefficientMap::Identity => write!(f, "Identity"),
            CoefficientMap::Free { template, indices } => f
                .debug_struct("Free")
                .field("template", template)
                .field("indices", indices)
                .finish(),
            CoefficientMap::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Parent quantities that never change between trials
#[derive(Debug, Clone)]
struct ParentSamples {
    length: f64,
    theta: Vec<f64>,
    x1: Vec<f64>,
    metric: Vec<Matrix3<f64>>,
    curvature: Vec<Matrix2<f64>>,
}

/// A chord location tracked from parent to child
#[derive(Debug, Clone, Copy)]
struct MaterialPoint {
    /// Parent arclength fraction
    eta: f64,
    parent: Vector2<f64>,
}

/// Child geometry after chord matching
struct Deformed<G> {
    child: G,
    length: f64,
    x1: Vec<f64>,
}

/// Length mismatch of the child as a function of its chord
struct ChordProblem<'a, G: Geometry> {
    child: &'a G,
    target: f64,
}

impl<'a, G: Geometry> CostFunction for ChordProblem<'a, G> {
    type Param = f64;
    type Output = f64;

    fn cost(&self, chord: &Self::Param) -> Result<Self::Output, Error> {
        Ok((self.target - self.child.with_chord(*chord).length()).abs())
    }
}

#[derive(Debug, Clone)]
pub struct ShellModel<G: Geometry> {
    parent: G,
    properties: Properties,
    boundary_conditions: BoundaryConditions,
    mesh: Mesh1D,
    loading: Loading,
    coefficient_map: CoefficientMap,
    length_target: Option<f64>,
    chord_bounds: Option<(f64, f64)>,
    samples: ParentSamples,
    load_points: Vec<MaterialPoint>,
}

impl<G: Geometry> ShellModel<G> {
    /// Builds a shell model and samples the parent once
    ///
    /// # Arguments
    /// * `parent` - Undeformed geometry; its coefficients are the template
    ///     every child is built from
    /// * `properties` - Material and cross-section
    /// * `boundary_conditions` - Concentrated loads at parent chord fractions
    /// * `mesh` - Parent samples and their child images
    pub fn new(
        parent: G,
        properties: Properties,
        boundary_conditions: BoundaryConditions,
        mesh: Mesh1D,
    ) -> Result<ShellModel<G>, ShellError> {
        let length = parent.length();
        if !length.is_finite() || length <= 0.0 {
            return Err(ShellError::Configuration(format!(
                "Parent geometry must have a positive length, got {length}"
            )));
        }

        let theta: Vec<f64> = mesh.x_p.iter().map(|x| x * length).collect();
        let x1 = parent.calculate_x1_grid(&theta, None);
        let metric: Vec<Matrix3<f64>> = x1
            .iter()
            .map(|&x| parent.metric_tensor(x, Frame::Theta))
            .collect();
        let curvature = x1
            .iter()
            .map(|&x| parent.curvature_tensor(x, Frame::Theta))
            .collect();
        let samples = ParentSamples {
            length,
            theta,
            x1,
            metric,
            curvature,
        };
        let load_points = material_points(&parent, length, &boundary_conditions);

        Ok(ShellModel {
            parent,
            properties,
            boundary_conditions,
            mesh,
            loading: Loading::Direct,
            coefficient_map: CoefficientMap::Identity,
            length_target: None,
            chord_bounds: None,
            samples,
            load_points,
        })
    }

    pub fn with_coefficient_map(self, coefficient_map: CoefficientMap) -> ShellModel<G> {
        ShellModel {
            coefficient_map,
            ..self
        }
    }

    /// Length the child must have after chord matching. Defaults to the
    /// parent length (inextensible mid-line).
    pub fn with_length_target(self, target: f64) -> ShellModel<G> {
        ShellModel {
            length_target: Some(target),
            ..self
        }
    }

    pub fn with_chord_bounds(self, lower: f64, upper: f64) -> ShellModel<G> {
        ShellModel {
            chord_bounds: Some((lower, upper)),
            ..self
        }
    }

    pub fn parent(&self) -> &G {
        &self.parent
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn mesh(&self) -> &Mesh1D {
        &self.mesh
    }

    pub fn parent_length(&self) -> f64 {
        self.samples.length
    }

    pub fn length_target(&self) -> f64 {
        self.length_target.unwrap_or(self.samples.length)
    }

    pub fn chord_bounds(&self) -> (f64, f64) {
        let c = self.parent.chord();
        self.chord_bounds.unwrap_or((
            (1.0 - CHORD_BOUND_FACTOR) * c,
            (1.0 + CHORD_BOUND_FACTOR) * c,
        ))
    }

    /// Child geometry for the free variables `x`, before chord matching
    pub fn child(&self, x: &[f64]) -> Result<G, ShellError> {
        let coefficients = self.coefficient_map.apply(x)?;
        self.parent.with_coefficients(&coefficients)
    }

    /// Chord at which `child` reaches the target length
    ///
    /// # Returns
    /// The chord, snapped to the parent chord when within `CHORD_SNAP` of
    /// it, or NaN if no chord inside the bounds reaches the target
    pub fn match_chord(&self, child: &G) -> f64 {
        let (lower, upper) = self.chord_bounds();
        let target = self.length_target();
        let problem = ChordProblem { child, target };
        let solver = BrentOpt::new(lower, upper).set_tolerance(1e-10, 1e-14);

        let res = match Executor::new(problem, solver)
            .configure(|state| state.max_iters(BRENT_MAX_ITERS))
            .run()
        {
            Ok(r) => r,
            Err(_) => return f64::NAN,
        };

        let chord = match res.state().get_best_param() {
            Some(c) => *c,
            None => return f64::NAN,
        };
        if res.state().get_best_cost() > LENGTH_MISMATCH * target {
            return f64::NAN;
        }

        let parent_chord = self.parent.chord();
        if (chord - parent_chord).abs() < CHORD_SNAP {
            parent_chord
        } else {
            chord
        }
    }

    fn deform(&self, x: &[f64]) -> Result<Option<Deformed<G>>, ShellError> {
        let child = self.child(x)?;
        let chord = self.match_chord(&child);
        if !chord.is_finite() {
            return Ok(None);
        }

        let child = child.with_chord(chord);
        let length = child.length();
        let theta: Vec<f64> = self.mesh.x_c.iter().map(|x| x * length).collect();
        let x1 = child.calculate_x1_grid(&theta, None);

        Ok(Some(Deformed { child, length, x1 }))
    }

    /// Child position and slope angle of a tracked material point
    fn follow(&self, deformed: &Deformed<G>, point: &MaterialPoint) -> (Vector2<f64>, f64) {
        let (eta, _) = self.mesh.map_point(point.eta);
        let x1 = deformed.child.calculate_x1(eta * deformed.length, None);
        (deformed.child.r(x1), deformed.child.slope_angle(x1))
    }

    /// Parent positions of the given chord fractions
    pub fn parent_points(&self, locations: &[f64]) -> Vec<Vector2<f64>> {
        locations
            .iter()
            .map(|xi| self.parent.r(xi * self.parent.chord()))
            .collect()
    }

    /// Parent and child positions of the given chord fractions of the parent.
    /// Child positions are NaN when chord matching fails.
    pub fn material_points(&self, x: &[f64], locations: &[f64]) -> Result<Vec<ShapePoint>, ShellError> {
        let points: Vec<MaterialPoint> = locations
            .iter()
            .map(|&xi| material_point(&self.parent, self.samples.length, xi))
            .collect();
        let deformed = self.deform(x)?;

        Ok(points
            .iter()
            .map(|point| ShapePoint {
                parent: point.parent,
                child: match &deformed {
                    Some(d) => self.follow(d, point).0,
                    None => Vector2::repeat(f64::NAN),
                },
            })
            .collect())
    }
}

impl<G: Geometry> Structure for ShellModel<G> {
    fn evaluate(&self, x: &[f64]) -> Result<Evaluation, ShellError> {
        let deformed = match self.deform(x)? {
            Some(d) => d,
            None => return Ok(Evaluation::invalid(self.boundary_conditions.len(), f64::NAN)),
        };

        let poisson = self.properties.poisson;
        let thickness = self.properties.thickness();
        let mut samples = Vec::with_capacity(self.mesh.n);
        let mut densities = Vec::with_capacity(self.mesh.n);

        for k in 0..self.mesh.n {
            let stretch = self.mesh.alpha_x[k] * deformed.length / self.samples.length;
            let x1 = deformed.x1[k];
            let metric = stretch_metric(deformed.child.metric_tensor(x1, Frame::Theta), stretch);
            let curvature =
                stretch_curvature(deformed.child.curvature_tensor(x1, Frame::Theta), stretch);

            let gamma = membrane_strain(&self.samples.metric[k], &metric);
            let rho = bending_strain(&self.samples.curvature[k], &curvature, poisson);
            let tensor = ConstitutiveTensor::new(&metric, &self.properties);
            let density = energy_density(&tensor, &gamma, &rho, thickness).total();

            densities.push(density);
            samples.push(StrainSample {
                position: self.samples.theta[k],
                gamma,
                rho,
                density,
            });
        }
        let strain_energy =
            shell_strain_energy(&densities, &self.samples.theta, self.properties.width());

        let mut displacements = Vec::with_capacity(self.load_points.len());
        let mut slopes = Vec::with_capacity(self.load_points.len());
        for point in &self.load_points {
            let (position, slope) = self.follow(&deformed, point);
            displacements.push(position - point.parent);
            slopes.push(slope);
        }
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
            chord: deformed.child.chord(),
            length: deformed.length,
        })
    }

    /// Continuity the child curve has to keep at its segment joins
    fn equality_constraints(&self, x: &[f64]) -> Result<Vec<f64>, ShellError> {
        Ok(self.child(x)?.continuity_residuals())
    }

    fn deformed_shape(&self, x: &[f64]) -> Result<Vec<ShapePoint>, ShellError> {
        let deformed = self.deform(x)?;
        Ok((0..self.mesh.n)
            .map(|k| ShapePoint {
                parent: self.parent.r(self.samples.x1[k]),
                child: match &deformed {
                    Some(d) => d.child.r(d.x1[k]),
                    None => Vector2::repeat(f64::NAN),
                },
            })
            .collect())
    }
}

impl<G: Geometry> Loadable for ShellModel<G> {
    fn boundary_conditions(&self) -> &BoundaryConditions {
        &self.boundary_conditions
    }

    fn with_boundary_conditions(&self, boundary_conditions: BoundaryConditions) -> Self {
        let load_points =
            material_points(&self.parent, self.samples.length, &boundary_conditions);
        ShellModel {
            boundary_conditions,
            load_points,
            ..self.clone()
        }
    }

    fn with_loading(&self, loading: Loading) -> Self {
        ShellModel {
            loading,
            ..self.clone()
        }
    }
}

fn material_point<G: Geometry>(parent: &G, length: f64, xi: f64) -> MaterialPoint {
    let x1 = xi * parent.chord();
    MaterialPoint {
        eta: parent.arclength(x1).0 / length,
        parent: parent.r(x1),
    }
}

fn material_points<G: Geometry>(
    parent: &G,
    length: f64,
    boundary_conditions: &BoundaryConditions,
) -> Vec<MaterialPoint> {
    boundary_conditions
        .concentrated
        .iter()
        .map(|c| material_point(parent, length, c.x))
        .collect()
}

/// Scales the tangent row and column of an arclength-frame metric
fn stretch_metric(mut metric: Matrix3<f64>, stretch: f64) -> Matrix3<f64> {
    metric.row_mut(0).scale_mut(stretch);
    metric.column_mut(0).scale_mut(stretch);
    metric
}

fn stretch_curvature(mut curvature: Matrix2<f64>, stretch: f64) -> Matrix2<f64> {
    curvature.row_mut(0).scale_mut(stretch);
    curvature.column_mut(0).scale_mut(stretch);
    curvature
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cst::Cst, geometry::Diff, mesher::Mesh1D};
    use approx::assert_relative_eq;

    fn cantilever(load: f64) -> ShellModel<Cst> {
        let parent = Cst::cantilever(&[0.0, 0.0], 1.0).unwrap();
        let bc = BoundaryConditions::new(vec![[0.0, load]], vec![1.0]).unwrap();
        let mesh = Mesh1D::uniform(21).unwrap();
        ShellModel::new(parent, Properties::default(), bc, mesh)
            .unwrap()
            .with_coefficient_map(
                CoefficientMap::free_indices(vec![0.0, 0.0, 0.0], vec![0, 1]).unwrap(),
            )
    }

    #[test]
    fn free_indices_fill_template() {
        let map = CoefficientMap::free_indices(vec![1.0, 2.0, 3.0], vec![0, 2]).unwrap();
        assert_eq!(map.apply(&[9.0, 8.0]).unwrap(), vec![9.0, 2.0, 8.0]);
        assert!(map.apply(&[9.0]).is_err());
        assert!(CoefficientMap::free_indices(vec![1.0], vec![1]).is_err());
    }

    #[test]
    fn custom_map_is_applied() {
        let map = CoefficientMap::custom(|x| vec![x[0], -x[0], 0.0]);
        assert_eq!(map.apply(&[0.5]).unwrap(), vec![0.5, -0.5, 0.0]);
        assert_eq!(format!("{map:?}"), "Custom(..)");
    }

    #[test]
    fn undeformed_child_has_zero_residual() {
        let model = cantilever(-1.0);
        let evaluation = model.evaluate(&[0.0, 0.0]).unwrap();
        assert_eq!(evaluation.chord, 1.0);
        assert_relative_eq!(evaluation.strain_energy, 0.0, epsilon = 1e-14);
        assert_relative_eq!(evaluation.residual, 0.0, epsilon = 1e-12);
        assert_relative_eq!(evaluation.displacements[0].norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn curved_parent_is_unstrained_by_itself() {
        let parent = Cst::new(&[0.1, 0.05, 0.0], 1.0, 1.0, 1.0).unwrap();
        let coefficients = parent.coefficients();
        let model = ShellModel::new(
            parent,
            Properties::default(),
            BoundaryConditions::unloaded(),
            Mesh1D::uniform(11).unwrap(),
        )
        .unwrap();
        let evaluation = model.evaluate(&coefficients).unwrap();
        assert_relative_eq!(evaluation.strain_energy, 0.0, epsilon = 1e-12);
        for sample in &evaluation.samples {
            assert_relative_eq!(sample.gamma[(0, 0)], 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn matched_child_keeps_parent_length() {
        let model = cantilever(-1.0);
        let child = model.child(&[0.01, -0.005]).unwrap();
        let chord = model.match_chord(&child);
        assert!(chord < 1.0);
        assert_relative_eq!(
            child.with_chord(chord).length(),
            model.parent_length(),
            epsilon = 1e-8
        );
    }

    #[test]
    fn near_parent_chord_snaps() {
        let model = cantilever(-1.0);
        let child = model.child(&[1e-6, 0.0]).unwrap();
        assert_eq!(model.match_chord(&child), 1.0);
    }

    #[test]
    fn unreachable_length_gives_invalid_evaluation() {
        let model = cantilever(-1.0).with_length_target(5.0);
        let child = model.child(&[0.0, 0.0]).unwrap();
        assert!(model.match_chord(&child).is_nan());
        let evaluation = model.evaluate(&[0.0, 0.0]).unwrap();
        assert!(!evaluation.is_finite());
    }

    #[test]
    fn bending_energy_matches_curvature_integral() {
        // pure x1^2 shape: x3'' = 2 A0, U ≈ ½ E I ∫ κ² ds
        let model = cantilever(0.0);
        let a0 = 0.005;
        let evaluation = model.evaluate(&[a0, a0]).unwrap();
        let child = model.child(&[a0, a0]).unwrap().with_chord(evaluation.chord);
        let p = Properties::default();
        let kappa = |x: f64| {
            let d = child.x3(x, Diff::X1);
            child.x3(x, Diff::X11) / (1.0 + d * d).powf(1.5)
        };
        let exact = 0.5
            * p.young
            * p.inertia()
            * crate::geometry::gauss_legendre(|x| kappa(x).powi(2) * child.speed(x), 0.0, evaluation.chord, 32);
        assert_relative_eq!(evaluation.strain_energy, exact, max_relative = 1e-3);
    }

    #[test]
    fn stretching_mesh_strains_membrane() {
        let parent = Cst::cantilever(&[0.0, 0.0], 1.0).unwrap();
        let coefficients = parent.coefficients();
        let mesh = Mesh1D::new(vec![1.001], vec![0.0, 1.0], 11).unwrap();
        let model = ShellModel::new(
            parent,
            Properties::default(),
            BoundaryConditions::unloaded(),
            mesh,
        )
        .unwrap();
        let evaluation = model.evaluate(&coefficients).unwrap();
        let gamma = 0.5 * (1.001f64.powi(2) - 1.0);
        assert_relative_eq!(evaluation.samples[3].gamma[(0, 0)], gamma, epsilon = 1e-12);
        assert!(evaluation.strain_energy > 0.0);
    }

    #[test]
    fn stretched_membrane_uses_current_metric() {
        let parent = Cst::cantilever(&[0.0, 0.0], 1.0).unwrap();
        let coefficients = parent.coefficients();
        let mesh = Mesh1D::new(vec![1.1], vec![0.0, 1.0], 11).unwrap();
        let model = ShellModel::new(
            parent,
            Properties::default(),
            BoundaryConditions::unloaded(),
            mesh,
        )
        .unwrap();
        let evaluation = model.evaluate(&coefficients).unwrap();

        // A11 = 1.21 on the child, so C1111 = E A11^2 / (1 - nu^2)
        let p = Properties::default();
        let a11 = 1.1f64 * 1.1;
        let gamma = 0.5 * (a11 - 1.0);
        let expected = 0.5 * p.thickness() * p.young * a11 * a11 * gamma * gamma
            / (1.0 - p.poisson * p.poisson);
        for sample in &evaluation.samples {
            assert_relative_eq!(sample.density, expected, max_relative = 1e-9);
        }
    }

    #[test]
    fn round_nose_parent_is_unstrained_by_itself() {
        let parent = Cst::new(&[0.12, 0.1, 0.0], 1.0, 0.5, 1.0).unwrap();
        let coefficients = parent.coefficients();
        let model = ShellModel::new(
            parent,
            Properties::default(),
            BoundaryConditions::unloaded(),
            Mesh1D::uniform(11).unwrap(),
        )
        .unwrap();
        let evaluation = model.evaluate(&coefficients).unwrap();
        assert!(evaluation.is_finite());
        assert_relative_eq!(evaluation.strain_energy, 0.0, epsilon = 1e-8);
        assert_relative_eq!(evaluation.residual, 0.0, epsilon = 1e-8);
        for sample in &evaluation.samples {
            assert!(sample.gamma.iter().all(|g| g.is_finite()));
            assert!(sample.rho.iter().all(|r| r.is_finite()));
        }
    }

    #[test]
    fn tip_load_bends_downward() {
        let model = cantilever(-1.0);
        let evaluation = model.evaluate(&[-0.008, -0.005]).unwrap();
        assert!(evaluation.displacements[0].y < 0.0);
        assert!(evaluation.work.potential > 0.0);
        assert!(evaluation.effective_loads[0].y < 0.0);
    }

    #[test]
    fn deformed_shape_pairs_samples() {
        let model = cantilever(-1.0);
        let shape = model.deformed_shape(&[0.0, 0.0]).unwrap();
        assert_eq!(shape.len(), 21);
        assert_relative_eq!(shape[20].parent.x, 1.0, epsilon = 1e-12);
        for point in shape {
            assert_relative_eq!(point.displacement().norm(), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn material_points_follow_arclength() {
        let model = cantilever(-1.0);
        let points = model.material_points(&[-0.008, -0.005], &[0.5, 1.0]).unwrap();
        assert_relative_eq!(points[0].parent.x, 0.5);
        // the child tip is at the same arclength, so it sits inside the chord
        assert!(points[1].child.x < 1.0);
        assert!(points[1].child.y < points[0].child.y);
    }

    #[test]
    fn rescaled_loads_move_load_points() {
        let model = cantilever(-1.0);
        let moved = model
            .with_boundary_conditions(BoundaryConditions::new(vec![[0.0, -1.0]], vec![0.5]).unwrap());
        let tip = model.evaluate(&[-0.008, -0.005]).unwrap();
        let mid = moved.evaluate(&[-0.008, -0.005]).unwrap();
        assert!(mid.displacements[0].y.abs() < tip.displacements[0].y.abs());
        assert_eq!(moved.boundary_conditions().concentrated[0].x, 0.5);
    }
}
