//! Strain energy integration, external work and the potential energy residual.

use nalgebra::{Matrix2, Vector2};

use crate::error::ShellError;

/// How external work is accounted for in an evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Loading {
    /// Loads applied in one go from the undeformed state
    #[default]
    Direct,
    /// Loads applied on top of a previously converged load step
    Stepped(LoadHistory),
}

/// State of the previous converged load step.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadHistory {
    pub displacements: Vec<Vector2<f64>>,
    pub effective_loads: Vec<Vector2<f64>>,
    /// Path work accumulated up to that step
    pub work: f64,
}

impl LoadHistory {
    /// Undeformed, unloaded history for `n` load points
    pub fn unloaded(n: usize) -> LoadHistory {
        LoadHistory {
            displacements: vec![Vector2::zeros(); n],
            effective_loads: vec![Vector2::zeros(); n],
            work: 0.0,
        }
    }
}

/// External work of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Work {
    /// Work term of the minimized potential
    pub potential: f64,
    /// Work accumulated along the loading path
    pub path: f64,
}

/// Strains and energy density at one sample point.
///
/// For the beam reduction `gamma` holds the covariant strain and `rho` is
/// zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrainSample {
    /// Integration coordinate of the sample (parent arclength or `x1`)
    pub position: f64,
    pub gamma: Matrix2<f64>,
    pub rho: Matrix2<f64>,
    pub density: f64,
}

/// Everything computed for one coefficient vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub strain_energy: f64,
    pub work: Work,
    pub residual: f64,
    /// Displacement of every load point, in load order
    pub displacements: Vec<Vector2<f64>>,
    /// Loads resolved against the deformed slope, in load order
    pub effective_loads: Vec<Vector2<f64>>,
    pub samples: Vec<StrainSample>,
    pub chord: f64,
    pub length: f64,
}

impl Evaluation {
    /// A trial point that could not be evaluated. Its residual is NaN so the
    /// solver rejects it.
    pub fn invalid(n_loads: usize, chord: f64) -> Evaluation {
        Evaluation {
            strain_energy: f64::NAN,
            work: Work {
                potential: f64::NAN,
                path: f64::NAN,
            },
            residual: f64::NAN,
            displacements: vec![Vector2::repeat(f64::NAN); n_loads],
            effective_loads: vec![Vector2::repeat(f64::NAN); n_loads],
            samples: Vec::new(),
            chord,
            length: f64::NAN,
        }
    }

    /// Strain energy minus the work done along the loading path
    pub fn energy_balance(&self) -> f64 {
        self.strain_energy - self.work.path
    }

    pub fn is_finite(&self) -> bool {
        self.residual.is_finite()
    }

    /// History to continue loading from once this evaluation has converged
    pub fn history(&self) -> LoadHistory {
        LoadHistory {
            displacements: self.displacements.clone(),
            effective_loads: self.effective_loads.clone(),
            work: self.work.path,
        }
    }

    /// Sums two evaluations of independent structures
    pub fn combine(first: &Evaluation, second: &Evaluation) -> Evaluation {
        let chain = |a: &[Vector2<f64>], b: &[Vector2<f64>]| a.iter().chain(b).copied().collect();
        Evaluation {
            strain_energy: first.strain_energy + second.strain_energy,
            work: Work {
                potential: first.work.potential + second.work.potential,
                path: first.work.path + second.work.path,
            },
            residual: first.residual + second.residual,
            displacements: chain(&first.displacements, &second.displacements),
            effective_loads: chain(&first.effective_loads, &second.effective_loads),
            samples: first.samples.iter().chain(&second.samples).copied().collect(),
            chord: first.chord + second.chord,
            length: first.length + second.length,
        }
    }
}

/// Trapezoidal rule of `values` over a (possibly non-uniform) `grid`
pub fn trapezoid(values: &[f64], grid: &[f64]) -> f64 {
    std::iter::zip(values.windows(2), grid.windows(2))
        .map(|(v, x)| 0.5 * (v[0] + v[1]) * (x[1] - x[0]))
        .sum()
}

/// Integrates per-area energy densities along the shell and over its width
///
/// # Arguments
/// * `densities` - Energy density at each sample
/// * `grid` - Integration coordinate at each sample
/// * `width` - Span of the shell
pub fn shell_strain_energy(densities: &[f64], grid: &[f64], width: f64) -> f64 {
    width * trapezoid(densities, grid)
}

/// Discrete beam energy `½ A Σ w σ:ε` over equally spaced samples, with half
/// weight on the two end samples
pub fn beam_strain_energy(
    stresses: &[Matrix2<f64>],
    strains: &[Matrix2<f64>],
    dx: f64,
    area: f64,
) -> f64 {
    let n = stresses.len();
    let mut total = 0.0;
    for (k, (sigma, epsilon)) in std::iter::zip(stresses, strains).enumerate() {
        let weight = if k == 0 || k + 1 == n { 0.5 * dx } else { dx };
        total += weight * sigma.component_mul(epsilon).sum();
    }
    0.5 * area * total
}

/// Load seen by a point whose deformed slope angle is `slope`
///
/// The transverse component is projected onto the deformed normal direction
/// so that `f·u = P_z (u_z cos²φ + u_x cosφ sinφ) + P_x u_x`.
pub fn resolve_load(load: &Vector2<f64>, slope: f64) -> Vector2<f64> {
    let (sin, cos) = slope.sin_cos();
    Vector2::new(load.x + load.y * cos * sin, load.y * cos * cos)
}

/// External work done by concentrated loads
///
/// # Arguments
/// * `loads` - Applied loads
/// * `displacements` - Displacement of each load point
/// * `slopes` - Deformed slope angle at each load point
/// * `loading` - Direct application or continuation from a load step
///
/// # Returns
/// The work and the effective (slope-resolved) loads. When stepping, the
/// trapezoidal work is reported in `path` only; the minimized `potential`
/// holds the current loads fixed over the step.
pub fn external_work(
    loads: &[Vector2<f64>],
    displacements: &[Vector2<f64>],
    slopes: &[f64],
    loading: &Loading,
) -> Result<(Work, Vec<Vector2<f64>>), ShellError> {
    if loads.len() != displacements.len() || loads.len() != slopes.len() {
        return Err(ShellError::Configuration(format!(
            "{} loads, {} displacements and {} slopes do not line up",
            loads.len(),
            displacements.len(),
            slopes.len()
        )));
    }

    let effective: Vec<Vector2<f64>> = std::iter::zip(loads, slopes)
        .map(|(load, slope)| resolve_load(load, *slope))
        .collect();

    let work = match loading {
        Loading::Direct => {
            let w = std::iter::zip(&effective, displacements)
                .map(|(f, u)| f.dot(u))
                .sum();
            Work {
                potential: w,
                path: w,
            }
        }
        Loading::Stepped(history) => {
            if history.displacements.len() != loads.len()
                || history.effective_loads.len() != loads.len()
            {
                return Err(ShellError::Configuration(format!(
                    "Load history covers {} points but {} loads are applied",
                    history.displacements.len(),
                    loads.len()
                )));
            }
            let mut potential = history.work;
            let mut path = history.work;
            for i in 0..loads.len() {
                let du = displacements[i] - history.displacements[i];
                potential += effective[i].dot(&du);
                path += 0.5 * (effective[i] + history.effective_loads[i]).dot(&du);
            }
            Work { potential, path }
        }
    };

    Ok((work, effective))
}

/// Total potential energy: strain energy minus the potential work term
pub fn residual(strain_energy: f64, work: &Work) -> f64 {
    strain_energy - work.potential
}
