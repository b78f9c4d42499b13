use crate::{
    datatypes::{BoundaryConditions, ShapePoint},
    energy::{Evaluation, Loading},
    error::ShellError,
};
use indicatif::{ProgressBar, ProgressStyle};

use argmin::{
    core::{
        observers::{Observe, ObserverMode},
        CostFunction, Error, Executor, Gradient, State, TerminationReason, KV,
    },
    solver::{linesearch::MoreThuenteLineSearch, neldermead::NelderMead, quasinewton::LBFGS},
};
use argmin_observer_slog::SlogLogger;

pub const DEFAULT_BOUND: f64 = 0.01;
pub const MAX_ITERS: u64 = 5000;
pub const TOLERANCE: f64 = 1e-12;
const SIMPLEX_STEP: f64 = 0.05;
const FD_STEP: f64 = 1e-6;
const BOX_PENALTY: f64 = 1e6;
const LBFGS_MEMORY: usize = 7;

/// Anything whose equilibrium can be found by minimizing total potential
/// energy over a coefficient vector.
pub trait Structure {
    /// Evaluates strain energy, work and residual for the coefficients `x`.
    /// Must not mutate anything shared between trials.
    fn evaluate(&self, x: &[f64]) -> Result<Evaluation, ShellError>;

    /// Equality constraints `g(x) = 0` the optimum has to satisfy
    fn equality_constraints(&self, _x: &[f64]) -> Result<Vec<f64>, ShellError> {
        Ok(Vec::new())
    }

    /// Parent and child positions of every mesh sample
    fn deformed_shape(&self, x: &[f64]) -> Result<Vec<ShapePoint>, ShellError>;
}

/// A structure whose loads can be swapped, as load stepping needs.
pub trait Loadable: Structure + Sized {
    fn boundary_conditions(&self) -> &BoundaryConditions;

    fn with_boundary_conditions(&self, boundary_conditions: BoundaryConditions) -> Self;

    fn with_loading(&self, loading: Loading) -> Self;
}

/// Box bounds on the physical coefficients. The optimizer only ever sees
/// coordinates normalized to `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Bounds, ShellError> {
        if lower.len() != upper.len() {
            return Err(ShellError::Configuration(format!(
                "{} lower bounds given for {} upper bounds",
                lower.len(),
                upper.len()
            )));
        }
        for (lo, hi) in std::iter::zip(&lower, &upper) {
            if !(lo.is_finite() && hi.is_finite()) || lo >= hi {
                return Err(ShellError::Configuration(format!(
                    "Bounds [{lo}, {hi}] are not a finite, non-empty interval"
                )));
            }
        }
        Ok(Bounds { lower, upper })
    }

    /// `[-half_width, half_width]` on each of `n` coefficients
    pub fn symmetric(n: usize, half_width: f64) -> Bounds {
        Bounds {
            lower: vec![-half_width.abs(); n],
            upper: vec![half_width.abs(); n],
        }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn normalize(&self, x: &[f64]) -> Vec<f64> {
        std::iter::zip(x, std::iter::zip(&self.lower, &self.upper))
            .map(|(v, (lo, hi))| (v - lo) / (hi - lo))
            .collect()
    }

    pub fn denormalize(&self, z: &[f64]) -> Vec<f64> {
        std::iter::zip(z, std::iter::zip(&self.lower, &self.upper))
            .map(|(v, (lo, hi))| lo + v * (hi - lo))
            .collect()
    }

    fn check(&self, x0: &[f64]) -> Result<(), ShellError> {
        if x0.len() != self.len() {
            return Err(ShellError::Configuration(format!(
                "Initial guess has {} coefficients but {} bounds were given",
                x0.len(),
                self.len()
            )));
        }
        for (i, v) in x0.iter().enumerate() {
            if !v.is_finite() || *v < self.lower[i] || *v > self.upper[i] {
                return Err(ShellError::Configuration(format!(
                    "Initial coefficient {i} = {v} is outside [{}, {}]",
                    self.lower[i], self.upper[i]
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Minimizer {
    /// Derivative-free simplex search; rejects points outside the box
    #[default]
    NelderMead,
    /// Quasi-Newton with finite-difference gradients and a box penalty
    Lbfgs,
}

/// Augmented Lagrangian settings for equality-constrained problems
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSettings {
    pub mu_init: f64,
    pub mu_factor: f64,
    pub mu_max: f64,
    pub max_outer_iters: usize,
    pub tolerance: f64,
}

impl Default for ConstraintSettings {
    fn default() -> Self {
        ConstraintSettings {
            mu_init: 10.0,
            mu_factor: 10.0,
            mu_max: 1e10,
            max_outer_iters: 20,
            tolerance: 1e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    pub minimizer: Minimizer,
    pub max_iters: u64,
    pub tolerance: f64,
    /// Log every iteration to the terminal
    pub verbose: bool,
    /// Draw an iteration progress bar
    pub progress: bool,
    pub constraints: ConstraintSettings,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            minimizer: Minimizer::default(),
            max_iters: MAX_ITERS,
            tolerance: TOLERANCE,
            verbose: false,
            progress: false,
            constraints: ConstraintSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Converged,
    MaxIters,
    Stopped(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub coefficients: Vec<f64>,
    pub residual: f64,
    /// Re-evaluation of the structure at `coefficients`
    pub evaluation: Evaluation,
    pub status: Status,
    pub iterations: u64,
    /// Largest absolute equality-constraint value at the optimum
    pub constraint_violation: f64,
}

impl Solution {
    pub fn converged(&self) -> bool {
        self.status == Status::Converged
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadStep {
    /// Fraction of the reference loads applied in this step
    pub factor: f64,
    pub solution: Solution,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadPath {
    pub steps: Vec<LoadStep>,
}

impl LoadPath {
    pub fn last(&self) -> Option<&LoadStep> {
        self.steps.last()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Penalty {
    lambda: Vec<f64>,
    mu: f64,
}

impl Penalty {
    /// `Σ λg + μ/2 Σ g²`
    fn augment(&self, g: &[f64]) -> f64 {
        std::iter::zip(&self.lambda, g)
            .map(|(l, v)| l * v + 0.5 * self.mu * v * v)
            .sum()
    }

    fn update(&mut self, g: &[f64], settings: &ConstraintSettings) {
        for (l, v) in self.lambda.iter_mut().zip(g) {
            *l += self.mu * v;
        }
        self.mu = (self.mu * settings.mu_factor).min(settings.mu_max);
    }
}

/// Potential energy seen by argmin, in normalized coordinates
struct Objective<'a, S: Structure + ?Sized> {
    structure: &'a S,
    bounds: &'a Bounds,
    minimizer: Minimizer,
    penalty: Option<Penalty>,
}

impl<'a, S: Structure + ?Sized> Objective<'a, S> {
    fn value(&self, z: &[f64]) -> Result<f64, ShellError> {
        let clamped = clamp_unit(z);
        let excess: f64 = std::iter::zip(z, &clamped).map(|(a, b)| (a - b).powi(2)).sum();
        if excess > 0.0 && self.minimizer == Minimizer::NelderMead {
            return Ok(f64::INFINITY);
        }

        let x = self.bounds.denormalize(&clamped);
        let mut value = self.structure.evaluate(&x)?.residual;
        if let Some(penalty) = &self.penalty {
            value += penalty.augment(&self.structure.equality_constraints(&x)?);
        }
        value += BOX_PENALTY * excess;

        Ok(sanitize(value))
    }
}

impl<'a, S: Structure + ?Sized> CostFunction for Objective<'a, S> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, z: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.value(z)?)
    }
}

impl<'a, S: Structure + ?Sized> Gradient for Objective<'a, S> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    /// Central finite differences
    fn gradient(&self, z: &Self::Param) -> Result<Self::Gradient, Error> {
        let mut gradient = Vec::with_capacity(z.len());
        let mut probe = z.clone();
        for i in 0..z.len() {
            probe[i] = z[i] + FD_STEP;
            let forward = self.value(&probe)?;
            probe[i] = z[i] - FD_STEP;
            let backward = self.value(&probe)?;
            probe[i] = z[i];

            let slope = (forward - backward) / (2.0 * FD_STEP);
            gradient.push(if slope.is_finite() { slope } else { 0.0 });
        }
        Ok(gradient)
    }
}

/// Observer bar for argmin solver
struct IterationBar {
    bar: ProgressBar,
}

impl IterationBar {
    fn new(max_iters: u64) -> IterationBar {
        let bar = ProgressBar::new(max_iters);
        if let Ok(style) = ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}") {
            bar.set_style(style);
        }
        IterationBar { bar }
    }
}

impl<I> Observe<I> for IterationBar
where
    I: State<Float = f64>,
{
    fn observe_init(&mut self, _name: &str, _state: &I, _kv: &KV) -> Result<(), Error> {
        Ok(())
    }

    fn observe_iter(&mut self, state: &I, _kv: &KV) -> Result<(), Error> {
        self.bar.set_position(state.get_iter());
        self.bar
            .set_message(format!("best residual {:.6e}", state.get_best_cost()));
        Ok(())
    }

    fn observe_final(&mut self, _state: &I) -> Result<(), Error> {
        self.bar.finish();
        Ok(())
    }
}

/// Outcome of one argmin run
struct InnerRun {
    z: Vec<f64>,
    iterations: u64,
    status: Status,
}

impl InnerRun {
    fn from_state<I>(state: &I, fallback: &[f64]) -> InnerRun
    where
        I: State<Param = Vec<f64>, Float = f64>,
    {
        let status = match state.get_termination_reason() {
            Some(TerminationReason::SolverConverged)
            | Some(TerminationReason::TargetCostReached) => Status::Converged,
            Some(TerminationReason::MaxItersReached) => Status::MaxIters,
            Some(reason) => Status::Stopped(format!("{reason:?}")),
            None => Status::Stopped("solver reported no termination reason".to_owned()),
        };

        InnerRun {
            z: state
                .get_best_param()
                .cloned()
                .unwrap_or_else(|| fallback.to_vec()),
            iterations: state.get_iter(),
            status,
        }
    }
}

/// Runs the configured minimizer once from `z0`
fn run_inner<S: Structure + ?Sized>(
    objective: Objective<S>,
    z0: Vec<f64>,
    config: &SolverConfig,
) -> Result<InnerRun, ShellError> {
    match config.minimizer {
        Minimizer::NelderMead => {
            let solver: NelderMead<Vec<f64>, f64> =
                NelderMead::new(initial_simplex(&z0)).with_sd_tolerance(config.tolerance)?;

            let mut executor = Executor::new(objective, solver)
                .configure(|state| state.max_iters(config.max_iters));
            if config.verbose {
                executor = executor.add_observer(SlogLogger::term(), ObserverMode::Always);
            }
            if config.progress {
                executor =
                    executor.add_observer(IterationBar::new(config.max_iters), ObserverMode::Always);
            }

            let res = executor.run()?;
            Ok(InnerRun::from_state(res.state(), &z0))
        }
        Minimizer::Lbfgs => {
            let linesearch: MoreThuenteLineSearch<Vec<f64>, Vec<f64>, f64> =
                MoreThuenteLineSearch::new();
            let solver: LBFGS<_, Vec<f64>, Vec<f64>, f64> = LBFGS::new(linesearch, LBFGS_MEMORY)
                .with_tolerance_grad(config.tolerance)?
                .with_tolerance_cost(config.tolerance)?;

            let mut executor = Executor::new(objective, solver)
                .configure(|state| state.param(z0.clone()).max_iters(config.max_iters));
            if config.verbose {
                executor = executor.add_observer(SlogLogger::term(), ObserverMode::Always);
            }
            if config.progress {
                executor =
                    executor.add_observer(IterationBar::new(config.max_iters), ObserverMode::Always);
            }

            let res = executor.run()?;
            Ok(InnerRun::from_state(res.state(), &z0))
        }
    }
}

/// Augmented Lagrangian outer loop around `run_inner`
fn augmented_lagrangian<S: Structure + ?Sized>(
    structure: &S,
    bounds: &Bounds,
    z0: Vec<f64>,
    n_constraints: usize,
    config: &SolverConfig,
) -> Result<InnerRun, ShellError> {
    let settings = &config.constraints;
    let mut penalty = Penalty {
        lambda: vec![0.0; n_constraints],
        mu: settings.mu_init,
    };
    let mut z = z0;
    let mut iterations = 0;

    for outer in 0..settings.max_outer_iters {
        let objective = Objective {
            structure,
            bounds,
            minimizer: config.minimizer,
            penalty: Some(penalty.clone()),
        };
        let run = run_inner(objective, z, config)?;
        iterations += run.iterations;
        z = run.z;

        let g = structure.equality_constraints(&bounds.denormalize(&clamp_unit(&z)))?;
        let violation = max_abs(&g);
        if config.verbose {
            println!(
                "info: constraint pass {}: mu={:.2e}, max violation={:.4e}",
                outer + 1,
                penalty.mu,
                violation
            );
        }
        if violation < settings.tolerance {
            return Ok(InnerRun {
                z,
                iterations,
                status: run.status,
            });
        }
        penalty.update(&g, settings);
    }

    println!(
        "warning [solver]: constraints not met after {} passes",
        settings.max_outer_iters
    );
    Ok(InnerRun {
        z,
        iterations,
        status: Status::Stopped("constraint tolerance not reached".to_owned()),
    })
}

/// Finds the coefficients that minimize total potential energy
///
/// # Arguments
/// * `structure` - The structure to solve
/// * `x0` - Initial coefficients, inside `bounds`
/// * `bounds` - Box bounds on the coefficients
/// * `config` - Minimizer settings
///
/// # Returns
/// The optimum, re-evaluated. Not converging is reported in `status`, not
/// raised.
pub fn minimum_potential<S: Structure + ?Sized>(
    structure: &S,
    x0: &[f64],
    bounds: &Bounds,
    config: &SolverConfig,
) -> Result<Solution, ShellError> {
    bounds.check(x0)?;
    if !structure.evaluate(x0)?.is_finite() {
        println!("warning [solver]: initial guess has a non-finite residual");
    }
    let constraints = structure.equality_constraints(x0)?;

    let start = std::time::Instant::now();
    let z0 = bounds.normalize(x0);
    let run = if x0.is_empty() {
        InnerRun {
            z: z0,
            iterations: 0,
            status: Status::Converged,
        }
    } else if constraints.is_empty() {
        let objective = Objective {
            structure,
            bounds,
            minimizer: config.minimizer,
            penalty: None,
        };
        run_inner(objective, z0, config)?
    } else {
        augmented_lagrangian(structure, bounds, z0, constraints.len(), config)?
    };

    let coefficients = bounds.denormalize(&clamp_unit(&run.z));
    let evaluation = structure.evaluate(&coefficients)?;
    let constraint_violation = max_abs(&structure.equality_constraints(&coefficients)?);

    if config.verbose {
        let elapsed = (std::time::Instant::now() - start).as_secs_f32();
        println!(
            "info: minimized in {} iterations ({:.3} seconds), residual {:.6e}",
            run.iterations, elapsed, evaluation.residual
        );
    }

    Ok(Solution {
        coefficients,
        residual: evaluation.residual,
        evaluation,
        status: run.status,
        iterations: run.iterations,
        constraint_violation,
    })
}

/// Applies the reference loads in `n_steps` equal increments from zero,
/// warm-starting every step from the previous optimum
///
/// # Returns
/// One converged state per load factor in `linspace(0, 1, n_steps)`
pub fn stepped_loading<S: Loadable>(
    structure: &S,
    x0: &[f64],
    bounds: &Bounds,
    n_steps: usize,
    config: &SolverConfig,
) -> Result<LoadPath, ShellError> {
    if n_steps < 2 {
        return Err(ShellError::Configuration(format!(
            "Load stepping needs at least 2 steps, got {n_steps}"
        )));
    }

    let reference = structure.boundary_conditions().clone();
    let mut loading = Loading::Direct;
    let mut x = x0.to_vec();
    let mut steps = Vec::with_capacity(n_steps);

    let bar = ProgressBar::new(n_steps as u64);
    for i in 0..n_steps {
        let factor = i as f64 / (n_steps - 1) as f64;
        let step = structure
            .with_boundary_conditions(reference.scaled(factor))
            .with_loading(loading.clone());

        let solution = minimum_potential(&step, &x, bounds, config)?;
        if !solution.converged() {
            println!(
                "warning [solver]: load step {} ({:.3}) ended with {:?}",
                i, factor, solution.status
            );
        }

        loading = Loading::Stepped(solution.evaluation.history());
        x.clone_from(&solution.coefficients);
        steps.push(LoadStep { factor, solution });
        bar.inc(1);
    }
    bar.finish_with_message(format!("info: completed {n_steps} load steps\n"));

    Ok(LoadPath { steps })
}

/// Evaluates a list of trial coefficient vectors
pub fn sweep<S: Structure + ?Sized>(
    structure: &S,
    trials: &[Vec<f64>],
) -> Result<Vec<Evaluation>, ShellError> {
    trials.iter().map(|x| structure.evaluate(x)).collect()
}

fn initial_simplex(z0: &[f64]) -> Vec<Vec<f64>> {
    let mut simplex = vec![z0.to_vec()];
    for i in 0..z0.len() {
        let mut vertex = z0.to_vec();
        vertex[i] = if z0[i] + SIMPLEX_STEP <= 1.0 {
            z0[i] + SIMPLEX_STEP
        } else {
            z0[i] - SIMPLEX_STEP
        };
        simplex.push(vertex);
    }
    simplex
}

fn clamp_unit(z: &[f64]) -> Vec<f64> {
    z.iter().map(|v| v.clamp(0.0, 1.0)).collect()
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        f64::INFINITY
    }
}

/// Largest magnitude; NaN counts as infinite
fn max_abs(values: &[f64]) -> f64 {
    values
        .iter()
        .map(|v| if v.is_nan() { f64::INFINITY } else { v.abs() })
        .fold(0.0, f64::max)
}
