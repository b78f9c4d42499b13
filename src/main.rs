use clap::Parser;

use shellsolve::{
    beam::BeamModel,
    error::ShellError,
    geometry::Geometry,
    input::{self, BoundsInput, Case, ModelKind},
    post_processor,
    shell::{CoefficientMap, ShellModel},
    solver::{self, Bounds, Loadable, SolverConfig, Structure},
};

/// Finds the equilibrium shape of a shell or beam described by a JSON case
#[derive(Parser, Debug)]
#[command(name = "shellsolve", version)]
struct Cli {
    /// Input case file
    input: String,

    /// Where to write the parent and deformed shapes
    #[arg(short, long, default_value = "shape.csv")]
    output: String,

    /// Number of load steps; overrides the case file
    #[arg(short, long)]
    steps: Option<usize>,

    /// Where to write the load path when stepping
    #[arg(long)]
    load_path: Option<String>,

    /// Log every solver iteration
    #[arg(short, long)]
    verbose: bool,

    /// Draw a progress bar over the solver iterations
    #[arg(long)]
    progress: bool,
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        println!("{err}");
        std::process::exit(1)
    }
}

fn run(cli: &Cli) -> Result<(), ShellError> {
    let mut case = input::load_case(&cli.input)?;
    println!("info: loaded {} case from {}", model_name(case.model), cli.input);

    if let Some(steps) = cli.steps {
        case.solver.steps = steps;
    }
    case.solver.config.verbose |= cli.verbose;
    case.solver.config.progress |= cli.progress;

    match case.model {
        ModelKind::Shell => {
            let template = case.geometry.coefficients();
            let free = case
                .solver
                .free
                .clone()
                .unwrap_or_else(|| (0..template.len()).collect());
            let x0_default = free.iter().map(|&i| template.get(i).copied().unwrap_or(0.0)).collect();

            let shell = ShellModel::new(
                case.geometry.clone(),
                case.properties.clone(),
                case.boundary_conditions.clone(),
                case.mesh.clone(),
            )?
            .with_coefficient_map(CoefficientMap::free_indices(template, free)?);

            solve(&shell, &case, x0_default, cli)
        }
        ModelKind::Beam => {
            let beam = BeamModel::new(
                case.geometry.clone(),
                case.geometry.clone(),
                case.properties.clone(),
                case.boundary_conditions.clone(),
                case.mesh.clone(),
            )?
            .with_condition(case.loading_condition);
            let x0_default = vec![0.0; beam.n_free()];

            solve(&beam, &case, x0_default, cli)
        }
    }
}

fn solve<S: Loadable>(
    structure: &S,
    case: &Case,
    x0_default: Vec<f64>,
    cli: &Cli,
) -> Result<(), ShellError> {
    let x0 = case.solver.x0.clone().unwrap_or(x0_default);
    let bounds = build_bounds(&case.solver.bounds, &x0)?;
    let config: &SolverConfig = &case.solver.config;

    let solution = if case.solver.steps >= 2 {
        println!("info: applying loads in {} steps", case.solver.steps);
        let path = solver::stepped_loading(structure, &x0, &bounds, case.solver.steps, config)?;
        if let Some(output) = &cli.load_path {
            post_processor::load_path_output(&path, output)?;
        }
        match path.steps.into_iter().last() {
            Some(step) => step.solution,
            None => {
                return Err(ShellError::Solver(
                    "Load stepping returned no steps".to_owned(),
                ))
            }
        }
    } else {
        solver::minimum_potential(structure, &x0, &bounds, config)?
    };

    if !solution.converged() {
        println!(
            "warning [solver]: stopped with {:?} after {} iterations",
            solution.status, solution.iterations
        );
    }
    println!("info: coefficients {:?}", solution.coefficients);
    println!(
        "info: strain energy {:.6e}, work {:.6e}, residual {:.6e}",
        solution.evaluation.strain_energy,
        solution.evaluation.work.potential,
        solution.residual
    );
    for (i, u) in solution.evaluation.displacements.iter().enumerate() {
        println!("info: load {i} displacement ({:.6e}, {:.6e})", u.x, u.y);
    }

    let shape = structure.deformed_shape(&solution.coefficients)?;
    post_processor::csv_output(&shape, &cli.output)
}

/// Symmetric bounds are centered on the initial guess
fn build_bounds(bounds: &Option<BoundsInput>, x0: &[f64]) -> Result<Bounds, ShellError> {
    match bounds {
        Some(BoundsInput::Symmetric(half_width)) => Bounds::new(
            x0.iter().map(|x| x - half_width).collect(),
            x0.iter().map(|x| x + half_width).collect(),
        ),
        Some(BoundsInput::Explicit { lower, upper }) => Bounds::new(lower.clone(), upper.clone()),
        None => Ok(Bounds::symmetric(x0.len(), solver::DEFAULT_BOUND)),
    }
}

fn model_name(model: ModelKind) -> &'static str {
    match model {
        ModelKind::Shell => "shell",
        ModelKind::Beam => "beam",
    }
}
