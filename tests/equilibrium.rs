use approx::assert_relative_eq;

use shellsolve::{
    beam::BeamModel,
    coupled::CoupledSystem,
    cst::Cst,
    datatypes::{BoundaryConditions, Properties},
    input,
    mesher::Mesh1D,
    shell::{CoefficientMap, ShellModel},
    solver::{minimum_potential, stepped_loading, Bounds, ConstraintSettings, SolverConfig, Structure},
};

const TIP_LOAD: f64 = -1.0;

fn cantilever_shell(load: f64, shape: [f64; 2]) -> ShellModel<Cst> {
    let parent = Cst::cantilever(&shape, 1.0).unwrap();
    let template = parent.shape.iter().copied().chain([parent.deltaz]).collect();
    let bc = if load == 0.0 {
        BoundaryConditions::unloaded()
    } else {
        BoundaryConditions::new(vec![[0.0, load]], vec![1.0]).unwrap()
    };
    ShellModel::new(parent, Properties::default(), bc, Mesh1D::uniform(21).unwrap())
        .unwrap()
        .with_coefficient_map(CoefficientMap::free_indices(template, vec![0, 1]).unwrap())
}

fn config() -> SolverConfig {
    SolverConfig {
        tolerance: 1e-14,
        max_iters: 2000,
        ..SolverConfig::default()
    }
}

#[test]
fn cantilever_tip_deflection_matches_beam_theory() {
    let shell = cantilever_shell(TIP_LOAD, [0.0, 0.0]);
    let bounds = Bounds::symmetric(2, 0.01);
    let solution = minimum_potential(&shell, &[0.0, 0.0], &bounds, &config()).unwrap();

    let ei = Properties::default().young * Properties::default().inertia();
    let expected_tip = TIP_LOAD / (3.0 * ei);
    assert_relative_eq!(
        solution.evaluation.displacements[0].y,
        expected_tip,
        max_relative = 0.02
    );

    // the cubic deflection curve is exactly representable
    assert_relative_eq!(solution.coefficients[0], TIP_LOAD / (2.0 * ei), max_relative = 0.05);
    assert_relative_eq!(solution.coefficients[1], TIP_LOAD / (3.0 * ei), max_relative = 0.05);

    // the mid-line does not stretch
    assert_relative_eq!(solution.evaluation.length, 1.0, epsilon = 1e-6);
    assert!(solution.evaluation.chord < 1.0);
    assert!(solution.residual < 0.0);
}

#[test]
fn reversing_the_load_mirrors_the_shape() {
    let bounds = Bounds::symmetric(2, 0.01);
    let down = minimum_potential(&cantilever_shell(TIP_LOAD, [0.0, 0.0]), &[0.0, 0.0], &bounds, &config())
        .unwrap();
    let up = minimum_potential(&cantilever_shell(-TIP_LOAD, [0.0, 0.0]), &[0.0, 0.0], &bounds, &config())
        .unwrap();
    assert_relative_eq!(down.coefficients[0], -up.coefficients[0], max_relative = 1e-3);
    assert_relative_eq!(
        down.evaluation.displacements[0].y,
        -up.evaluation.displacements[0].y,
        max_relative = 1e-3
    );
}

#[test]
fn two_load_steps_match_direct_loading() {
    let shell = cantilever_shell(TIP_LOAD, [0.0, 0.0]);
    let bounds = Bounds::symmetric(2, 0.01);
    let direct = minimum_potential(&shell, &[0.0, 0.0], &bounds, &config()).unwrap();
    let path = stepped_loading(&shell, &[0.0, 0.0], &bounds, 2, &config()).unwrap();

    let last = &path.last().unwrap().solution;
    assert_eq!(path.steps.len(), 2);
    assert_relative_eq!(path.steps[0].solution.coefficients[0], 0.0, epsilon = 1e-6);
    assert_relative_eq!(last.coefficients[0], direct.coefficients[0], max_relative = 1e-3);
    assert_relative_eq!(last.coefficients[1], direct.coefficients[1], max_relative = 1e-3);
}

#[test]
fn straight_beam_carries_axial_load() {
    let line = Cst::cantilever(&[0.0, 0.0], 1.0).unwrap();
    let beam = BeamModel::new(
        line.clone(),
        line,
        Properties::default(),
        BoundaryConditions::default(),
        Mesh1D::uniform(10).unwrap(),
    )
    .unwrap();
    let p = Properties::default();
    let strain = 10000.0 / (p.young * p.area());

    let direct = beam.find_stable(&[0.0], &SolverConfig::default()).unwrap();
    assert!(direct.converged());
    assert_relative_eq!(direct.coefficients[0], strain, max_relative = 1e-3);
    assert_relative_eq!(direct.evaluation.displacements[0].x, strain, max_relative = 1e-3);

    let bounds = Bounds::symmetric(1, shellsolve::beam::STRAIN_BOUND);
    let path = stepped_loading(&beam, &[0.0], &bounds, 3, &SolverConfig::default()).unwrap();
    let last = &path.last().unwrap().solution;
    assert_relative_eq!(last.coefficients[0], strain, max_relative = 1e-3);
    // linear response: the work done along the path is stored as strain energy
    assert_relative_eq!(
        last.evaluation.strain_energy,
        last.evaluation.work.path,
        max_relative = 1e-2
    );
}

#[test]
fn spar_keeps_its_length_under_load() {
    let upper = cantilever_shell(0.0, [0.02, 0.02]);
    let lower = cantilever_shell(TIP_LOAD, [0.0, 0.0]);
    let system = CoupledSystem::new(&upper, &lower, vec![1.0], 2).unwrap();
    assert_relative_eq!(system.spar_lengths()[0], 0.02, epsilon = 1e-12);

    let config = SolverConfig {
        tolerance: 1e-14,
        max_iters: 1000,
        constraints: ConstraintSettings {
            max_outer_iters: 10,
            tolerance: 1e-6,
            ..ConstraintSettings::default()
        },
        ..SolverConfig::default()
    };
    let bounds = Bounds::new(
        vec![0.01, 0.01, -0.01, -0.01],
        vec![0.03, 0.03, 0.01, 0.01],
    )
    .unwrap();
    let x0 = [0.02, 0.02, 0.0, 0.0];
    let solution = minimum_potential(&system, &x0, &bounds, &config).unwrap();

    assert!(solution.constraint_violation < 1e-4);
    let residuals = system.spar_residuals(&solution.coefficients).unwrap();
    assert!(residuals[0].abs() < 1e-4);

    // the upper shell picks up part of the load, so the lower tip moves less
    // than a free cantilever would
    let ei = Properties::default().young * Properties::default().inertia();
    let tip = solution.evaluation.displacements[0].y;
    assert!(tip < 0.0);
    assert!(tip > TIP_LOAD / (3.0 * ei));

    let shape = system.deformed_shape(&solution.coefficients).unwrap();
    assert!(shape[20].child.y < shape[20].parent.y);
}

#[test]
fn case_file_drives_a_solve() {
    let text = r#"{
        "model": "shell",
        "properties": {"young": 70e9, "poisson": 0.3, "dimensions": [0.01, 0.01]},
        "boundary_conditions": {"loads": [[0, -1]], "load_x": [1]},
        "mesh": {"n": 21},
        "geometry": {"shape": [0, 0], "chord": 1},
        "solver": {"free": [0, 1], "tolerance": 1e-14}
    }"#;
    let case = input::parse_case(text).unwrap();
    let template = vec![0.0, 0.0, 0.0];
    let shell = ShellModel::new(
        case.geometry,
        case.properties,
        case.boundary_conditions,
        case.mesh,
    )
    .unwrap()
    .with_coefficient_map(CoefficientMap::free_indices(template, vec![0, 1]).unwrap());

    let solution = minimum_potential(
        &shell,
        &[0.0, 0.0],
        &Bounds::symmetric(2, 0.01),
        &case.solver.config,
    )
    .unwrap();
    let ei = Properties::default().young * Properties::default().inertia();
    assert_relative_eq!(
        solution.evaluation.displacements[0].y,
        TIP_LOAD / (3.0 * ei),
        max_relative = 0.02
    );
}
