use json::JsonValue;

use crate::{
    cst::Cst,
    datatypes::{BoundaryConditions, LoadingCondition, Properties},
    error::ShellError,
    mesher::{Mesh1D, DEFAULT_MESH_N},
    piecewise::{Continuity, PiecewiseCurve},
    solver::{Minimizer, SolverConfig, DEFAULT_BOUND},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Shell,
    Beam,
}

/// Box bounds as written in the case file
#[derive(Debug, Clone, PartialEq)]
pub enum BoundsInput {
    Symmetric(f64),
    Explicit { lower: Vec<f64>, upper: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverInput {
    pub x0: Option<Vec<f64>>,
    pub bounds: Option<BoundsInput>,
    /// Indices of the geometry coefficients the solver may change
    pub free: Option<Vec<usize>>,
    /// Number of load steps; 1 applies the loads directly
    pub steps: usize,
    pub config: SolverConfig,
}

/// Everything needed to set up and solve one equilibrium problem
#[derive(Debug, Clone)]
pub struct Case {
    pub model: ModelKind,
    pub properties: Properties,
    pub boundary_conditions: BoundaryConditions,
    pub mesh: Mesh1D,
    pub geometry: PiecewiseCurve,
    pub loading_condition: LoadingCondition,
    pub solver: SolverInput,
}

/// Reads and parses a case file
///
/// # Arguments
/// * `input_file` - The path to the input file
///
/// # Returns
/// The parsed case
pub fn load_case(input_file: &str) -> Result<Case, ShellError> {
    let file_string = match std::fs::read_to_string(input_file) {
        Ok(f) => f,
        Err(_err) => {
            return Err(ShellError::Input(format!(
                "Unable to open input file {}",
                input_file
            )))
        }
    };

    parse_case(&file_string)
}

/// Parses a case from its json text
pub fn parse_case(text: &str) -> Result<Case, ShellError> {
    let input_json = match json::parse(text) {
        Ok(f) => f,
        Err(err) => {
            return Err(ShellError::Input(format!(
                "Error in input file json: {err}"
            )))
        }
    };

    for section in ["properties", "boundary_conditions", "geometry"] {
        if !input_json.has_key(section) {
            return Err(ShellError::Input(format!(
                "Input json missing {section} field"
            )));
        }
    }

    let model = match input_json["model"].as_str() {
        None | Some("shell") => ModelKind::Shell,
        Some("beam") => ModelKind::Beam,
        Some(other) => {
            return Err(ShellError::Input(format!(
                "Unknown model '{other}', expected shell or beam"
            )))
        }
    };

    Ok(Case {
        model,
        properties: parse_properties(&input_json["properties"])?,
        boundary_conditions: parse_boundary_conditions(&input_json["boundary_conditions"])?,
        mesh: parse_mesh(&input_json["mesh"])?,
        geometry: parse_geometry(&input_json["geometry"])?,
        loading_condition: parse_loading_condition(&input_json["loading_condition"])?,
        solver: parse_solver(&input_json["solver"], model)?,
    })
}

fn parse_properties(properties_json: &JsonValue) -> Result<Properties, ShellError> {
    let young = required_f64(properties_json, "young", "properties")?;
    let poisson = required_f64(properties_json, "poisson", "properties")?;
    let dimensions = f64_list(&properties_json["dimensions"], "dimensions")?;

    let dimensions: [f64; 2] = match dimensions.as_slice() {
        [width, height] => [*width, *height],
        _ => {
            return Err(ShellError::Input(format!(
                "Input json dimensions need [width, height], got {} values",
                dimensions.len()
            )))
        }
    };

    Properties::new(young, poisson, dimensions)
}

fn parse_boundary_conditions(bc_json: &JsonValue) -> Result<BoundaryConditions, ShellError> {
    if !bc_json.has_key("loads") {
        return Err(ShellError::Input(
            "Input json missing loads field in boundary_conditions section".to_string(),
        ));
    }
    if !bc_json.has_key("load_x") {
        return Err(ShellError::Input(
            "Input json missing load_x field in boundary_conditions section".to_string(),
        ));
    }

    let mut loads = Vec::new();
    for (i, load_json) in bc_json["loads"].members().enumerate() {
        match f64_list(load_json, "loads")?.as_slice() {
            [x, z] => loads.push([*x, *z]),
            _ => {
                return Err(ShellError::Input(format!(
                    "Load {i} must be an [x, z] pair"
                )))
            }
        }
    }
    let load_x = f64_list(&bc_json["load_x"], "load_x")?;

    BoundaryConditions::new(loads, load_x)
}

fn parse_mesh(mesh_json: &JsonValue) -> Result<Mesh1D, ShellError> {
    if mesh_json.is_null() {
        return Mesh1D::uniform(DEFAULT_MESH_N);
    }

    let n = match mesh_json["n"].as_usize() {
        Some(n) => n,
        None if mesh_json.has_key("n") => {
            return Err(ShellError::Input("Bad value for n in mesh".to_owned()))
        }
        None => DEFAULT_MESH_N,
    };
    let alpha = match mesh_json.has_key("alpha") {
        true => f64_list(&mesh_json["alpha"], "alpha")?,
        false => vec![1.0],
    };
    let alpha_nodes = match mesh_json.has_key("alpha_nodes") {
        true => f64_list(&mesh_json["alpha_nodes"], "alpha_nodes")?,
        false => vec![0.0, 1.0],
    };

    Mesh1D::new(alpha, alpha_nodes, n)
}

fn parse_segment(segment_json: &JsonValue, name: &str) -> Result<Cst, ShellError> {
    if !segment_json.has_key("shape") {
        return Err(ShellError::Input(format!(
            "Input json missing shape field in {name}"
        )));
    }
    let mut coefficients = f64_list(&segment_json["shape"], "shape")?;
    coefficients.push(optional_f64(segment_json, "deltaz", name, 0.0)?);

    Cst::new(
        &coefficients,
        optional_f64(segment_json, "chord", name, 1.0)?,
        optional_f64(segment_json, "n1", name, 2.0)?,
        optional_f64(segment_json, "n2", name, 0.0)?,
    )
}

fn parse_geometry(geometry_json: &JsonValue) -> Result<PiecewiseCurve, ShellError> {
    let segments = if geometry_json.has_key("segments") {
        geometry_json["segments"]
            .members()
            .enumerate()
            .map(|(i, s)| parse_segment(s, &format!("geometry segment {i}")))
            .collect::<Result<Vec<Cst>, ShellError>>()?
    } else {
        vec![parse_segment(geometry_json, "geometry")?]
    };

    let continuity = match geometry_json["continuity"].as_str() {
        None | Some("C0") => Continuity::C0,
        Some("C1") => Continuity::C1,
        Some("C2") => Continuity::C2,
        Some(other) => {
            return Err(ShellError::Input(format!(
                "Unknown continuity '{other}', expected C0, C1 or C2"
            )))
        }
    };

    PiecewiseCurve::new(segments, continuity)
}

fn parse_loading_condition(condition_json: &JsonValue) -> Result<LoadingCondition, ShellError> {
    match condition_json.as_str() {
        None | Some("uniaxial") => Ok(LoadingCondition::Uniaxial),
        Some("plane_stress") => Ok(LoadingCondition::PlaneStress),
        Some("3D") => Ok(LoadingCondition::ThreeDimensional),
        Some(other) => Err(ShellError::Input(format!(
            "Unknown loading condition '{other}'"
        ))),
    }
}

fn parse_solver(solver_json: &JsonValue, model: ModelKind) -> Result<SolverInput, ShellError> {
    let mut config = SolverConfig::default();
    let default_bound = match model {
        ModelKind::Shell => DEFAULT_BOUND,
        ModelKind::Beam => crate::beam::STRAIN_BOUND,
    };
    if solver_json.is_null() {
        return Ok(SolverInput {
            x0: None,
            bounds: Some(BoundsInput::Symmetric(default_bound)),
            free: None,
            steps: 1,
            config,
        });
    }

    if solver_json.has_key("max_iters") {
        config.max_iters = match solver_json["max_iters"].as_u64() {
            Some(n) => n,
            None => return Err(ShellError::Input("Bad value for max_iters in solver".to_owned())),
        };
    }
    config.tolerance = optional_f64(solver_json, "tolerance", "solver", config.tolerance)?;
    config.verbose = solver_json["verbose"].as_bool().unwrap_or(false);
    config.minimizer = match solver_json["minimizer"].as_str() {
        None | Some("nelder-mead") => Minimizer::NelderMead,
        Some("lbfgs") => Minimizer::Lbfgs,
        Some(other) => {
            return Err(ShellError::Input(format!(
                "Unknown minimizer '{other}', expected nelder-mead or lbfgs"
            )))
        }
    };

    let bounds = if solver_json["bounds"].is_number() {
        Some(BoundsInput::Symmetric(required_f64(solver_json, "bounds", "solver")?))
    } else if solver_json["bounds"].is_object() {
        Some(BoundsInput::Explicit {
            lower: f64_list(&solver_json["bounds"]["lower"], "lower")?,
            upper: f64_list(&solver_json["bounds"]["upper"], "upper")?,
        })
    } else {
        Some(BoundsInput::Symmetric(default_bound))
    };

    let x0 = match solver_json.has_key("x0") {
        true => Some(f64_list(&solver_json["x0"], "x0")?),
        false => None,
    };

    let free = match solver_json.has_key("free") {
        true => {
            let mut indices = Vec::new();
            for value in solver_json["free"].members() {
                match value.as_usize() {
                    Some(i) => indices.push(i),
                    None => return Err(ShellError::Input("Bad value in free indices".to_owned())),
                }
            }
            Some(indices)
        }
        false => None,
    };

    let steps = match solver_json["steps"].as_usize() {
        Some(0) => {
            return Err(ShellError::Input(
                "Number of load steps must be at least 1".to_owned(),
            ))
        }
        Some(n) => n,
        None => 1,
    };

    Ok(SolverInput {
        x0,
        bounds,
        free,
        steps,
        config,
    })
}

fn required_f64(section_json: &JsonValue, key: &str, section: &str) -> Result<f64, ShellError> {
    match section_json[key].as_f64() {
        Some(v) => Ok(v),
        None => Err(ShellError::Input(format!(
            "Input json missing {key} field in {section} section"
        ))),
    }
}

fn optional_f64(
    section_json: &JsonValue,
    key: &str,
    section: &str,
    default: f64,
) -> Result<f64, ShellError> {
    if !section_json.has_key(key) {
        return Ok(default);
    }
    match section_json[key].as_f64() {
        Some(v) => Ok(v),
        None => Err(ShellError::Input(format!(
            "Bad value for {key} in {section}"
        ))),
    }
}

fn f64_list(list_json: &JsonValue, name: &str) -> Result<Vec<f64>, ShellError> {
    if !list_json.is_array() {
        return Err(ShellError::Input(format!(
            "Input json field {name} must be a list of numbers"
        )));
    }
    list_json
        .members()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| ShellError::Input(format!("Bad value in {name}: {v}")))
        })
        .collect()
}
