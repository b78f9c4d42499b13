use crate::error::ShellError;

pub const DEFAULT_MESH_N: usize = 10;

/// Uniform parent-domain samples on `[0, 1]` and their child-domain images.
///
/// Every interval `[alpha_nodes[i], alpha_nodes[i+1])` stretches its samples
/// by `alpha[i]`; the final node always takes the last factor.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh1D {
    pub n: usize,
    pub x_p: Vec<f64>,
    pub dx_p: f64,
    pub alpha: Vec<f64>,
    pub alpha_nodes: Vec<f64>,
    pub x_c: Vec<f64>,
    /// Scale factor each sample was mapped with
    pub alpha_x: Vec<f64>,
}

impl Mesh1D {
    /// Builds the parent mesh and maps it to the child domain
    ///
    /// # Arguments
    /// * `alpha` - One scale factor per interval
    /// * `alpha_nodes` - Interval boundaries, ascending from 0 to 1
    /// * `mesh_n` - Number of parent samples
    ///
    /// # Returns
    /// The mesh, or a configuration error if the intervals don't cover `[0, 1]`
    pub fn new(alpha: Vec<f64>, alpha_nodes: Vec<f64>, mesh_n: usize) -> Result<Mesh1D, ShellError> {
        if mesh_n < 2 {
            return Err(ShellError::Configuration(format!(
                "Mesh needs at least 2 samples, got {mesh_n}"
            )));
        }
        validate(&alpha, &alpha_nodes)?;

        let dx_p = 1.0 / (mesh_n - 1) as f64;
        let x_p: Vec<f64> = (0..mesh_n)
            .map(|i| i as f64 / (mesh_n - 1) as f64)
            .collect();

        let mut mesh = Mesh1D {
            n: mesh_n,
            x_p,
            dx_p,
            alpha,
            alpha_nodes,
            x_c: Vec::new(),
            alpha_x: Vec::new(),
        };
        mesh.mesh_child();

        Ok(mesh)
    }

    /// Single unstretched interval
    pub fn uniform(mesh_n: usize) -> Result<Mesh1D, ShellError> {
        Mesh1D::new(vec![1.0], vec![0.0, 1.0], mesh_n)
    }

    /// Same parent samples and intervals with new scale factors
    pub fn with_alpha(&self, alpha: Vec<f64>) -> Result<Mesh1D, ShellError> {
        validate(&alpha, &self.alpha_nodes)?;
        let mut mesh = Mesh1D {
            alpha,
            ..self.clone()
        };
        mesh.mesh_child();
        Ok(mesh)
    }

    /// Maps a single parent coordinate
    ///
    /// # Returns
    /// The child coordinate and the factor it was scaled by
    pub fn map_point(&self, x: f64) -> (f64, f64) {
        let factor = self.factor_at(x);
        (factor * x, factor)
    }

    fn factor_at(&self, x: f64) -> f64 {
        let last = self.alpha[self.alpha.len() - 1];
        if x >= 1.0 {
            return last;
        }
        self.alpha_nodes
            .windows(2)
            .position(|w| x >= w[0] && x < w[1])
            .map(|i| self.alpha[i])
            .unwrap_or(last)
    }

    /// Recomputes `x_c` and `alpha_x` from the current factors
    fn mesh_child(&mut self) {
        let mut x_c = Vec::with_capacity(self.n);
        let mut alpha_x = Vec::with_capacity(self.n);

        for (i, w) in self.alpha_nodes.windows(2).enumerate() {
            for &x in self.x_p[..self.n - 1].iter().filter(|&&x| x >= w[0] && x < w[1]) {
                x_c.push(self.alpha[i] * x);
                alpha_x.push(self.alpha[i]);
            }
        }

        // last node
        let last = self.alpha[self.alpha.len() - 1];
        x_c.push(last * self.x_p[self.n - 1]);
        alpha_x.push(last);

        self.x_c = x_c;
        self.alpha_x = alpha_x;
    }
}

fn validate(alpha: &[f64], alpha_nodes: &[f64]) -> Result<(), ShellError> {
    if alpha_nodes.first() != Some(&0.0) || alpha_nodes.last() != Some(&1.0) {
        return Err(ShellError::Configuration(
            "Need to define alpha nodes for the whole domain: they must start at 0 and end at 1"
                .to_owned(),
        ));
    }
    if alpha.len() + 1 != alpha_nodes.len() {
        return Err(ShellError::Configuration(format!(
            "{} alpha nodes define {} intervals but {} alpha values were given",
            alpha_nodes.len(),
            alpha_nodes.len() - 1,
            alpha.len()
        )));
    }
    if alpha_nodes.iter().any(|x| !x.is_finite()) {
        return Err(ShellError::Configuration(
            "Alpha nodes must be finite".to_owned(),
        ));
    }
    if alpha_nodes.windows(2).any(|w| w[1] < w[0]) {
        return Err(ShellError::Configuration(
            "Alpha nodes must be in increasing order".to_owned(),
        ));
    }
    if alpha.iter().any(|a| !a.is_finite()) {
        return Err(ShellError::Configuration(
            "Alpha values must be finite".to_owned(),
        ));
    }
    Ok(())
}
