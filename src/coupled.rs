use crate::{
    datatypes::ShapePoint,
    energy::Evaluation,
    error::ShellError,
    geometry::Geometry,
    shell::ShellModel,
    solver::Structure,
};

/// Two shells joined by rigid spars.
///
/// The free variables of the upper shell come first, followed by those of
/// the lower shell. Each spar connects the points at the same chord fraction
/// of both parents and has to keep its parent length.
#[derive(Debug)]
pub struct CoupledSystem<'a, U: Geometry, L: Geometry> {
    upper: &'a ShellModel<U>,
    lower: &'a ShellModel<L>,
    spars: Vec<f64>,
    split: usize,
    spar_lengths: Vec<f64>,
}

impl<'a, U: Geometry, L: Geometry> CoupledSystem<'a, U, L> {
    /// Joins two shell models
    ///
    /// # Arguments
    /// * `upper` - First shell
    /// * `lower` - Second shell
    /// * `spars` - Chord fractions in `[0, 1]` where spars attach
    /// * `split` - Number of free variables that belong to `upper`
    pub fn new(
        upper: &'a ShellModel<U>,
        lower: &'a ShellModel<L>,
        spars: Vec<f64>,
        split: usize,
    ) -> Result<CoupledSystem<'a, U, L>, ShellError> {
        if let Some(s) = spars.iter().find(|s| !(0.0..=1.0).contains(*s)) {
            return Err(ShellError::Configuration(format!(
                "Spar location {s} is outside the [0, 1] domain"
            )));
        }

        let spar_lengths = std::iter::zip(upper.parent_points(&spars), lower.parent_points(&spars))
            .map(|(u, l)| (u - l).norm())
            .collect();

        Ok(CoupledSystem {
            upper,
            lower,
            spars,
            split,
            spar_lengths,
        })
    }

    pub fn spars(&self) -> &[f64] {
        &self.spars
    }

    /// Parent lengths of the spars
    pub fn spar_lengths(&self) -> &[f64] {
        &self.spar_lengths
    }

    fn split<'x>(&self, x: &'x [f64]) -> Result<(&'x [f64], &'x [f64]), ShellError> {
        if x.len() < self.split {
            return Err(ShellError::Configuration(format!(
                "Coupled system needs at least {} variables, got {}",
                self.split,
                x.len()
            )));
        }
        Ok(x.split_at(self.split))
    }

    /// Change in length of every spar
    pub fn spar_residuals(&self, x: &[f64]) -> Result<Vec<f64>, ShellError> {
        let (x_upper, x_lower) = self.split(x)?;
        let upper = self.upper.material_points(x_upper, &self.spars)?;
        let lower = self.lower.material_points(x_lower, &self.spars)?;

        Ok(std::iter::zip(std::iter::zip(&upper, &lower), &self.spar_lengths)
            .map(|((u, l), length)| (u.child - l.child).norm() - length)
            .collect())
    }
}

impl<'a, U: Geometry, L: Geometry> Structure for CoupledSystem<'a, U, L> {
    fn evaluate(&self, x: &[f64]) -> Result<Evaluation, ShellError> {
        let (x_upper, x_lower) = self.split(x)?;
        Ok(Evaluation::combine(
            &self.upper.evaluate(x_upper)?,
            &self.lower.evaluate(x_lower)?,
        ))
    }

    fn equality_constraints(&self, x: &[f64]) -> Result<Vec<f64>, ShellError> {
        let (x_upper, x_lower) = self.split(x)?;
        let mut constraints = self.spar_residuals(x)?;
        constraints.extend(self.upper.equality_constraints(x_upper)?);
        constraints.extend(self.lower.equality_constraints(x_lower)?);
        Ok(constraints)
    }

    fn deformed_shape(&self, x: &[f64]) -> Result<Vec<ShapePoint>, ShellError> {
        let (x_upper, x_lower) = self.split(x)?;
        let mut shape = self.upper.deformed_shape(x_upper)?;
        shape.extend(self.lower.deformed_shape(x_lower)?);
        Ok(shape)
    }
}
