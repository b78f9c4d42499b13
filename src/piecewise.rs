use crate::{
    cst::Cst,
    error::ShellError,
    geometry::{Diff, Geometry},
};

/// Smoothness required where two segments meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Continuity {
    #[default]
    C0,
    C1,
    C2,
}

/// CST segments laid end to end along `x1`.
///
/// Each segment is evaluated in its own local coordinate and lifted by the
/// height the previous segments end at, so the curve is C0 by construction.
/// Higher continuity is reported through `continuity_residuals` and left to
/// the solver to enforce.
#[derive(Debug, Clone, PartialEq)]
pub struct PiecewiseCurve {
    segments: Vec<Cst>,
    continuity: Continuity,
    offsets_x: Vec<f64>,
    offsets_z: Vec<f64>,
}

impl PiecewiseCurve {
    pub fn new(segments: Vec<Cst>, continuity: Continuity) -> Result<PiecewiseCurve, ShellError> {
        if segments.is_empty() {
            return Err(ShellError::Configuration(
                "Piecewise curve needs at least one segment".to_owned(),
            ));
        }
        Ok(PiecewiseCurve::assemble(segments, continuity))
    }

    fn assemble(segments: Vec<Cst>, continuity: Continuity) -> PiecewiseCurve {
        let mut offsets_x = Vec::with_capacity(segments.len());
        let mut offsets_z = Vec::with_capacity(segments.len());
        let (mut x, mut z) = (0.0, 0.0);
        for segment in &segments {
            offsets_x.push(x);
            offsets_z.push(z);
            x += segment.chord;
            z += segment.x3(segment.chord, Diff::None);
        }

        PiecewiseCurve {
            segments,
            continuity,
            offsets_x,
            offsets_z,
        }
    }

    pub fn segments(&self) -> &[Cst] {
        &self.segments
    }

    pub fn continuity(&self) -> Continuity {
        self.continuity
    }

    /// Start of each segment along `x1`, followed by the end of the curve
    pub fn segment_boundaries(&self) -> Vec<f64> {
        let mut boundaries = self.offsets_x.clone();
        boundaries.push(self.chord());
        boundaries
    }

    fn locate(&self, x1: f64) -> usize {
        self.offsets_x
            .iter()
            .rposition(|&start| x1 >= start)
            .unwrap_or(0)
    }
}

impl Geometry for PiecewiseCurve {
    fn chord(&self) -> f64 {
        self.segments.iter().map(|s| s.chord).sum()
    }

    fn coefficients(&self) -> Vec<f64> {
        self.segments.iter().flat_map(|s| s.coefficients()).collect()
    }

    fn with_coefficients(&self, coefficients: &[f64]) -> Result<Self, ShellError> {
        let expected: usize = self.segments.iter().map(|s| s.shape.len() + 1).sum();
        if coefficients.len() != expected {
            return Err(ShellError::Configuration(format!(
                "Piecewise curve expects {expected} coefficients, got {}",
                coefficients.len()
            )));
        }

        let mut cursor = 0;
        let mut segments = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            let n = segment.shape.len() + 1;
            segments.push(segment.with_coefficients(&coefficients[cursor..cursor + n])?);
            cursor += n;
        }
        PiecewiseCurve::new(segments, self.continuity)
    }

    fn with_chord(&self, chord: f64) -> Self {
        let scale = chord / self.chord();
        let segments = self
            .segments
            .iter()
            .map(|s| s.with_chord(s.chord * scale))
            .collect();
        PiecewiseCurve::assemble(segments, self.continuity)
    }

    fn x3(&self, x1: f64, diff: Diff) -> f64 {
        let i = self.locate(x1);
        let local = self.segments[i].x3(x1 - self.offsets_x[i], diff);
        match diff {
            Diff::None => local + self.offsets_z[i],
            Diff::X1 | Diff::X11 => local,
        }
    }

    fn continuity_residuals(&self) -> Vec<f64> {
        let mut residuals = Vec::new();
        for pair in self.segments.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            if self.continuity >= Continuity::C1 {
                residuals.push(left.x3(left.chord, Diff::X1) - right.x3(0.0, Diff::X1));
            }
            if self.continuity >= Continuity::C2 {
                residuals.push(left.x3(left.chord, Diff::X11) - right.x3(0.0, Diff::X11));
            }
        }
        residuals
    }
}
