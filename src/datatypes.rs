use nalgebra::Vector2;

use crate::error::ShellError;

/// Cross-section of the structure. The shell model reads the width and the
/// thickness, the beam model reads area and inertia.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CrossSection {
    Rectangular { width: f64, height: f64 },
}

impl CrossSection {
    pub fn area(&self) -> f64 {
        match *self {
            CrossSection::Rectangular { width, height } => width * height,
        }
    }

    pub fn inertia(&self) -> f64 {
        match *self {
            CrossSection::Rectangular { width, height } => width * height.powi(3) / 12.0,
        }
    }

    pub fn width(&self) -> f64 {
        match *self {
            CrossSection::Rectangular { width, .. } => width,
        }
    }

    pub fn thickness(&self) -> f64 {
        match *self {
            CrossSection::Rectangular { height, .. } => height,
        }
    }
}

/// Material and cross-section constants. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Properties {
    pub young: f64,
    pub poisson: f64,
    pub cross_section: CrossSection,
}

impl Properties {
    /// Builds properties for a rectangular section
    ///
    /// # Arguments
    /// * `young` - Young's modulus
    /// * `poisson` - Poisson ratio
    /// * `dimensions` - `[width, height]` of the section
    ///
    /// # Returns
    /// The properties, or a configuration error if the values make no sense
    pub fn new(young: f64, poisson: f64, dimensions: [f64; 2]) -> Result<Properties, ShellError> {
        Properties::with_cross_section(
            young,
            poisson,
            CrossSection::Rectangular {
                width: dimensions[0],
                height: dimensions[1],
            },
        )
    }

    pub fn with_cross_section(
        young: f64,
        poisson: f64,
        cross_section: CrossSection,
    ) -> Result<Properties, ShellError> {
        if !young.is_finite() || young <= 0.0 {
            return Err(ShellError::Configuration(format!(
                "Young's modulus must be positive, got {young}"
            )));
        }
        if !(0.0..=1.0).contains(&poisson) {
            return Err(ShellError::Configuration(format!(
                "Poisson ratio must lie in [0, 1], got {poisson}"
            )));
        }
        let CrossSection::Rectangular { width, height } = cross_section;
        if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
            return Err(ShellError::Configuration(format!(
                "Cross-section dimensions must be positive, got [{width}, {height}]"
            )));
        }
        if cross_section.area() <= 0.0 || cross_section.inertia() <= 0.0 {
            return Err(ShellError::Configuration(
                "Cross-section area and inertia must be positive".to_owned(),
            ));
        }

        Ok(Properties {
            young,
            poisson,
            cross_section,
        })
    }

    pub fn area(&self) -> f64 {
        self.cross_section.area()
    }

    pub fn inertia(&self) -> f64 {
        self.cross_section.inertia()
    }

    pub fn width(&self) -> f64 {
        self.cross_section.width()
    }

    pub fn thickness(&self) -> f64 {
        self.cross_section.thickness()
    }
}

impl Default for Properties {
    fn default() -> Self {
        Properties {
            young: 70e9,
            poisson: 0.3,
            cross_section: CrossSection::Rectangular {
                width: 0.01,
                height: 0.01,
            },
        }
    }
}

/// A point load applied at a normalized chord location of the parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcentratedLoad {
    pub x: f64,
    pub load: Vector2<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundaryConditions {
    pub concentrated: Vec<ConcentratedLoad>,
}

impl BoundaryConditions {
    /// Pairs load vectors with their locations
    ///
    /// # Arguments
    /// * `load` - `(x, z)` load components, one per location
    /// * `load_x` - Normalized chord locations in `[0, 1]`
    pub fn new(load: Vec<[f64; 2]>, load_x: Vec<f64>) -> Result<BoundaryConditions, ShellError> {
        if load.len() != load_x.len() {
            return Err(ShellError::Configuration(format!(
                "{} loads given for {} load locations",
                load.len(),
                load_x.len()
            )));
        }

        let mut concentrated = Vec::with_capacity(load.len());
        for (value, x) in std::iter::zip(load, load_x) {
            if !x.is_finite() || !(0.0..=1.0).contains(&x) {
                return Err(ShellError::Configuration(format!(
                    "Load location {x} is outside the [0, 1] domain"
                )));
            }
            concentrated.push(ConcentratedLoad {
                x,
                load: Vector2::new(value[0], value[1]),
            });
        }

        Ok(BoundaryConditions { concentrated })
    }

    pub fn unloaded() -> BoundaryConditions {
        BoundaryConditions {
            concentrated: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.concentrated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concentrated.is_empty()
    }

    pub fn loads(&self) -> Vec<Vector2<f64>> {
        self.concentrated.iter().map(|c| c.load).collect()
    }

    /// Same locations with every load multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> BoundaryConditions {
        BoundaryConditions {
            concentrated: self
                .concentrated
                .iter()
                .map(|c| ConcentratedLoad {
                    x: c.x,
                    load: c.load * factor,
                })
                .collect(),
        }
    }
}

impl Default for BoundaryConditions {
    fn default() -> Self {
        BoundaryConditions {
            concentrated: vec![ConcentratedLoad {
                x: 1.0,
                load: Vector2::new(10000.0, 0.0),
            }],
        }
    }
}

/// Matching parent and child positions of one material point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapePoint {
    pub parent: Vector2<f64>,
    pub child: Vector2<f64>,
}

impl ShapePoint {
    pub fn displacement(&self) -> Vector2<f64> {
        self.child - self.parent
    }
}

/// Constitutive law used by the beam reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingCondition {
    #[default]
    Uniaxial,
    PlaneStress,
    ThreeDimensional,
}
