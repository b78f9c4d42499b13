//! Equilibrium of thin shells and beams whose mid-line is a Class/Shape
//! Transformation curve. The deformed shape is found by minimizing strain
//! energy minus external work over the curve coefficients.

pub mod beam;
pub mod coupled;
pub mod cst;
pub mod datatypes;
pub mod energy;
pub mod error;
pub mod geometry;
pub mod input;
pub mod mesher;
pub mod piecewise;
pub mod post_processor;
pub mod shell;
pub mod solver;
pub mod strain;
