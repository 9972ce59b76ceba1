//! Dense linear-algebra kernel: vectors, square matrices with cached
//! factorizations, and the equation-system binder the integrators use.

pub mod matrix;
pub mod system;
pub mod vector;

pub use matrix::{EigenSystem, SquareMatrix};
pub use system::LinearSystem;
pub use vector::Vector;

/// Absolute tolerance used by the matrix classification predicates.
pub const CLASSIFY_EPSILON: f64 = 1e-10;

/// Default pivot-magnitude threshold below which a matrix counts as
/// nearly singular.
pub const DEFAULT_SINGULAR_EPSILON: f64 = 1e-10;
