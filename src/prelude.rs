pub use itertools::{izip, Itertools};

pub use crate::algebra::{EigenSystem, LinearSystem, SquareMatrix, Vector};
pub use crate::element::beam::BeamChain;
pub use crate::error::{Error, ErrorContext, ErrorKind, Result};
pub use crate::solver::jerk::JerkSolver;
pub use crate::solver::newmark::NewmarkSolver;
