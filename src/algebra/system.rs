use crate::algebra::{SquareMatrix, Vector};
use crate::error::{Error, ErrorContext, Result};

/// Binds one matrix to its right-hand (and optionally left-hand) vectors
/// and dispatches to the matching solve on [`SquareMatrix`].
///
/// Two operating modes:
/// - **direct**: `A·x = b` with every left-hand entry unknown;
/// - **separated**: `A·x = b` where the mask splits the entries into
///   unknown-left and known-left sets, solved by elimination restricted to
///   the unknown subset.
///
/// All dimensions are validated at construction so a solve can only fail
/// for numerical reasons.
#[derive(Debug)]
pub struct LinearSystem<'a> {
    matrix: &'a mut SquareMatrix,
    mode: Mode<'a>,
}

#[derive(Debug)]
enum Mode<'a> {
    Direct {
        rhs: &'a Vector,
    },
    Separated {
        left: &'a Vector,
        right: &'a Vector,
        unknown_left: &'a [bool],
    },
}

impl<'a> LinearSystem<'a> {
    /// Direct system `A·x = b`.
    pub fn direct(matrix: &'a mut SquareMatrix, rhs: &'a Vector) -> Result<Self> {
        check_dim(matrix.dim(), rhs.len(), "LinearSystem::direct (rhs)")?;
        Ok(LinearSystem {
            matrix,
            mode: Mode::Direct { rhs },
        })
    }

    /// Separated system with unknowns on both sides.
    ///
    /// A `true` mask entry marks an unknown left-hand entry; `left` holds
    /// the known left-hand values, `right` the known right-hand values.
    pub fn separated(
        matrix: &'a mut SquareMatrix,
        left: &'a Vector,
        right: &'a Vector,
        unknown_left: &'a [bool],
    ) -> Result<Self> {
        check_dim(matrix.dim(), left.len(), "LinearSystem::separated (left)")?;
        check_dim(matrix.dim(), right.len(), "LinearSystem::separated (right)")?;
        check_dim(
            matrix.dim(),
            unknown_left.len(),
            "LinearSystem::separated (mask)",
        )?;
        Ok(LinearSystem {
            matrix,
            mode: Mode::Separated {
                left,
                right,
                unknown_left,
            },
        })
    }

    /// Solves the bound system, returning one vector with every solved
    /// value at its original position.
    pub fn solve(self) -> Result<Vector> {
        match self.mode {
            Mode::Direct { rhs } => self.matrix.solve(rhs).in_op("LinearSystem::solve"),
            Mode::Separated {
                left,
                right,
                unknown_left,
            } => self
                .matrix
                .solve_partitioned(left, right, unknown_left)
                .in_op("LinearSystem::solve"),
        }
    }
}

fn check_dim(expected: usize, found: usize, op: &'static str) -> Result<()> {
    if expected != found {
        return Err(Error::DimensionMismatch {
            op,
            expected,
            found,
        });
    }
    Ok(())
}
