use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy of the numeric layer.
///
/// All of these indicate an ill-posed problem or misuse, not a transient
/// fault: the remediation is changing the model (mesh, time step, boundary
/// conditions), never retrying the same call.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{op}: incompatible dimensions (expected {expected}, found {found})")]
    DimensionMismatch {
        op: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("matrix is singular ({detail})")]
    Singular { detail: &'static str },

    #[error("matrix is nearly singular (pivot magnitude below {epsilon:e})")]
    NearlySingular { epsilon: f64 },

    #[error("eigenvalue iteration exceeded {iterations} sweeps without converging")]
    EigenNonConvergence { iterations: usize },

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("{what} requested before the start solution was computed")]
    NotInitialized { what: &'static str },

    #[error("i/o failure")]
    Io(#[from] std::io::Error),

    #[error("malformed input: {0}")]
    Parse(String),

    #[error("{op} failed")]
    Context {
        op: &'static str,
        #[source]
        source: Box<Error>,
    },
}

/// Flat classification of [`Error`], ignoring any context wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    DimensionMismatch,
    Singular,
    NearlySingular,
    EigenNonConvergence,
    NotImplemented,
    NotInitialized,
    Io,
    Parse,
}

impl Error {
    /// Classifies the error, drilling through [`Error::Context`] wrappers
    /// down to the originating failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Error::Singular { .. } => ErrorKind::Singular,
            Error::NearlySingular { .. } => ErrorKind::NearlySingular,
            Error::EigenNonConvergence { .. } => ErrorKind::EigenNonConvergence,
            Error::NotImplemented(_) => ErrorKind::NotImplemented,
            Error::NotInitialized { .. } => ErrorKind::NotInitialized,
            Error::Io(_) => ErrorKind::Io,
            Error::Parse(_) => ErrorKind::Parse,
            Error::Context { source, .. } => source.kind(),
        }
    }

    /// Wraps the error with the name of the operation it surfaced from,
    /// building the call-chain reported by `Display`/`source`.
    pub fn in_op(self, op: &'static str) -> Self {
        Error::Context {
            op,
            source: Box::new(self),
        }
    }
}

/// Attaches an operation name to the error of a `Result`.
pub trait ErrorContext<T> {
    fn in_op(self, op: &'static str) -> Result<T>;
}

impl<T> ErrorContext<T> for Result<T> {
    fn in_op(self, op: &'static str) -> Result<T> {
        self.map_err(|e| e.in_op(op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_drills_through_context() {
        let e = Error::Singular { detail: "pivot" }
            .in_op("solve")
            .in_op("next_time_step");
        assert_eq!(e.kind(), ErrorKind::Singular);
    }

    #[test]
    fn context_chain_shows_in_sources() {
        let e = Error::DimensionMismatch {
            op: "mul_vec",
            expected: 3,
            found: 2,
        }
        .in_op("start_solution");
        let msg = format!("{e}");
        assert!(msg.contains("start_solution"));
        let source = std::error::Error::source(&e).expect("chained source");
        assert!(format!("{source}").contains("mul_vec"));
    }
}
