use thiserror::Error;

/// Failure of a solver back-end.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("no convergence within {iterations} iterations")]
    MaxIterations { iterations: usize },

    #[error("damping exceeded {lambda:e} after {iterations} iterations")]
    DampingSaturated { lambda: f64, iterations: usize },

    #[error("non-finite value in {0}")]
    NonFinite(&'static str),

    #[error("matrix has {rows} rows but right-hand side has {rhs_rows}")]
    DimensionMismatch { rows: usize, rhs_rows: usize },

    #[error("decomposition failed: {0}")]
    Decomposition(&'static str),
}
