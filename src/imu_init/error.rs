//! Errors and advisories of visual-inertial initialization.

use thiserror::Error;

/// Why an initialization attempt was abandoned. Shared state is untouched in
/// every case.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitError {
    #[error("{found} keyframes in window, at least {required} required")]
    InsufficientFrames { found: usize, required: usize },

    #[error("keyframe {index} is not later than its predecessor")]
    NonMonotonicTimestamps { index: usize },

    #[error("window has no first keyframe")]
    EmptyWindow,

    #[error("gyroscope bias solve failed after {iterations} iterations: {reason}")]
    SolverDivergence { iterations: usize, reason: String },

    #[error("degenerate window: {reason}")]
    Degenerate { reason: String },
}

/// Linear system a conditioning advisory refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearStage {
    ScaleGravity,
    Refinement,
}

impl std::fmt::Display for LinearStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinearStage::ScaleGravity => write!(f, "scale/gravity"),
            LinearStage::Refinement => write!(f, "refinement"),
        }
    }
}

/// Non-fatal findings of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub enum InitWarning {
    /// The window is shorter than the recommended length.
    FewKeyframes { found: usize, recommended: usize },
    /// A linear system was rank deficient or poorly conditioned.
    IllConditioned {
        stage: LinearStage,
        rank: usize,
        cols: usize,
        condition_number: f64,
    },
}

impl std::fmt::Display for InitWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitWarning::FewKeyframes { found, recommended } => write!(
                f,
                "{} keyframes, {} recommended; estimate may be unreliable",
                found, recommended
            ),
            InitWarning::IllConditioned {
                stage,
                rank,
                cols,
                condition_number,
            } => write!(
                f,
                "{} system rank {}/{}, condition number {:.3e}",
                stage, rank, cols, condition_number
            ),
        }
    }
}
