//! Small dense solvers used by the initialization passes.
//!
//! Estimation code describes its problems through two traits:
//! - [`LeastSquaresProblem`] for robustified nonlinear problems, solved by
//!   [`LevenbergMarquardt`]
//! - [`LinearLeastSquares`] for stacked linear systems, solved by
//!   [`SvdSolver`]
//!
//! A different back-end only has to implement the same trait.

pub mod error;
pub mod least_squares;
pub mod linear;

pub use error::SolverError;
pub use least_squares::{
    huber_loss, huber_weight, LeastSquaresProblem, LevenbergMarquardt, LevenbergMarquardtConfig,
    Linearization, SolverReport, Termination,
};
pub use linear::{Conditioning, LinearLeastSquares, LinearSolution, SvdSolver};
