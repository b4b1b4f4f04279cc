//! Levenberg-Marquardt for small dense robustified least-squares problems.
//!
//! The problem supplies residual blocks already scaled by the square root of
//! their robust weight (iteratively reweighted least squares), so the solver
//! only ever sees a plain `J`, `r` pair. Each iteration solves
//!
//! ```text
//! (JᵀJ + λ·diag(JᵀJ)) δ = -Jᵀr
//! ```
//!
//! and the update is the flat sum `x + δ`.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::SolverError;

/// Weighted residuals and Jacobian at one parameter value.
#[derive(Debug, Clone)]
pub struct Linearization {
    pub residuals: DVector<f64>,
    pub jacobian: DMatrix<f64>,
}

/// A nonlinear least-squares problem over a flat parameter vector.
pub trait LeastSquaresProblem {
    fn num_params(&self) -> usize;

    /// Total robust cost at `x`.
    fn cost(&self, x: &DVector<f64>) -> f64;

    /// Residuals and Jacobian at `x`, each block scaled by `sqrt(w)` for its
    /// current robust weight `w`.
    fn linearize(&self, x: &DVector<f64>) -> Linearization;
}

/// Huber loss of a squared residual norm `s = |r|²`, halved so that the
/// quadratic branch equals `½s`.
pub fn huber_loss(squared_norm: f64, delta: f64) -> f64 {
    let delta_sq = delta * delta;
    if squared_norm <= delta_sq {
        0.5 * squared_norm
    } else {
        delta * squared_norm.sqrt() - 0.5 * delta_sq
    }
}

/// IRLS weight of a residual with norm `norm` under the Huber loss.
pub fn huber_weight(norm: f64, delta: f64) -> f64 {
    if norm <= delta {
        1.0
    } else {
        delta / norm
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LevenbergMarquardtConfig {
    /// Initial LM damping factor.
    pub initial_lambda: f64,
    /// Damping increase factor when a step is rejected.
    pub lambda_increase: f64,
    /// Damping decrease factor when a step is accepted.
    pub lambda_decrease: f64,
    /// Minimum lambda.
    pub min_lambda: f64,
    /// Maximum lambda; exceeding it is a failure.
    pub max_lambda: f64,
    /// Converged when the largest gradient component falls below this.
    pub gradient_tolerance: f64,
    /// Converged when the step is this small relative to the parameters,
    /// or in absolute terms when the parameters are near zero.
    pub step_tolerance: f64,
    /// Converged when an accepted step lowers the cost by less than this fraction.
    pub cost_tolerance: f64,
}

impl Default for LevenbergMarquardtConfig {
    fn default() -> Self {
        Self {
            initial_lambda: 1e-4,
            lambda_increase: 10.0,
            lambda_decrease: 0.1,
            min_lambda: 1e-12,
            max_lambda: 1e8,
            gradient_tolerance: 1e-10,
            step_tolerance: 1e-10,
            cost_tolerance: 1e-12,
        }
    }
}

/// Which criterion ended a successful solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Gradient,
    Step,
    Cost,
}

#[derive(Debug, Clone)]
pub struct SolverReport {
    pub x: DVector<f64>,
    pub iterations: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub termination: Termination,
}

#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    pub config: LevenbergMarquardtConfig,
}

impl LevenbergMarquardt {
    pub fn new(config: LevenbergMarquardtConfig) -> Self {
        Self { config }
    }

    /// Minimize `problem` starting from `x0` with at most `max_iterations`
    /// linearizations. Running out of budget before a convergence criterion
    /// holds is an error.
    pub fn minimize<P: LeastSquaresProblem>(
        &self,
        problem: &P,
        x0: DVector<f64>,
        max_iterations: usize,
    ) -> Result<SolverReport, SolverError> {
        let config = &self.config;
        let num_params = problem.num_params();
        debug_assert_eq!(x0.len(), num_params);

        let mut x = x0;
        let initial_cost = problem.cost(&x);
        if !initial_cost.is_finite() {
            return Err(SolverError::NonFinite("initial cost"));
        }

        let mut lambda = config.initial_lambda;
        let mut current_cost = initial_cost;
        let mut lin = problem.linearize(&x);

        for iter in 0..max_iterations {
            let jtj = lin.jacobian.transpose() * &lin.jacobian;
            let jtr = lin.jacobian.transpose() * &lin.residuals;
            if jtr.iter().any(|v| !v.is_finite()) {
                return Err(SolverError::NonFinite("gradient"));
            }

            if jtr.amax() < config.gradient_tolerance {
                return Ok(self.report(x, iter, initial_cost, current_cost, Termination::Gradient));
            }

            let mut h_lm = jtj.clone();
            for j in 0..num_params {
                h_lm[(j, j)] += lambda * (jtj[(j, j)].max(1e-10));
            }

            let dx = match h_lm.lu().solve(&(-&jtr)) {
                Some(d) => d,
                None => {
                    lambda *= config.lambda_increase;
                    if lambda > config.max_lambda {
                        return Err(SolverError::DampingSaturated {
                            lambda,
                            iterations: iter + 1,
                        });
                    }
                    continue;
                }
            };

            let x_new = &x + &dx;
            let new_cost = problem.cost(&x_new);
            let small_step = dx.norm() <= config.step_tolerance * (x.norm() + 1.0);

            if new_cost.is_finite() && new_cost < current_cost {
                let relative_decrease = (current_cost - new_cost) / current_cost.max(f64::MIN_POSITIVE);
                x = x_new;
                current_cost = new_cost;
                lambda = (lambda * config.lambda_decrease).max(config.min_lambda);

                if small_step {
                    return Ok(self.report(x, iter + 1, initial_cost, current_cost, Termination::Step));
                }
                if relative_decrease < config.cost_tolerance {
                    return Ok(self.report(x, iter + 1, initial_cost, current_cost, Termination::Cost));
                }
                lin = problem.linearize(&x);
            } else {
                // At the noise floor the step is tiny and rounding decides the comparison
                if small_step {
                    return Ok(self.report(x, iter + 1, initial_cost, current_cost, Termination::Step));
                }
                lambda *= config.lambda_increase;
                if lambda > config.max_lambda {
                    return Err(SolverError::DampingSaturated {
                        lambda,
                        iterations: iter + 1,
                    });
                }
            }
        }

        Err(SolverError::MaxIterations {
            iterations: max_iterations,
        })
    }

    fn report(
        &self,
        x: DVector<f64>,
        iterations: usize,
        initial_cost: f64,
        final_cost: f64,
        termination: Termination,
    ) -> SolverReport {
        debug!(
            "LM: {} iters, cost {:.6e} -> {:.6e}, {:?}",
            iterations, initial_cost, final_cost, termination
        );
        SolverReport {
            x,
            iterations,
            initial_cost,
            final_cost,
            termination,
        }
    }
}
