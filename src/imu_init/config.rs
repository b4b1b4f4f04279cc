//! Tunables of the visual-inertial initializer.

use serde::{Deserialize, Serialize};

use crate::optimizer::LevenbergMarquardtConfig;

/// Iteration budget used when the caller has no preference.
pub const DEFAULT_MAX_ITERATIONS: usize = 30;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InitializerConfig {
    /// Windows shorter than this are rejected.
    pub min_keyframes: usize,
    /// Windows shorter than this are attempted with a warning.
    pub recommended_keyframes: usize,
    /// Huber threshold on the rotation residual norm (rad).
    pub huber_threshold: f64,
    /// Damping schedule and stopping criteria of the gyro bias solve.
    pub solver: LevenbergMarquardtConfig,
    /// Relative singular value threshold of the linear solves.
    pub rank_tolerance: f64,
    /// Condition numbers above this are reported as warnings.
    pub max_condition_number: f64,
    /// Information weight of the zero-mean accelerometer bias prior in the
    /// refined pass.
    pub accel_bias_prior_weight: f64,
    /// How many times the refined pass is relinearized around its own
    /// gravity estimate.
    pub gravity_refinement_iterations: usize,
}

impl Default for InitializerConfig {
    fn default() -> Self {
        Self {
            min_keyframes: 3,
            recommended_keyframes: 6,
            huber_threshold: 0.5,
            solver: LevenbergMarquardtConfig::default(),
            rank_tolerance: 1e-10,
            max_condition_number: 1e6,
            accel_bias_prior_weight: 1e-8,
            gravity_refinement_iterations: 2,
        }
    }
}
