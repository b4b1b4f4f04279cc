//! One-shot visual-inertial initialization of a keyframe window.
//!
//! `CheckPreconditions → EstimateGyroBias → SolvePass1 → RefineGravity →
//! RecoverVelocity → Commit`. Every stage before the commit works on a
//! snapshot and buffers its output, so a failure anywhere leaves keyframes,
//! landmarks and the IMU parameters exactly as they were.
//!
//! The caller must keep tracking from writing to the window between the
//! snapshot and the commit.

use std::sync::Arc;

use nalgebra::Vector3;
use tracing::{debug, info, warn};

use crate::imu::{ImuBias, ImuParameters, InertialFactor};
use crate::map::KeyFrame;
use crate::optimizer::{Conditioning, LevenbergMarquardt, LinearLeastSquares, SvdSolver};

use super::commit::commit;
use super::config::InitializerConfig;
use super::error::{InitError, InitWarning, LinearStage};
use super::gyro_bias::estimate_gyro_bias;
use super::scale_gravity::{build_triplets, solve_coarse, solve_refined, AccelBiasPrior};
use super::snapshot::WindowSnapshot;
use super::velocity::recover_velocities;

/// Everything the estimation passes produce, before anything is written.
#[derive(Debug, Clone)]
pub struct InitializationEstimate {
    /// Visual-to-metric scale λ.
    pub scale: f64,
    /// Refined world-frame gravity, `|g| = G`.
    pub gravity: Vector3<f64>,
    /// Gyro and accelerometer bias shared by the window.
    pub bias: ImuBias,
    /// World-frame body velocity per keyframe.
    pub velocities: Vec<Vector3<f64>>,
    /// Scale from the coarse pass, before refinement.
    pub coarse_scale: f64,
    pub gyro_iterations: usize,
    pub warnings: Vec<InitWarning>,
}

/// Result of a committed initialization.
#[derive(Debug, Clone)]
pub struct InitializationSummary {
    pub estimate: InitializationEstimate,
    /// Distinct landmarks whose position was multiplied by the scale.
    pub landmarks_rescaled: usize,
}

/// Stateless initializer; one call per accumulated window.
pub struct VisualInertialInitializer<S = SvdSolver> {
    config: InitializerConfig,
    nonlinear: LevenbergMarquardt,
    linear: S,
}

impl VisualInertialInitializer<SvdSolver> {
    pub fn new(config: InitializerConfig) -> Self {
        let linear = SvdSolver::new(config.rank_tolerance);
        Self::with_linear_solver(config, linear)
    }
}

impl Default for VisualInertialInitializer<SvdSolver> {
    fn default() -> Self {
        Self::new(InitializerConfig::default())
    }
}

impl<S: LinearLeastSquares> VisualInertialInitializer<S> {
    /// Initializer solving its linear systems with `linear`.
    pub fn with_linear_solver(config: InitializerConfig, linear: S) -> Self {
        let nonlinear = LevenbergMarquardt::new(config.solver.clone());
        Self {
            config,
            nonlinear,
            linear,
        }
    }

    pub fn config(&self) -> &InitializerConfig {
        &self.config
    }

    /// Run every estimation pass without touching shared state.
    ///
    /// # Panics
    ///
    /// If `factors.len() + 1 != keyframes.len()` for a window long enough to
    /// be attempted. Factor `k` must link keyframe `k` and `k + 1`.
    pub fn estimate(
        &self,
        keyframes: &[Arc<KeyFrame>],
        factors: &[InertialFactor],
        imu_params: &ImuParameters,
        max_iterations: usize,
    ) -> Result<InitializationEstimate, InitError> {
        let n = keyframes.len();
        let required = self.config.min_keyframes.max(3);
        if n < required {
            debug!("IMU init: {} keyframes, need {}", n, required);
            return Err(InitError::InsufficientFrames { found: n, required });
        }
        assert_eq!(
            factors.len() + 1,
            n,
            "inertial factor k must link keyframe k and k + 1"
        );

        let mut warnings = Vec::new();
        if n < self.config.recommended_keyframes {
            let warning = InitWarning::FewKeyframes {
                found: n,
                recommended: self.config.recommended_keyframes,
            };
            warn!("IMU init: {}", warning);
            warnings.push(warning);
        }

        let snapshot = WindowSnapshot::capture(keyframes)?;
        let gravity_magnitude = imu_params.gravity_magnitude;

        let gyro = estimate_gyro_bias(
            &snapshot,
            factors,
            self.config.huber_threshold,
            &self.nonlinear,
            max_iterations,
        )?;

        let triplets = build_triplets(&snapshot, factors, &gyro.bias);
        let coarse = solve_coarse(&triplets, gravity_magnitude, &self.linear)?;
        self.check_conditioning(LinearStage::ScaleGravity, &coarse.conditioning, &mut warnings);

        let prior = AccelBiasPrior {
            mean: imu_params.accel_bias_prior,
            weight: self.config.accel_bias_prior_weight,
        };
        let mut refined = solve_refined(&triplets, &coarse.gravity, gravity_magnitude, &prior, &self.linear)?;
        for _ in 1..self.config.gravity_refinement_iterations {
            refined = solve_refined(&triplets, &refined.gravity, gravity_magnitude, &prior, &self.linear)?;
        }
        self.check_conditioning(LinearStage::Refinement, &refined.conditioning, &mut warnings);

        if !refined.scale.is_finite() || refined.scale <= 0.0 {
            return Err(InitError::Degenerate {
                reason: format!("recovered scale {} is not positive", refined.scale),
            });
        }

        let bias = ImuBias::new(gyro.bias, refined.accel_bias);
        let velocities = recover_velocities(&snapshot, factors, refined.scale, &refined.gravity, &bias);
        if velocities.iter().flat_map(|v| v.iter()).any(|c| !c.is_finite()) {
            return Err(InitError::Degenerate {
                reason: "non-finite velocity".to_string(),
            });
        }

        Ok(InitializationEstimate {
            scale: refined.scale,
            gravity: refined.gravity,
            bias,
            velocities,
            coarse_scale: coarse.scale,
            gyro_iterations: gyro.iterations,
            warnings,
        })
    }

    /// Estimate and, on success, commit scale, gravity, biases and
    /// velocities to the window and `imu_params`.
    pub fn initialize(
        &self,
        keyframes: &[Arc<KeyFrame>],
        factors: &[InertialFactor],
        imu_params: &mut ImuParameters,
        max_iterations: usize,
    ) -> Result<InitializationSummary, InitError> {
        let estimate = self.estimate(keyframes, factors, imu_params, max_iterations)?;
        let landmarks_rescaled = commit(&estimate, keyframes, imu_params);

        info!(
            "IMU initialized over {} keyframes: scale {:.4}, gravity [{:.3}, {:.3}, {:.3}], bg [{:.5}, {:.5}, {:.5}], ba [{:.4}, {:.4}, {:.4}], {} landmarks rescaled",
            keyframes.len(),
            estimate.scale,
            estimate.gravity.x,
            estimate.gravity.y,
            estimate.gravity.z,
            estimate.bias.gyro.x,
            estimate.bias.gyro.y,
            estimate.bias.gyro.z,
            estimate.bias.accel.x,
            estimate.bias.accel.y,
            estimate.bias.accel.z,
            landmarks_rescaled
        );

        Ok(InitializationSummary {
            estimate,
            landmarks_rescaled,
        })
    }

    /// [`initialize`](Self::initialize) reduced to success or failure.
    pub fn try_initialize(
        &self,
        keyframes: &[Arc<KeyFrame>],
        factors: &[InertialFactor],
        imu_params: &mut ImuParameters,
        max_iterations: usize,
    ) -> bool {
        match self.initialize(keyframes, factors, imu_params, max_iterations) {
            Ok(_) => true,
            Err(e) => {
                warn!("IMU init failed: {}", e);
                false
            }
        }
    }

    fn check_conditioning(&self, stage: LinearStage, conditioning: &Conditioning, warnings: &mut Vec<InitWarning>) {
        if conditioning.is_rank_deficient() || conditioning.condition_number > self.config.max_condition_number {
            let warning = InitWarning::IllConditioned {
                stage,
                rank: conditioning.rank,
                cols: conditioning.cols,
                condition_number: conditioning.condition_number,
            };
            warn!("IMU init: {}", warning);
            warnings.push(warning);
        }
    }
}
