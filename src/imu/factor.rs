//! Preintegrated inertial factor linking two consecutive keyframes.
//!
//! The factor summarises all IMU samples between keyframe i and keyframe j
//! as a relative motion expressed in the body frame of keyframe i, with the
//! gravity contribution removed:
//!
//! ```text
//! R_j = R_i · ΔR_ij
//! v_j = v_i + g·Δt + R_i · Δv_ij
//! p_j = p_i + v_i·Δt + ½·g·Δt² + R_i · Δp_ij
//! ```
//!
//! The measurements were integrated at a fixed bias `b̄`. A different bias
//! `b = b̄ + δb` is accounted for to first order through the bias Jacobians.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use super::sample::ImuBias;
use super::types::Matrix9;

/// Sensitivity of the preintegrated measurements to the biases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiasJacobians {
    /// ∂ΔR / ∂b_g (tangent space).
    pub rot_gyro: Matrix3<f64>,
    /// ∂Δv / ∂b_g.
    pub vel_gyro: Matrix3<f64>,
    /// ∂Δv / ∂b_a.
    pub vel_accel: Matrix3<f64>,
    /// ∂Δp / ∂b_g.
    pub pos_gyro: Matrix3<f64>,
    /// ∂Δp / ∂b_a.
    pub pos_accel: Matrix3<f64>,
}

impl BiasJacobians {
    pub fn zeros() -> Self {
        Self {
            rot_gyro: Matrix3::zeros(),
            vel_gyro: Matrix3::zeros(),
            vel_accel: Matrix3::zeros(),
            pos_gyro: Matrix3::zeros(),
            pos_accel: Matrix3::zeros(),
        }
    }
}

/// Immutable preintegrated IMU factor between keyframe `k` and `k + 1`.
#[derive(Debug, Clone)]
pub struct InertialFactor {
    pub delta_rot: UnitQuaternion<f64>,
    pub delta_vel: Vector3<f64>,
    pub delta_pos: Vector3<f64>,
    /// Integration time span (s).
    pub dt: f64,
    /// Bias the measurements were integrated with.
    pub linearization_bias: ImuBias,
    pub jacobians: BiasJacobians,
    /// Covariance of [δθ, δv, δp].
    pub covariance: Matrix9,
}

impl InertialFactor {
    pub fn new(
        delta_rot: UnitQuaternion<f64>,
        delta_vel: Vector3<f64>,
        delta_pos: Vector3<f64>,
        dt: f64,
        linearization_bias: ImuBias,
        jacobians: BiasJacobians,
        covariance: Matrix9,
    ) -> Self {
        Self {
            delta_rot,
            delta_vel,
            delta_pos,
            dt,
            linearization_bias,
            jacobians,
            covariance,
        }
    }

    fn bias_delta(&self, bias: &ImuBias) -> (Vector3<f64>, Vector3<f64>) {
        (
            bias.gyro - self.linearization_bias.gyro,
            bias.accel - self.linearization_bias.accel,
        )
    }

    /// ΔR·Exp(J^R_g·δb_g).
    pub fn get_delta_rotation(&self, bias: &ImuBias) -> UnitQuaternion<f64> {
        let (dbg, _) = self.bias_delta(bias);
        self.delta_rot * UnitQuaternion::from_scaled_axis(self.jacobians.rot_gyro * dbg)
    }

    /// Δv + J^v_g·δb_g + J^v_a·δb_a.
    pub fn get_delta_velocity(&self, bias: &ImuBias) -> Vector3<f64> {
        let (dbg, dba) = self.bias_delta(bias);
        self.delta_vel + self.jacobians.vel_gyro * dbg + self.jacobians.vel_accel * dba
    }

    /// Δp + J^p_g·δb_g + J^p_a·δb_a.
    pub fn get_delta_position(&self, bias: &ImuBias) -> Vector3<f64> {
        let (dbg, dba) = self.bias_delta(bias);
        self.delta_pos + self.jacobians.pos_gyro * dbg + self.jacobians.pos_accel * dba
    }
}
