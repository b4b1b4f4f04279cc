//! On-manifold IMU preintegration.
//!
//! Integrates raw IMU samples between two keyframes into an
//! [`InertialFactor`]: relative rotation/velocity/position in the body frame
//! of the first keyframe, the first-order bias Jacobians, and the propagated
//! covariance of [δθ, δv, δp].

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

use crate::geometry::{right_jacobian_so3, skew};

use super::factor::{BiasJacobians, InertialFactor};
use super::sample::{ImuBias, ImuParameters, ImuSample};
use super::types::{Matrix6, Matrix9, Matrix9x6};

/// IMU preintegrator: integrates high-rate IMU into a relative motion prior.
pub struct Preintegrator {
    bias: ImuBias,
    sigma_gyro: f64,
    sigma_accel: f64,
    delta_rot: UnitQuaternion<f64>,
    delta_vel: Vector3<f64>,
    delta_pos: Vector3<f64>,
    dt: f64,
    jacobians: BiasJacobians,
    covariance: Matrix9,
}

impl Preintegrator {
    pub fn new(bias: ImuBias, params: &ImuParameters) -> Self {
        Self {
            bias,
            sigma_gyro: params.sigma_gyro,
            sigma_accel: params.sigma_accel,
            delta_rot: UnitQuaternion::identity(),
            delta_vel: Vector3::zeros(),
            delta_pos: Vector3::zeros(),
            dt: 0.0,
            jacobians: BiasJacobians::zeros(),
            covariance: Matrix9::zeros(),
        }
    }

    pub fn reset(&mut self) {
        self.delta_rot = UnitQuaternion::identity();
        self.delta_vel = Vector3::zeros();
        self.delta_pos = Vector3::zeros();
        self.dt = 0.0;
        self.jacobians = BiasJacobians::zeros();
        self.covariance = Matrix9::zeros();
    }

    /// Integrated time span so far (s).
    pub fn elapsed(&self) -> f64 {
        self.dt
    }

    /// Integrate the interval between two consecutive samples, using the
    /// mean of both readings over the step.
    pub fn integrate(&mut self, prev: ImuSample, curr: ImuSample) {
        let dt = curr.timestamp_s - prev.timestamp_s;
        if dt <= 0.0 {
            return;
        }

        let omega = 0.5 * (prev.gyro + curr.gyro) - self.bias.gyro;
        let accel = 0.5 * (prev.accel + curr.accel) - self.bias.accel;
        self.integrate_measurement(&omega, &accel, dt);
    }

    /// Integrate one bias-corrected angular rate / specific force over `dt`.
    pub fn integrate_measurement(&mut self, omega: &Vector3<f64>, accel: &Vector3<f64>, dt: f64) {
        let dt_sq = dt * dt;
        let r = self.delta_rot.to_rotation_matrix().into_inner();
        let accel_skew = skew(accel);
        let step_rot = UnitQuaternion::from_scaled_axis(omega * dt);
        let step_rot_mat = step_rot.to_rotation_matrix().into_inner();
        let jr = right_jacobian_so3(&(omega * dt));

        // Covariance propagation, state order [δθ, δv, δp]
        let mut a = Matrix9::identity();
        a.fixed_view_mut::<3, 3>(0, 0).copy_from(&step_rot_mat.transpose());
        a.fixed_view_mut::<3, 3>(3, 0).copy_from(&(-r * accel_skew * dt));
        a.fixed_view_mut::<3, 3>(6, 0).copy_from(&(-0.5 * r * accel_skew * dt_sq));
        a.fixed_view_mut::<3, 3>(6, 3).copy_from(&(Matrix3::identity() * dt));

        let mut b = Matrix9x6::zeros();
        b.fixed_view_mut::<3, 3>(0, 0).copy_from(&(jr * dt));
        b.fixed_view_mut::<3, 3>(3, 3).copy_from(&(r * dt));
        b.fixed_view_mut::<3, 3>(6, 3).copy_from(&(0.5 * r * dt_sq));

        let mut noise = Matrix6::zeros();
        let gyro_var = self.sigma_gyro * self.sigma_gyro / dt;
        let accel_var = self.sigma_accel * self.sigma_accel / dt;
        for i in 0..3 {
            noise[(i, i)] = gyro_var;
            noise[(i + 3, i + 3)] = accel_var;
        }
        self.covariance = a * self.covariance * a.transpose() + b * noise * b.transpose();

        // Bias Jacobians, using the rotation before this step
        let j = &mut self.jacobians;
        j.pos_accel += j.vel_accel * dt - 0.5 * r * dt_sq;
        j.pos_gyro += j.vel_gyro * dt - 0.5 * r * accel_skew * j.rot_gyro * dt_sq;
        j.vel_accel -= r * dt;
        j.vel_gyro -= r * accel_skew * j.rot_gyro * dt;
        j.rot_gyro = step_rot_mat.transpose() * j.rot_gyro - jr * dt;

        // Measurement update
        self.delta_pos += self.delta_vel * dt + 0.5 * (r * accel) * dt_sq;
        self.delta_vel += (r * accel) * dt;
        self.delta_rot = self.delta_rot * step_rot;
        self.dt += dt;
    }

    /// Snapshot the integrated measurement as an immutable factor.
    pub fn finish(&self) -> InertialFactor {
        InertialFactor::new(
            self.delta_rot,
            self.delta_vel,
            self.delta_pos,
            self.dt,
            self.bias,
            self.jacobians,
            self.covariance,
        )
    }
}
