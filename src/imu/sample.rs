use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Standard gravity magnitude (m/s^2).
pub const GRAVITY_MAGNITUDE: f64 = 9.81;

/// IMU biases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuBias {
    pub gyro: Vector3<f64>,
    pub accel: Vector3<f64>,
}

impl ImuBias {
    pub fn zero() -> Self {
        Self {
            gyro: Vector3::zeros(),
            accel: Vector3::zeros(),
        }
    }

    pub fn new(gyro: Vector3<f64>, accel: Vector3<f64>) -> Self {
        Self { gyro, accel }
    }
}

impl Default for ImuBias {
    fn default() -> Self {
        Self::zero()
    }
}

/// Single IMU measurement.
#[derive(Debug, Clone, Copy)]
pub struct ImuSample {
    pub timestamp_s: f64,
    pub accel: Vector3<f64>,
    pub gyro: Vector3<f64>,
}

/// Process-wide IMU and gravity configuration.
///
/// Noise densities are continuous-time (per √Hz). `gravity` holds the current
/// best estimate of the world-frame gravity vector and is replaced in place
/// when visual-inertial initialization succeeds; its magnitude always equals
/// `gravity_magnitude`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuParameters {
    /// Earth acceleration magnitude G (m/s^2).
    pub gravity_magnitude: f64,
    /// Current gravity estimate in the world frame.
    pub gravity: Vector3<f64>,
    /// Gyroscope noise density (rad/s/√Hz).
    pub sigma_gyro: f64,
    /// Accelerometer noise density (m/s^2/√Hz).
    pub sigma_accel: f64,
    /// Mean of the accelerometer bias prior.
    pub accel_bias_prior: Vector3<f64>,
    /// IMU rate (Hz).
    pub rate_hz: u32,
}

impl Default for ImuParameters {
    fn default() -> Self {
        Self {
            gravity_magnitude: GRAVITY_MAGNITUDE,
            gravity: Vector3::new(0.0, 0.0, -GRAVITY_MAGNITUDE),
            // Approximate EuRoC noise values
            sigma_gyro: 1.7e-4,
            sigma_accel: 2.0e-3,
            accel_bias_prior: Vector3::zeros(),
            rate_hz: 200,
        }
    }
}
