//! Keyframe kinematic state and IMU initialization state tracking.

use nalgebra::Vector3;

use super::sample::ImuBias;
use super::types::Vector9;

/// State of IMU initialization for a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImuInitState {
    /// Waiting for enough keyframes.
    #[default]
    NotInitialized,
    /// At least one attempt was made and failed; more keyframes may help.
    Initializing,
    /// Scale, gravity, biases and velocities were committed.
    Initialized,
}

/// The 9-component keyframe state `[velocity(3), gyro_bias(3), accel_bias(3)]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpeedAndBias(pub Vector9);

impl SpeedAndBias {
    pub fn zero() -> Self {
        Self(Vector9::zeros())
    }

    pub fn new(velocity: Vector3<f64>, bias: ImuBias) -> Self {
        let mut v = Vector9::zeros();
        v.fixed_rows_mut::<3>(0).copy_from(&velocity);
        v.fixed_rows_mut::<3>(3).copy_from(&bias.gyro);
        v.fixed_rows_mut::<3>(6).copy_from(&bias.accel);
        Self(v)
    }

    pub fn velocity(&self) -> Vector3<f64> {
        self.0.fixed_rows::<3>(0).into_owned()
    }

    pub fn gyro_bias(&self) -> Vector3<f64> {
        self.0.fixed_rows::<3>(3).into_owned()
    }

    pub fn accel_bias(&self) -> Vector3<f64> {
        self.0.fixed_rows::<3>(6).into_owned()
    }

    pub fn bias(&self) -> ImuBias {
        ImuBias::new(self.gyro_bias(), self.accel_bias())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_and_bias_layout() {
        let sb = SpeedAndBias::new(
            Vector3::new(1.0, 2.0, 3.0),
            ImuBias::new(Vector3::new(4.0, 5.0, 6.0), Vector3::new(7.0, 8.0, 9.0)),
        );

        assert_eq!(sb.0[0], 1.0);
        assert_eq!(sb.0[5], 6.0);
        assert_eq!(sb.0[8], 9.0);
        assert_eq!(sb.velocity(), Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(sb.bias().accel, Vector3::new(7.0, 8.0, 9.0));
    }

    #[test]
    fn test_init_state_default() {
        assert_eq!(ImuInitState::default(), ImuInitState::NotInitialized);
    }
}
