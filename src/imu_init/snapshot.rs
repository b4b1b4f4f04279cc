//! Read-only copy of a keyframe window.
//!
//! Every pose and state is read once under its shared lock and copied out,
//! so the estimation passes run without holding any lock. Values may go
//! stale if another thread writes between the snapshot and the commit; the
//! caller keeps the producing pipeline paused for the duration of a call.

use std::sync::Arc;

use nalgebra::{Matrix3, Vector3};

use crate::imu::SpeedAndBias;
use crate::map::{KeyFrame, KeyFrameId};

use super::error::InitError;

#[derive(Debug, Clone)]
pub struct KeyFrameSnapshot {
    pub id: KeyFrameId,
    pub timestamp_ns: u64,
    /// Camera attitude R_wc.
    pub r_wc: Matrix3<f64>,
    /// Unscaled camera center.
    pub p_wc: Vector3<f64>,
    /// Body attitude R_wb = R_wc · R_cb.
    pub r_wb: Matrix3<f64>,
    /// Body origin expressed in the camera frame.
    pub p_cb: Vector3<f64>,
    pub state: SpeedAndBias,
}

impl KeyFrameSnapshot {
    fn capture(kf: &KeyFrame) -> Self {
        let pose = kf.pose();
        let t_cb = kf.frame.camera.body_to_sensor().inverse();
        let r_wc = pose.rotation_matrix();

        Self {
            id: kf.id,
            timestamp_ns: kf.timestamp_ns(),
            r_wc,
            p_wc: pose.translation,
            r_wb: r_wc * t_cb.rotation_matrix(),
            p_cb: t_cb.translation,
            state: kf.state(),
        }
    }

    /// Camera-to-body offset in the world frame, `R_wc · p_cb`.
    pub fn lever_arm(&self) -> Vector3<f64> {
        self.r_wc * self.p_cb
    }

    /// Metric body position for visual-to-metric scale `scale`.
    pub fn body_position(&self, scale: f64) -> Vector3<f64> {
        scale * self.p_wc + self.lever_arm()
    }
}

#[derive(Debug, Clone)]
pub struct WindowSnapshot {
    pub keyframes: Vec<KeyFrameSnapshot>,
}

impl WindowSnapshot {
    /// Copy the window, rejecting timestamps that do not strictly increase.
    pub fn capture(keyframes: &[Arc<KeyFrame>]) -> Result<Self, InitError> {
        let keyframes: Vec<KeyFrameSnapshot> =
            keyframes.iter().map(|kf| KeyFrameSnapshot::capture(kf)).collect();

        if let Some(index) = keyframes
            .windows(2)
            .position(|pair| pair[1].timestamp_ns <= pair[0].timestamp_ns)
        {
            return Err(InitError::NonMonotonicTimestamps { index: index + 1 });
        }

        Ok(Self { keyframes })
    }

    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// Seconds between keyframe `i` and `i + 1`.
    pub fn dt(&self, i: usize) -> f64 {
        (self.keyframes[i + 1].timestamp_ns - self.keyframes[i].timestamp_ns) as f64 * 1e-9
    }
}
