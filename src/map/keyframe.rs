//! KeyFrame - a selected frame with pose, kinematic state and observations.
//!
//! KeyFrames are shared between tracking, visualization and the back end as
//! `Arc<KeyFrame>`. Every mutable field sits behind its own reader-writer
//! lock; readers copy the value out, writers replace it whole.

use std::sync::Arc;

use nalgebra::{Rotation3, Vector3};
use parking_lot::RwLock;

use crate::geometry::SE3;
use crate::imu::{ImuBias, SpeedAndBias};

use super::feature::Feature;
use super::frame::Frame;
use super::landmark::Landmark;
use super::types::KeyFrameId;

pub struct KeyFrame {
    /// Unique identifier for this KeyFrame.
    pub id: KeyFrameId,

    /// Image frame this keyframe was promoted from.
    pub frame: Arc<Frame>,

    /// Pose: transform from camera to world (T_wc).
    /// To transform a point from camera to world: p_world = pose.transform_point(p_cam)
    pose: RwLock<SE3>,

    /// `[velocity(3), gyro_bias(3), accel_bias(3)]`, velocity in world frame.
    state: RwLock<SpeedAndBias>,

    /// 2D observations, each holding its landmark.
    features: RwLock<Vec<Feature>>,
}

impl KeyFrame {
    pub fn new(id: KeyFrameId, frame: Arc<Frame>, pose: SE3) -> Self {
        Self {
            id,
            frame,
            pose: RwLock::new(pose),
            state: RwLock::new(SpeedAndBias::zero()),
            features: RwLock::new(Vec::new()),
        }
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.frame.timestamp_ns
    }

    pub fn timestamp_s(&self) -> f64 {
        self.frame.timestamp_s()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pose
    // ─────────────────────────────────────────────────────────────────────────

    pub fn pose(&self) -> SE3 {
        *self.pose.read()
    }

    pub fn set_pose(&self, pose: SE3) {
        *self.pose.write() = pose;
    }

    /// Multiply the camera center by `scale` under one exclusive lock.
    pub fn rescale_translation(&self, scale: f64) {
        let mut pose = self.pose.write();
        *pose = pose.scaled(scale);
    }

    /// Camera center in world frame.
    pub fn camera_center(&self) -> Vector3<f64> {
        self.pose.read().translation
    }

    /// World-from-body rotation `R_wb = R_wc · R_cb`.
    pub fn body_rotation(&self) -> Rotation3<f64> {
        let t_cb = self.frame.camera.body_to_sensor().inverse();
        (self.pose().rotation * t_cb.rotation).to_rotation_matrix()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Velocity and biases
    // ─────────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> SpeedAndBias {
        *self.state.read()
    }

    pub fn set_state(&self, state: SpeedAndBias) {
        *self.state.write() = state;
    }

    pub fn velocity(&self) -> Vector3<f64> {
        self.state.read().velocity()
    }

    pub fn bias(&self) -> ImuBias {
        self.state.read().bias()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Observations
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_feature(&self, feature: Feature) {
        self.features.write().push(feature);
    }

    pub fn num_features(&self) -> usize {
        self.features.read().len()
    }

    /// Landmarks observed by this keyframe, in observation order.
    ///
    /// The same landmark appears once per feature observing it.
    pub fn landmarks(&self) -> Vec<Arc<Landmark>> {
        self.features
            .read()
            .iter()
            .map(|f| Arc::clone(&f.landmark))
            .collect()
    }
}

impl std::fmt::Debug for KeyFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyFrame")
            .field("id", &self.id)
            .field("timestamp_ns", &self.timestamp_ns())
            .field("pose", &self.pose())
            .field("state", &self.state())
            .field("num_features", &self.num_features())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PinholeCamera;
    use crate::map::LandmarkId;
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector2};

    fn make_keyframe(t_bc: SE3, pose: SE3) -> KeyFrame {
        let camera = Arc::new(PinholeCamera::new(400.0, 400.0, 320.0, 240.0, 640, 480).with_body_transform(t_bc));
        let frame = Arc::new(Frame::new(0, 1_500_000_000, camera));
        KeyFrame::new(KeyFrameId::new(0), frame, pose)
    }

    #[test]
    fn test_timestamps() {
        let kf = make_keyframe(SE3::identity(), SE3::identity());
        assert_eq!(kf.timestamp_ns(), 1_500_000_000);
        assert_relative_eq!(kf.timestamp_s(), 1.5);
    }

    #[test]
    fn test_body_rotation_applies_extrinsic() {
        let r_bc = UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2);
        let r_wc = UnitQuaternion::from_euler_angles(0.3, 0.0, 0.0);
        let kf = make_keyframe(SE3::new(r_bc, Vector3::zeros()), SE3::new(r_wc, Vector3::zeros()));

        let expected = (r_wc * r_bc.inverse()).to_rotation_matrix();
        assert_relative_eq!(kf.body_rotation(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_rescale_translation_keeps_rotation() {
        let r_wc = UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3);
        let kf = make_keyframe(SE3::identity(), SE3::new(r_wc, Vector3::new(1.0, -2.0, 0.5)));
        kf.rescale_translation(2.0);

        assert_eq!(kf.camera_center(), Vector3::new(2.0, -4.0, 1.0));
        assert_eq!(kf.pose().rotation, r_wc);
    }

    #[test]
    fn test_state_replaced_whole() {
        let kf = make_keyframe(SE3::identity(), SE3::identity());
        let bias = ImuBias::new(Vector3::new(0.01, 0.0, 0.0), Vector3::new(0.0, 0.1, 0.0));
        kf.set_state(SpeedAndBias::new(Vector3::new(1.0, 2.0, 3.0), bias));

        assert_eq!(kf.velocity(), Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(kf.bias(), bias);
    }

    #[test]
    fn test_landmarks_listed_per_observation() {
        let kf = make_keyframe(SE3::identity(), SE3::identity());
        let lm = Arc::new(Landmark::new(LandmarkId::new(9), Vector3::new(0.0, 0.0, 3.0)));
        kf.add_feature(Feature::new(Vector2::new(320.0, 240.0), Arc::clone(&lm)));
        kf.add_feature(Feature::new(Vector2::new(321.0, 240.0), Arc::clone(&lm)));

        let landmarks = kf.landmarks();
        assert_eq!(landmarks.len(), 2);
        assert!(Arc::ptr_eq(&landmarks[0], &landmarks[1]));
    }
}
