//! Camera abstraction.
//!
//! Every camera variant exposes its mounting on the rigid body directly,
//! so estimation code never needs to know which projection model is in use.

use nalgebra::{Vector2, Vector3};

use crate::geometry::SE3;

/// Capabilities the estimation core needs from a camera.
pub trait Camera: Send + Sync + std::fmt::Debug {
    /// Transform `T_bs` mapping points from the camera (sensor) frame into the
    /// body/IMU frame: `p_body = T_bs * p_sensor`.
    fn body_to_sensor(&self) -> SE3;

    /// Project a point in the camera frame to pixel coordinates.
    ///
    /// Returns `None` for points behind the camera.
    fn project(&self, p_cam: &Vector3<f64>) -> Option<Vector2<f64>>;

    /// Back-project a pixel to a unit-depth bearing in the camera frame.
    fn unproject(&self, uv: &Vector2<f64>) -> Vector3<f64>;
}

/// Pinhole camera without distortion.
#[derive(Debug, Clone, Copy)]
pub struct PinholeCamera {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
    /// Camera-to-body transform (T_BS in EuRoC calibration files).
    pub t_body_cam: SE3,
}

impl PinholeCamera {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64, width: u32, height: u32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            width,
            height,
            t_body_cam: SE3::identity(),
        }
    }

    pub fn with_body_transform(mut self, t_body_cam: SE3) -> Self {
        self.t_body_cam = t_body_cam;
        self
    }

    pub fn is_in_image(&self, uv: &Vector2<f64>) -> bool {
        uv.x >= 0.0 && uv.y >= 0.0 && uv.x < self.width as f64 && uv.y < self.height as f64
    }
}

impl Camera for PinholeCamera {
    fn body_to_sensor(&self) -> SE3 {
        self.t_body_cam
    }

    fn project(&self, p_cam: &Vector3<f64>) -> Option<Vector2<f64>> {
        if p_cam.z <= 0.0 {
            return None;
        }
        let z_inv = 1.0 / p_cam.z;
        Some(Vector2::new(
            self.fx * p_cam.x * z_inv + self.cx,
            self.fy * p_cam.y * z_inv + self.cy,
        ))
    }

    fn unproject(&self, uv: &Vector2<f64>) -> Vector3<f64> {
        Vector3::new((uv.x - self.cx) / self.fx, (uv.y - self.cy) / self.fy, 1.0)
    }
}
