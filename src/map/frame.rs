//! Frame - handle to the image frame a keyframe was created from.
//!
//! Image data, pyramids and gradients live in the front end; the estimation
//! core only needs the frame's identity, its capture time and the camera that
//! took it.

use std::sync::Arc;

use crate::camera::Camera;

#[derive(Debug, Clone)]
pub struct Frame {
    pub id: u64,
    /// Capture time in nanoseconds.
    pub timestamp_ns: u64,
    pub camera: Arc<dyn Camera>,
}

impl Frame {
    pub fn new(id: u64, timestamp_ns: u64, camera: Arc<dyn Camera>) -> Self {
        Self {
            id,
            timestamp_ns,
            camera,
        }
    }

    /// Capture time in seconds.
    pub fn timestamp_s(&self) -> f64 {
        self.timestamp_ns as f64 * 1e-9
    }
}
