//! Feature - a 2D observation binding one keyframe to one landmark.

use std::sync::Arc;

use nalgebra::Vector2;

use super::landmark::Landmark;

/// An observation of a landmark in a keyframe image.
///
/// Owned by the keyframe's observation list. The strong landmark reference
/// keeps the landmark alive while any observer exists.
#[derive(Debug, Clone)]
pub struct Feature {
    /// Pixel coordinates of the observation.
    pub pixel: Vector2<f64>,
    pub landmark: Arc<Landmark>,
}

impl Feature {
    pub fn new(pixel: Vector2<f64>, landmark: Arc<Landmark>) -> Self {
        Self {
            pixel,
            landmark,
        }
    }
}
