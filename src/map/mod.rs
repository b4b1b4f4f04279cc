//! Map entities shared with tracking and visualization.

pub mod feature;
pub mod frame;
pub mod keyframe;
pub mod landmark;
pub mod types;

pub use feature::Feature;
pub use frame::Frame;
pub use keyframe::KeyFrame;
pub use landmark::Landmark;
pub use types::{KeyFrameId, LandmarkId};
