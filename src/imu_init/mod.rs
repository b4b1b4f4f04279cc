//! Visual-inertial initialization.
//!
//! Recovers metric scale, gravity, gyro/accel bias and keyframe velocities
//! for a window of monocular keyframes linked by preintegrated IMU factors,
//! then rescales the window's poses and landmarks.

pub mod commit;
pub mod config;
pub mod error;
pub mod gyro_bias;
pub mod initializer;
pub mod scale_gravity;
pub mod snapshot;
pub mod velocity;
pub mod window;

pub use config::{InitializerConfig, DEFAULT_MAX_ITERATIONS};
pub use error::{InitError, InitWarning, LinearStage};
pub use initializer::{InitializationEstimate, InitializationSummary, VisualInertialInitializer};
pub use snapshot::{KeyFrameSnapshot, WindowSnapshot};
pub use window::InitializationWindow;
