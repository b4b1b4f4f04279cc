pub mod factor;
pub mod preintegration;
pub mod sample;
pub mod state;
pub mod types;

pub use factor::{BiasJacobians, InertialFactor};
pub use preintegration::Preintegrator;
pub use sample::{ImuBias, ImuParameters, ImuSample, GRAVITY_MAGNITUDE};
pub use state::{ImuInitState, SpeedAndBias};
