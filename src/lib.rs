pub mod camera;
pub mod geometry;
pub mod imu;
pub mod imu_init;
pub mod map;
pub mod optimizer;
pub mod simulation;
