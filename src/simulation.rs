//! Synthetic keyframe windows with exact inertial factors.
//!
//! A continuous body trajectory is sampled at keyframe times to produce
//! unscaled camera poses, landmarks and noise-free preintegrated factors.
//! Factor deltas are constructed so that the inertial model holds exactly at
//! the configured bias; bias Jacobians and covariance come from integrating
//! synthesized IMU samples along the trajectory.

use std::sync::Arc;

use nalgebra::{UnitQuaternion, Vector2, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::camera::{Camera, PinholeCamera};
use crate::geometry::{exp_so3, right_jacobian_so3, SE3};
use crate::imu::{ImuBias, ImuParameters, InertialFactor, Preintegrator, GRAVITY_MAGNITUDE};
use crate::map::{Feature, Frame, KeyFrame, KeyFrameId, Landmark, LandmarkId};

/// Body trajectory with analytical derivatives, in metric world units.
pub trait ContinuousTrajectory {
    fn position(&self, t: f64) -> Vector3<f64>;
    fn velocity(&self, t: f64) -> Vector3<f64>;
    fn acceleration(&self, t: f64) -> Vector3<f64>;
    /// Rotation vector of R_wb.
    fn attitude(&self, t: f64) -> Vector3<f64>;
    /// Time derivative of [`attitude`](Self::attitude).
    fn attitude_rate(&self, t: f64) -> Vector3<f64>;

    /// Body-frame angular velocity, `Jr(φ)·φ'`.
    fn angular_velocity(&self, t: f64) -> Vector3<f64> {
        right_jacobian_so3(&self.attitude(t)) * self.attitude_rate(t)
    }
}

/// Smooth figure with every axis accelerating and rotating.
#[derive(Debug, Clone, Copy)]
pub struct LissajousTrajectory;

impl ContinuousTrajectory for LissajousTrajectory {
    fn position(&self, t: f64) -> Vector3<f64> {
        Vector3::new(
            (1.3 * t).sin(),
            0.7 * (1.0 - (0.9 * t).cos()),
            0.4 * (1.7 * t).sin() + 0.2 * t,
        )
    }

    fn velocity(&self, t: f64) -> Vector3<f64> {
        Vector3::new(
            1.3 * (1.3 * t).cos(),
            0.7 * 0.9 * (0.9 * t).sin(),
            0.4 * 1.7 * (1.7 * t).cos() + 0.2,
        )
    }

    fn acceleration(&self, t: f64) -> Vector3<f64> {
        Vector3::new(
            -1.3 * 1.3 * (1.3 * t).sin(),
            0.7 * 0.81 * (0.9 * t).cos(),
            -0.4 * 1.7 * 1.7 * (1.7 * t).sin(),
        )
    }

    fn attitude(&self, t: f64) -> Vector3<f64> {
        Vector3::new(
            0.3 * (1.2 * t).sin(),
            0.25 * (0.8 * t + 0.5).sin(),
            0.6 * (0.6 * t).sin(),
        )
    }

    fn attitude_rate(&self, t: f64) -> Vector3<f64> {
        Vector3::new(
            0.3 * 1.2 * (1.2 * t).cos(),
            0.25 * 0.8 * (0.8 * t + 0.5).cos(),
            0.6 * 0.6 * (0.6 * t).cos(),
        )
    }
}

/// Straight line at fixed attitude; metric scale is unobservable.
#[derive(Debug, Clone, Copy)]
pub struct ConstantVelocityTrajectory {
    pub velocity: Vector3<f64>,
    pub attitude: Vector3<f64>,
}

impl ContinuousTrajectory for ConstantVelocityTrajectory {
    fn position(&self, t: f64) -> Vector3<f64> {
        self.velocity * t
    }

    fn velocity(&self, _t: f64) -> Vector3<f64> {
        self.velocity
    }

    fn acceleration(&self, _t: f64) -> Vector3<f64> {
        Vector3::zeros()
    }

    fn attitude(&self, _t: f64) -> Vector3<f64> {
        self.attitude
    }

    fn attitude_rate(&self, _t: f64) -> Vector3<f64> {
        Vector3::zeros()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Motion {
    Lissajous,
    ConstantVelocity,
}

impl Motion {
    fn trajectory(self) -> Box<dyn ContinuousTrajectory> {
        match self {
            Motion::Lissajous => Box::new(LissajousTrajectory),
            Motion::ConstantVelocity => Box::new(ConstantVelocityTrajectory {
                velocity: Vector3::new(0.4, 0.1, 0.2),
                attitude: Vector3::new(0.1, -0.05, 0.2),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub num_keyframes: usize,
    pub keyframe_interval_s: f64,
    /// Metric length of one visual unit.
    pub scale: f64,
    /// World-frame gravity, `|g| = G`.
    pub gravity: Vector3<f64>,
    /// Bias the IMU measurements carry.
    pub bias: ImuBias,
    /// Camera-to-body transform.
    pub t_body_cam: SE3,
    pub num_landmarks: usize,
    pub seed: u64,
    pub motion: Motion,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_keyframes: 8,
            keyframe_interval_s: 0.25,
            scale: 2.5,
            gravity: exp_so3(&Vector3::new(0.05, -0.08, 0.0)) * Vector3::new(0.0, 0.0, -GRAVITY_MAGNITUDE),
            bias: ImuBias::zero(),
            t_body_cam: SE3::new(
                UnitQuaternion::from_scaled_axis(Vector3::new(0.02, -0.03, 0.01)),
                Vector3::new(0.05, -0.02, 0.01),
            ),
            num_landmarks: 20,
            seed: 7,
            motion: Motion::Lissajous,
        }
    }
}

impl SimulationConfig {
    /// Unaccelerated, non-rotating motion.
    pub fn constant_velocity() -> Self {
        Self {
            motion: Motion::ConstantVelocity,
            ..Self::default()
        }
    }
}

/// Values the window was generated from.
#[derive(Debug, Clone)]
pub struct GroundTruth {
    pub scale: f64,
    pub gravity: Vector3<f64>,
    pub bias: ImuBias,
    /// Metric world-frame body velocity per keyframe.
    pub velocities: Vec<Vector3<f64>>,
}

pub struct SyntheticWindow {
    pub keyframes: Vec<Arc<KeyFrame>>,
    /// Factor `k` links keyframe `k` and `k + 1`.
    pub factors: Vec<InertialFactor>,
    /// Every landmark, each observed by at least one keyframe.
    pub landmarks: Vec<Arc<Landmark>>,
    pub camera: Arc<PinholeCamera>,
    pub truth: GroundTruth,
}

fn default_camera() -> PinholeCamera {
    PinholeCamera::new(400.0, 400.0, 320.0, 240.0, 640, 480)
}

impl SyntheticWindow {
    /// Three keyframes 0.1 s apart falling freely along world -Z with no
    /// rotation, identity extrinsic and unit scale.
    pub fn falling_body() -> Self {
        let gravity = Vector3::new(0.0, 0.0, -GRAVITY_MAGNITUDE);
        let v0 = Vector3::new(0.0, 0.0, -9.5095);
        let trajectory = FreeFall { v0, gravity };
        let config = SimulationConfig {
            num_keyframes: 3,
            keyframe_interval_s: 0.1,
            scale: 1.0,
            gravity,
            bias: ImuBias::zero(),
            t_body_cam: SE3::identity(),
            num_landmarks: 12,
            seed: 3,
            motion: Motion::ConstantVelocity,
        };
        Self::from_trajectory(&config, &trajectory)
    }

    /// Window along the configured motion.
    pub fn generic(config: &SimulationConfig) -> Self {
        let trajectory = config.motion.trajectory();
        Self::from_trajectory(config, trajectory.as_ref())
    }

    fn from_trajectory(config: &SimulationConfig, trajectory: &dyn ContinuousTrajectory) -> Self {
        let camera = Arc::new(default_camera().with_body_transform(config.t_body_cam));
        let timestamps: Vec<u64> = (0..config.num_keyframes)
            .map(|k| (k as f64 * config.keyframe_interval_s * 1e9).round() as u64)
            .collect();
        let times: Vec<f64> = timestamps.iter().map(|&ns| ns as f64 * 1e-9).collect();

        // Metric camera poses T_wc = T_wb · T_bc
        let metric_poses: Vec<SE3> = times
            .iter()
            .map(|&t| body_pose(trajectory, t).compose(&config.t_body_cam))
            .collect();

        let keyframes: Vec<Arc<KeyFrame>> = timestamps
            .iter()
            .zip(&metric_poses)
            .enumerate()
            .map(|(k, (&ns, pose))| {
                let frame = Arc::new(Frame::new(k as u64, ns, camera.clone()));
                let visual = SE3::new(pose.rotation, pose.translation / config.scale);
                Arc::new(KeyFrame::new(KeyFrameId::new(k as u64), frame, visual))
            })
            .collect();

        let factors = times
            .windows(2)
            .map(|t| exact_factor(trajectory, t[0], t[1], &config.gravity, &config.bias))
            .collect();

        let landmarks = observe_landmarks(config, &camera, &metric_poses, &keyframes);

        let truth = GroundTruth {
            scale: config.scale,
            gravity: config.gravity,
            bias: config.bias,
            velocities: times.iter().map(|&t| trajectory.velocity(t)).collect(),
        };

        Self {
            keyframes,
            factors,
            landmarks,
            camera,
            truth,
        }
    }
}

/// Ballistic flight with constant attitude.
struct FreeFall {
    v0: Vector3<f64>,
    gravity: Vector3<f64>,
}

impl ContinuousTrajectory for FreeFall {
    fn position(&self, t: f64) -> Vector3<f64> {
        self.v0 * t + 0.5 * self.gravity * t * t
    }

    fn velocity(&self, t: f64) -> Vector3<f64> {
        self.v0 + self.gravity * t
    }

    fn acceleration(&self, _t: f64) -> Vector3<f64> {
        self.gravity
    }

    fn attitude(&self, _t: f64) -> Vector3<f64> {
        Vector3::zeros()
    }

    fn attitude_rate(&self, _t: f64) -> Vector3<f64> {
        Vector3::zeros()
    }
}

fn body_pose(trajectory: &dyn ContinuousTrajectory, t: f64) -> SE3 {
    SE3::new(
        UnitQuaternion::from_scaled_axis(trajectory.attitude(t)),
        trajectory.position(t),
    )
}

/// Factor between `t_i` and `t_j` whose bias-corrected deltas reproduce the
/// trajectory exactly at `bias`.
fn exact_factor(
    trajectory: &dyn ContinuousTrajectory,
    t_i: f64,
    t_j: f64,
    gravity: &Vector3<f64>,
    bias: &ImuBias,
) -> InertialFactor {
    let params = ImuParameters::default();
    let gravity = *gravity;
    let dt = t_j - t_i;

    // Jacobians and covariance from integrating the true motion
    let mut pre = Preintegrator::new(ImuBias::zero(), &params);
    let steps = ((dt * params.rate_hz as f64).round() as usize).max(1);
    let h = dt / steps as f64;
    for s in 0..steps {
        let t = t_i + (s as f64 + 0.5) * h;
        let r_wb = exp_so3(&trajectory.attitude(t));
        let specific_force = r_wb.inverse() * (trajectory.acceleration(t) - gravity);
        pre.integrate_measurement(&trajectory.angular_velocity(t), &specific_force, h);
    }
    let integrated = pre.finish();
    let j = integrated.jacobians;

    let r_i = exp_so3(&trajectory.attitude(t_i));
    let r_j = exp_so3(&trajectory.attitude(t_j));
    let (p_i, p_j) = (trajectory.position(t_i), trajectory.position(t_j));
    let (v_i, v_j) = (trajectory.velocity(t_i), trajectory.velocity(t_j));

    let relative = r_i.inverse() * r_j * exp_so3(&(-j.rot_gyro * bias.gyro));
    let delta_vel =
        r_i.inverse() * (v_j - v_i - gravity * dt) - j.vel_gyro * bias.gyro - j.vel_accel * bias.accel;
    let delta_pos = r_i.inverse() * (p_j - p_i - v_i * dt - 0.5 * gravity * dt * dt)
        - j.pos_gyro * bias.gyro
        - j.pos_accel * bias.accel;

    InertialFactor::new(
        UnitQuaternion::from_rotation_matrix(&relative),
        delta_vel,
        delta_pos,
        dt,
        ImuBias::zero(),
        j,
        integrated.covariance,
    )
}

/// Scatter landmarks in front of the first camera and attach a feature to
/// every keyframe that sees each one.
fn observe_landmarks(
    config: &SimulationConfig,
    camera: &PinholeCamera,
    metric_poses: &[SE3],
    keyframes: &[Arc<KeyFrame>],
) -> Vec<Arc<Landmark>> {
    let Some(first) = metric_poses.first() else {
        return Vec::new();
    };
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let margin = 40.0;

    (0..config.num_landmarks)
        .map(|i| {
            let uv = Vector2::new(
                rng.gen_range(margin..camera.width as f64 - margin),
                rng.gen_range(margin..camera.height as f64 - margin),
            );
            let depth = rng.gen_range(5.0..10.0);
            let metric = first.transform_point(&(camera.unproject(&uv) * depth));
            let landmark = Arc::new(Landmark::new(LandmarkId::new(i as u64), metric / config.scale));

            for (kf, pose) in keyframes.iter().zip(metric_poses) {
                let p_cam = pose.inverse().transform_point(&metric);
                if let Some(pixel) = camera.project(&p_cam).filter(|px| camera.is_in_image(px)) {
                    kf.add_feature(Feature::new(pixel, Arc::clone(&landmark)));
                }
            }
            landmark
        })
        .collect()
}
