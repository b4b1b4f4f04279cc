//! Closed-form keyframe velocities once scale, gravity and biases are known.

use nalgebra::Vector3;

use crate::imu::{ImuBias, InertialFactor};

use super::snapshot::WindowSnapshot;

/// World-frame body velocity of every keyframe.
///
/// Keyframe `k < N-1` is solved from the position equation of its outgoing
/// factor,
///
/// ```text
/// v_k = (p_k+1 - p_k - ½·g·Δt² - R_k·Δp_k(b)) / Δt
/// ```
///
/// and the last keyframe is propagated through its incoming factor,
/// `v_N-1 = v_N-2 + g·Δt + R_N-2·Δv_N-2(b)`.
pub fn recover_velocities(
    snapshot: &WindowSnapshot,
    factors: &[InertialFactor],
    scale: f64,
    gravity: &Vector3<f64>,
    bias: &ImuBias,
) -> Vec<Vector3<f64>> {
    let n = snapshot.len();
    let mut velocities = Vec::with_capacity(n);

    for (k, factor) in factors.iter().enumerate().take(n.saturating_sub(1)) {
        let (kf_i, kf_j) = (&snapshot.keyframes[k], &snapshot.keyframes[k + 1]);
        let dt = snapshot.dt(k);
        let displacement = kf_j.body_position(scale) - kf_i.body_position(scale);

        velocities.push(
            (displacement - 0.5 * *gravity * dt * dt - kf_i.r_wb * factor.get_delta_position(bias)) / dt,
        );
    }

    if n >= 2 {
        let k = n - 2;
        let dt = snapshot.dt(k);
        let propagated = velocities[k]
            + *gravity * dt
            + snapshot.keyframes[k].r_wb * factors[k].get_delta_velocity(bias);
        velocities.push(propagated);
    }

    velocities
}
