//! Metric scale, gravity and accelerometer bias from keyframe triplets.
//!
//! For three consecutive keyframes 1, 2, 3 the preintegrated position and
//! velocity eliminate both unknown velocities, leaving
//!
//! ```text
//! λ·α + β·g = γ + φ·b_a
//!
//! α = (c₂ - c₁)·Δt₂₃ - (c₃ - c₂)·Δt₁₂
//! β = ½·(Δt₁₂²·Δt₂₃ + Δt₂₃²·Δt₁₂)
//! γ = R₁Δp₁₂·Δt₂₃ - R₁Δv₁₂·Δt₁₂·Δt₂₃ - R₂Δp₂₃·Δt₁₂ - (o₂ - o₁)·Δt₂₃ + (o₃ - o₂)·Δt₁₂
//! φ = R₁J^p_a,₁₂·Δt₂₃ - R₁J^v_a,₁₂·Δt₁₂·Δt₂₃ - R₂J^p_a,₂₃·Δt₁₂
//! ```
//!
//! with `c` the unscaled camera centers, `o = R_wc·p_cb` the camera-to-body
//! lever arms, `R` body attitudes, and the deltas evaluated at the estimated
//! gyro bias and zero accelerometer bias.
//!
//! The coarse pass ignores `b_a` and solves for `[λ, g]`. The refined pass
//! fixes `|g| = G`, writes `g = R_wi·Exp(δθ)·g_I·G` and solves for
//! `[λ, δθx, δθy, b_a]`.

use nalgebra::{DMatrix, DVector, Matrix3, Rotation3, Vector3};
use tracing::debug;

use crate::geometry::{exp_so3, rotation_between, skew};
use crate::imu::{ImuBias, InertialFactor};
use crate::optimizer::{Conditioning, LinearLeastSquares};

use super::error::InitError;
use super::snapshot::WindowSnapshot;

/// Largest scale component a null-space direction may carry before the scale
/// counts as unobservable.
const SCALE_NULL_COMPONENT: f64 = 0.1;

/// Canonical gravity direction `g_I`.
pub fn reference_gravity() -> Vector3<f64> {
    Vector3::new(0.0, 0.0, -1.0)
}

/// Coefficients of one interior keyframe.
#[derive(Debug, Clone)]
pub struct Triplet {
    pub alpha: Vector3<f64>,
    pub beta: f64,
    pub gamma: Vector3<f64>,
    pub phi: Matrix3<f64>,
}

/// Build one triplet per interior keyframe.
pub fn build_triplets(
    snapshot: &WindowSnapshot,
    factors: &[InertialFactor],
    gyro_bias: &Vector3<f64>,
) -> Vec<Triplet> {
    let bias = ImuBias::new(*gyro_bias, Vector3::zeros());

    (1..snapshot.len().saturating_sub(1))
        .map(|k| {
            let (kf1, kf2, kf3) = (
                &snapshot.keyframes[k - 1],
                &snapshot.keyframes[k],
                &snapshot.keyframes[k + 1],
            );
            let (f12, f23) = (&factors[k - 1], &factors[k]);
            let dt12 = snapshot.dt(k - 1);
            let dt23 = snapshot.dt(k);

            let (r1, r2) = (kf1.r_wb, kf2.r_wb);
            let (o1, o2, o3) = (kf1.lever_arm(), kf2.lever_arm(), kf3.lever_arm());

            let alpha = (kf2.p_wc - kf1.p_wc) * dt23 - (kf3.p_wc - kf2.p_wc) * dt12;
            let beta = 0.5 * (dt12 * dt12 * dt23 + dt23 * dt23 * dt12);
            let gamma = r1 * f12.get_delta_position(&bias) * dt23
                - r1 * f12.get_delta_velocity(&bias) * dt12 * dt23
                - r2 * f23.get_delta_position(&bias) * dt12
                - (o2 - o1) * dt23
                + (o3 - o2) * dt12;
            let phi = r1 * f12.jacobians.pos_accel * dt23
                - r1 * f12.jacobians.vel_accel * dt12 * dt23
                - r2 * f23.jacobians.pos_accel * dt12;

            Triplet {
                alpha,
                beta,
                gamma,
                phi,
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct CoarseEstimate {
    pub scale: f64,
    /// Unconstrained gravity vector.
    pub gravity: Vector3<f64>,
    pub conditioning: Conditioning,
}

/// Coarse pass: `[λ, g]` from `3(N-2)` rows.
///
/// A minimal window leaves a one-dimensional null space. The minimum-norm
/// solution is then moved along it to the point where `|g| = G` with a
/// positive scale.
pub fn solve_coarse<S: LinearLeastSquares>(
    triplets: &[Triplet],
    gravity_magnitude: f64,
    solver: &S,
) -> Result<CoarseEstimate, InitError> {
    let rows = 3 * triplets.len();
    let mut a = DMatrix::zeros(rows, 4);
    let mut b = DVector::zeros(rows);

    for (k, t) in triplets.iter().enumerate() {
        a.fixed_view_mut::<3, 1>(3 * k, 0).copy_from(&t.alpha);
        a.fixed_view_mut::<3, 3>(3 * k, 1)
            .copy_from(&(Matrix3::identity() * t.beta));
        b.fixed_rows_mut::<3>(3 * k).copy_from(&t.gamma);
    }

    let solution = solver.solve(&a, &b).map_err(|e| InitError::Degenerate {
        reason: format!("scale/gravity solve: {}", e),
    })?;

    let mut x = solution.x;
    if let [n] = solution.null_space.as_slice() {
        if let Some(t) = lift_to_gravity_magnitude(&x, n, gravity_magnitude) {
            x += n * t;
        }
    }

    let estimate = CoarseEstimate {
        scale: x[0],
        gravity: Vector3::new(x[1], x[2], x[3]),
        conditioning: solution.conditioning,
    };
    debug!(
        "coarse: scale {:.6}, gravity [{:.4}, {:.4}, {:.4}] (|g| {:.4}), rank {}",
        estimate.scale,
        estimate.gravity.x,
        estimate.gravity.y,
        estimate.gravity.z,
        estimate.gravity.norm(),
        estimate.conditioning.rank
    );
    Ok(estimate)
}

/// Step `t` along null vector `n` with `|g(x + t·n)| = G` and positive scale,
/// preferring the smaller step.
fn lift_to_gravity_magnitude(x: &DVector<f64>, n: &DVector<f64>, gravity_magnitude: f64) -> Option<f64> {
    let g0 = Vector3::new(x[1], x[2], x[3]);
    let ng = Vector3::new(n[1], n[2], n[3]);

    let qa = ng.norm_squared();
    if qa < 1e-12 {
        return None;
    }
    let qb = 2.0 * g0.dot(&ng);
    let qc = g0.norm_squared() - gravity_magnitude * gravity_magnitude;
    let disc = qb * qb - 4.0 * qa * qc;
    if disc < 0.0 {
        return None;
    }

    let sqrt_disc = disc.sqrt();
    [(-qb + sqrt_disc) / (2.0 * qa), (-qb - sqrt_disc) / (2.0 * qa)]
        .into_iter()
        .filter(|t| x[0] + t * n[0] > 0.0)
        .min_by(|a, b| a.abs().total_cmp(&b.abs()))
}

#[derive(Debug, Clone)]
pub struct RefinedEstimate {
    pub scale: f64,
    /// Gravity with magnitude exactly `G`.
    pub gravity: Vector3<f64>,
    pub accel_bias: Vector3<f64>,
    pub conditioning: Conditioning,
}

/// Prior pulling the accelerometer bias towards `mean` with information `weight`.
#[derive(Debug, Clone, Copy)]
pub struct AccelBiasPrior {
    pub mean: Vector3<f64>,
    pub weight: f64,
}

/// Refined pass: `[λ, δθx, δθy, b_a]` around the gravity direction `gravity`.
pub fn solve_refined<S: LinearLeastSquares>(
    triplets: &[Triplet],
    gravity: &Vector3<f64>,
    gravity_magnitude: f64,
    prior: &AccelBiasPrior,
    solver: &S,
) -> Result<RefinedEstimate, InitError> {
    if !(gravity.norm() > 1e-9) {
        return Err(InitError::Degenerate {
            reason: "gravity direction is undefined".to_string(),
        });
    }

    let g_ref = reference_gravity();
    let r_wi: Rotation3<f64> = rotation_between(&g_ref, gravity);
    let g0 = r_wi * g_ref * gravity_magnitude;
    // ∂g/∂δθ = -G·R_wi·[g_I]×, δθz has no effect
    let dg = -gravity_magnitude * (r_wi.matrix() * skew(&g_ref));
    let dg_xy = dg.fixed_columns::<2>(0);

    let rows = 3 * triplets.len() + 3;
    let mut a = DMatrix::zeros(rows, 6);
    let mut b = DVector::zeros(rows);

    for (k, t) in triplets.iter().enumerate() {
        a.fixed_view_mut::<3, 1>(3 * k, 0).copy_from(&t.alpha);
        a.fixed_view_mut::<3, 2>(3 * k, 1).copy_from(&(dg_xy * t.beta));
        a.fixed_view_mut::<3, 3>(3 * k, 3).copy_from(&(-t.phi));
        b.fixed_rows_mut::<3>(3 * k).copy_from(&(t.gamma - g0 * t.beta));
    }

    let sqrt_w = prior.weight.sqrt();
    let prior_row = 3 * triplets.len();
    a.fixed_view_mut::<3, 3>(prior_row, 3)
        .copy_from(&(Matrix3::identity() * sqrt_w));
    b.fixed_rows_mut::<3>(prior_row).copy_from(&(prior.mean * sqrt_w));

    let solution = solver.solve(&a, &b).map_err(|e| InitError::Degenerate {
        reason: format!("refinement solve: {}", e),
    })?;

    if solution
        .null_space
        .iter()
        .any(|n| n[0].abs() > SCALE_NULL_COMPONENT)
    {
        return Err(InitError::Degenerate {
            reason: "scale is unobservable from this motion".to_string(),
        });
    }

    let x = solution.x;
    let delta_theta = Vector3::new(x[1], x[2], 0.0);
    let estimate = RefinedEstimate {
        scale: x[0],
        gravity: r_wi * exp_so3(&delta_theta) * g_ref * gravity_magnitude,
        accel_bias: Vector3::new(x[3], x[4], x[5]),
        conditioning: solution.conditioning,
    };
    debug!(
        "refined: scale {:.6}, dθ [{:.2e}, {:.2e}], gravity [{:.4}, {:.4}, {:.4}], b_a [{:.5}, {:.5}, {:.5}]",
        estimate.scale,
        x[1],
        x[2],
        estimate.gravity.x,
        estimate.gravity.y,
        estimate.gravity.z,
        estimate.accel_bias.x,
        estimate.accel_bias.y,
        estimate.accel_bias.z
    );
    Ok(estimate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::SvdSolver;
    use crate::simulation::{SimulationConfig, SyntheticWindow};
    use approx::assert_relative_eq;

    fn triplets_of(window: &SyntheticWindow) -> Vec<Triplet> {
        let snapshot = WindowSnapshot::capture(&window.keyframes).unwrap();
        build_triplets(&snapshot, &window.factors, &window.truth.bias.gyro)
    }

    #[test]
    fn test_falling_body_triplet() {
        let window = SyntheticWindow::falling_body();
        let triplets = triplets_of(&window);

        assert_eq!(triplets.len(), 1);
        let t = &triplets[0];
        assert_relative_eq!(t.alpha, Vector3::new(0.0, 0.0, 0.00981), epsilon = 1e-9);
        assert_relative_eq!(t.beta, 0.001, epsilon = 1e-15);
        assert_relative_eq!(t.gamma, Vector3::zeros(), epsilon = 1e-9);
        assert_relative_eq!(t.phi, Matrix3::identity() * 0.001, epsilon = 1e-6);
    }

    #[test]
    fn test_coarse_minimal_window_lifts_to_gravity_magnitude() {
        let window = SyntheticWindow::falling_body();
        let coarse = solve_coarse(&triplets_of(&window), 9.81, &SvdSolver::default()).unwrap();

        assert!(coarse.conditioning.is_rank_deficient());
        assert_relative_eq!(coarse.scale, 1.0, epsilon = 1e-6);
        assert_relative_eq!(coarse.gravity, Vector3::new(0.0, 0.0, -9.81), epsilon = 1e-6);
    }

    #[test]
    fn test_coarse_full_rank_window() {
        let window = SyntheticWindow::generic(&SimulationConfig::default());
        let coarse = solve_coarse(&triplets_of(&window), 9.81, &SvdSolver::default()).unwrap();

        assert!(!coarse.conditioning.is_rank_deficient());
        assert_relative_eq!(coarse.scale, window.truth.scale, epsilon = 1e-6);
        assert_relative_eq!(coarse.gravity, window.truth.gravity, epsilon = 1e-5);
    }

    #[test]
    fn test_refined_keeps_gravity_magnitude() {
        let window = SyntheticWindow::generic(&SimulationConfig::default());
        let triplets = triplets_of(&window);
        let prior = AccelBiasPrior {
            mean: Vector3::zeros(),
            weight: 1e-8,
        };

        // Start from a direction tilted away from the truth
        let tilted = exp_so3(&Vector3::new(0.01, -0.015, 0.0)) * window.truth.gravity;
        let refined = solve_refined(&triplets, &tilted, 9.81, &prior, &SvdSolver::default()).unwrap();

        assert_relative_eq!(refined.gravity.norm(), 9.81, epsilon = 1e-12);
        assert_relative_eq!(refined.gravity, window.truth.gravity, epsilon = 1e-2);
        assert_relative_eq!(refined.scale, window.truth.scale, epsilon = 1e-2);
    }

    #[test]
    fn test_refined_recovers_accel_bias() {
        let config = SimulationConfig {
            bias: ImuBias::new(Vector3::zeros(), Vector3::new(0.08, -0.05, 0.1)),
            ..SimulationConfig::default()
        };
        let window = SyntheticWindow::generic(&config);
        let triplets = triplets_of(&window);
        let prior = AccelBiasPrior {
            mean: Vector3::zeros(),
            weight: 1e-8,
        };

        let refined = solve_refined(
            &triplets,
            &window.truth.gravity,
            9.81,
            &prior,
            &SvdSolver::default(),
        )
        .unwrap();

        assert_relative_eq!(refined.accel_bias, window.truth.bias.accel, epsilon = 2e-3);
        assert_relative_eq!(refined.scale, window.truth.scale, epsilon = 1e-3);
    }

    #[test]
    fn test_refined_rejects_unobservable_scale() {
        let window = SyntheticWindow::generic(&SimulationConfig::constant_velocity());
        let triplets = triplets_of(&window);
        let prior = AccelBiasPrior {
            mean: Vector3::zeros(),
            weight: 1e-8,
        };

        let err = solve_refined(
            &triplets,
            &Vector3::new(0.0, 0.0, -9.81),
            9.81,
            &prior,
            &SvdSolver::default(),
        )
        .unwrap_err();

        assert!(matches!(err, InitError::Degenerate { .. }));
    }
}
