//! Gyroscope bias from visual relative rotations.
//!
//! One robustified residual per consecutive keyframe pair compares the
//! bias-corrected preintegrated rotation with the relative body rotation
//! observed by vision:
//!
//! ```text
//! r_k = Log( (ΔR_k · Exp(J^R_g,k · (b_g - b̄_g,k)))ᵀ · R_kᵀ · R_k+1 )
//! ```
//!
//! A single bias is shared by the whole window. The bias lives in a flat
//! vector space, so the solver update is plain addition.

use nalgebra::{DMatrix, DVector, Matrix3, Rotation3, Vector3};
use tracing::debug;

use crate::geometry::{exp_so3, log_so3, right_jacobian_so3, right_jacobian_so3_inv};
use crate::imu::InertialFactor;
use crate::optimizer::{
    huber_loss, huber_weight, LeastSquaresProblem, LevenbergMarquardt, Linearization, SolverError,
};

use super::error::InitError;
use super::snapshot::WindowSnapshot;

struct RotationPair {
    /// Preintegrated rotation at the factor's linearization bias.
    delta_rot: Rotation3<f64>,
    rot_gyro: Matrix3<f64>,
    linearization_gyro: Vector3<f64>,
    /// Relative body rotation from vision, R_iᵀ · R_j.
    relative: Rotation3<f64>,
}

impl RotationPair {
    fn residual(&self, gyro_bias: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
        let phi = self.rot_gyro * (gyro_bias - self.linearization_gyro);
        let corrected = self.delta_rot * exp_so3(&phi);
        (log_so3(&(corrected.inverse() * self.relative)), phi)
    }
}

/// Robust rotation-consistency problem over the 3-vector gyro bias.
pub struct GyroBiasProblem {
    pairs: Vec<RotationPair>,
    huber_threshold: f64,
}

impl GyroBiasProblem {
    pub fn new(snapshot: &WindowSnapshot, factors: &[InertialFactor], huber_threshold: f64) -> Self {
        let pairs = snapshot
            .keyframes
            .windows(2)
            .zip(factors)
            .map(|(kfs, factor)| RotationPair {
                delta_rot: factor.delta_rot.to_rotation_matrix(),
                rot_gyro: factor.jacobians.rot_gyro,
                linearization_gyro: factor.linearization_bias.gyro,
                relative: Rotation3::from_matrix_unchecked(kfs[0].r_wb.transpose() * kfs[1].r_wb),
            })
            .collect();

        Self {
            pairs,
            huber_threshold,
        }
    }

    pub fn num_residuals(&self) -> usize {
        self.pairs.len()
    }

    fn unpack(x: &DVector<f64>) -> Vector3<f64> {
        Vector3::new(x[0], x[1], x[2])
    }
}

impl LeastSquaresProblem for GyroBiasProblem {
    fn num_params(&self) -> usize {
        3
    }

    fn cost(&self, x: &DVector<f64>) -> f64 {
        let bias = Self::unpack(x);
        self.pairs
            .iter()
            .map(|pair| huber_loss(pair.residual(&bias).0.norm_squared(), self.huber_threshold))
            .sum()
    }

    fn linearize(&self, x: &DVector<f64>) -> Linearization {
        let bias = Self::unpack(x);
        let n = self.pairs.len();
        let mut residuals = DVector::zeros(3 * n);
        let mut jacobian = DMatrix::zeros(3 * n, 3);

        for (k, pair) in self.pairs.iter().enumerate() {
            let (r, phi) = pair.residual(&bias);
            // ∂r/∂b_g = -Jr⁻¹(r) · Exp(r)ᵀ · Jr(φ) · J^R_g
            let j = -right_jacobian_so3_inv(&r)
                * exp_so3(&r).matrix().transpose()
                * right_jacobian_so3(&phi)
                * pair.rot_gyro;
            let w = huber_weight(r.norm(), self.huber_threshold).sqrt();

            residuals.fixed_rows_mut::<3>(3 * k).copy_from(&(w * r));
            jacobian.fixed_view_mut::<3, 3>(3 * k, 0).copy_from(&(w * j));
        }

        Linearization {
            residuals,
            jacobian,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GyroBiasEstimate {
    pub bias: Vector3<f64>,
    pub iterations: usize,
    pub final_cost: f64,
}

/// Solve for the window's gyro bias, starting from the bias the first factor
/// was integrated with.
pub fn estimate_gyro_bias(
    snapshot: &WindowSnapshot,
    factors: &[InertialFactor],
    huber_threshold: f64,
    solver: &LevenbergMarquardt,
    max_iterations: usize,
) -> Result<GyroBiasEstimate, InitError> {
    let problem = GyroBiasProblem::new(snapshot, factors, huber_threshold);
    let x0 = factors
        .first()
        .map(|f| f.linearization_bias.gyro)
        .unwrap_or_else(Vector3::zeros);

    let report = solver
        .minimize(&problem, DVector::from_column_slice(x0.as_slice()), max_iterations)
        .map_err(|e| {
            let iterations = match e {
                SolverError::MaxIterations { iterations } => iterations,
                SolverError::DampingSaturated { iterations, .. } => iterations,
                _ => 0,
            };
            InitError::SolverDivergence {
                iterations,
                reason: e.to_string(),
            }
        })?;

    let bias = GyroBiasProblem::unpack(&report.x);
    debug!(
        "gyro bias [{:.6}, {:.6}, {:.6}] from {} pairs, {} iters, cost {:.3e}",
        bias.x,
        bias.y,
        bias.z,
        problem.num_residuals(),
        report.iterations,
        report.final_cost
    );

    Ok(GyroBiasEstimate {
        bias,
        iterations: report.iterations,
        final_cost: report.final_cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imu::{ImuBias, SpeedAndBias};
    use crate::imu_init::snapshot::KeyFrameSnapshot;
    use crate::map::KeyFrameId;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    fn snapshot_with_attitudes(attitudes: &[Vector3<f64>]) -> WindowSnapshot {
        let keyframes = attitudes
            .iter()
            .enumerate()
            .map(|(i, phi)| {
                let r = exp_so3(phi).into_inner();
                KeyFrameSnapshot {
                    id: KeyFrameId::new(i as u64),
                    timestamp_ns: i as u64 * 100_000_000,
                    r_wc: r,
                    p_wc: Vector3::zeros(),
                    r_wb: r,
                    p_cb: Vector3::zeros(),
                    state: SpeedAndBias::zero(),
                }
            })
            .collect();
        WindowSnapshot { keyframes }
    }

    /// Factors whose measured rotation was integrated with a biased gyro.
    fn factors_for(snapshot: &WindowSnapshot, true_bias: &Vector3<f64>) -> Vec<InertialFactor> {
        let mut jacobians = crate::imu::BiasJacobians::zeros();
        jacobians.rot_gyro = -0.1 * Matrix3::identity();

        snapshot
            .keyframes
            .windows(2)
            .map(|kfs| {
                let relative = Rotation3::from_matrix_unchecked(kfs[0].r_wb.transpose() * kfs[1].r_wb);
                let measured = relative * exp_so3(&(-jacobians.rot_gyro * true_bias));
                InertialFactor::new(
                    UnitQuaternion::from_rotation_matrix(&measured),
                    Vector3::zeros(),
                    Vector3::zeros(),
                    0.1,
                    ImuBias::zero(),
                    jacobians,
                    crate::imu::types::Matrix9::identity() * 1e-6,
                )
            })
            .collect()
    }

    fn attitudes() -> Vec<Vector3<f64>> {
        vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.05, -0.02, 0.1),
            Vector3::new(0.08, 0.01, 0.25),
            Vector3::new(0.02, 0.06, 0.3),
        ]
    }

    #[test]
    fn test_zero_bias_converges_immediately() {
        let snapshot = snapshot_with_attitudes(&attitudes());
        let factors = factors_for(&snapshot, &Vector3::zeros());

        let est = estimate_gyro_bias(&snapshot, &factors, 0.5, &LevenbergMarquardt::default(), 30).unwrap();

        assert_relative_eq!(est.bias, Vector3::zeros(), epsilon = 1e-10);
        assert_eq!(est.iterations, 0);
    }

    #[test]
    fn test_recovers_bias() {
        let snapshot = snapshot_with_attitudes(&attitudes());
        let truth = Vector3::new(0.02, -0.015, 0.01);
        let factors = factors_for(&snapshot, &truth);

        let est = estimate_gyro_bias(&snapshot, &factors, 0.5, &LevenbergMarquardt::default(), 30).unwrap();

        assert_relative_eq!(est.bias, truth, epsilon = 1e-8);
    }

    #[test]
    fn test_analytic_jacobian_matches_finite_differences() {
        let snapshot = snapshot_with_attitudes(&attitudes());
        let factors = factors_for(&snapshot, &Vector3::new(0.3, -0.2, 0.1));
        let problem = GyroBiasProblem::new(&snapshot, &factors, 10.0);

        let x = DVector::from_vec(vec![0.05, 0.02, -0.04]);
        let lin = problem.linearize(&x);
        let h = 1e-7;
        for c in 0..3 {
            let mut xp = x.clone();
            xp[c] += h;
            let numeric = (problem.linearize(&xp).residuals - &lin.residuals) / h;
            for r in 0..numeric.len() {
                assert_relative_eq!(lin.jacobian[(r, c)], numeric[r], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn test_budget_exhaustion_reports_divergence() {
        let snapshot = snapshot_with_attitudes(&attitudes());
        let factors = factors_for(&snapshot, &Vector3::new(0.4, -0.3, 0.2));

        let err = estimate_gyro_bias(&snapshot, &factors, 0.5, &LevenbergMarquardt::default(), 1).unwrap_err();

        assert!(matches!(err, InitError::SolverDivergence { iterations: 1, .. }));
    }
}
