//! Dense linear least squares through the singular value decomposition.
//!
//! Returns the minimum-norm solution of `A·x ≈ b` together with what the
//! decomposition reveals about the system: numerical rank, condition number
//! and a basis of the null space. Callers decide what a poorly conditioned
//! system means for them.

use nalgebra::{DMatrix, DVector};

use super::error::SolverError;

/// Numerical health of a solved linear system.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditioning {
    /// Number of singular values above the rank threshold.
    pub rank: usize,
    /// Number of unknowns.
    pub cols: usize,
    /// `σ_max / σ_min` over all `cols` singular values (infinite when rank deficient).
    pub condition_number: f64,
    /// Singular values, largest first.
    pub singular_values: Vec<f64>,
}

impl Conditioning {
    pub fn is_rank_deficient(&self) -> bool {
        self.rank < self.cols
    }

    pub fn nullity(&self) -> usize {
        self.cols - self.rank
    }
}

#[derive(Debug, Clone)]
pub struct LinearSolution {
    /// Minimum-norm least-squares solution.
    pub x: DVector<f64>,
    pub conditioning: Conditioning,
    /// Orthonormal basis of the numerical null space of `A`.
    pub null_space: Vec<DVector<f64>>,
}

/// Solver capability for `A·x ≈ b`.
pub trait LinearLeastSquares {
    fn solve(&self, a: &DMatrix<f64>, b: &DVector<f64>) -> Result<LinearSolution, SolverError>;
}

#[derive(Debug, Clone, Copy)]
pub struct SvdSolver {
    /// Singular values below `rank_tolerance · σ_max` count as zero.
    pub rank_tolerance: f64,
}

impl Default for SvdSolver {
    fn default() -> Self {
        Self {
            rank_tolerance: 1e-10,
        }
    }
}

impl SvdSolver {
    pub fn new(rank_tolerance: f64) -> Self {
        Self { rank_tolerance }
    }

    /// The `nullity` eigenvectors of `AᵀA` with the smallest eigenvalues.
    /// Works for wide systems, where the thin SVD carries no right-singular
    /// vectors for the missing dimensions.
    fn null_space(&self, a: &DMatrix<f64>, nullity: usize) -> Vec<DVector<f64>> {
        let eigen = (a.transpose() * a).symmetric_eigen();

        let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
        order.sort_by(|&i, &j| eigen.eigenvalues[i].total_cmp(&eigen.eigenvalues[j]));
        order
            .into_iter()
            .take(nullity)
            .map(|i| eigen.eigenvectors.column(i).into_owned())
            .collect()
    }
}

impl LinearLeastSquares for SvdSolver {
    fn solve(&self, a: &DMatrix<f64>, b: &DVector<f64>) -> Result<LinearSolution, SolverError> {
        if a.nrows() != b.len() {
            return Err(SolverError::DimensionMismatch {
                rows: a.nrows(),
                rhs_rows: b.len(),
            });
        }
        if a.iter().chain(b.iter()).any(|v| !v.is_finite()) {
            return Err(SolverError::NonFinite("linear system"));
        }

        let cols = a.ncols();
        let svd = a.clone().svd(true, true);

        let mut singular_values: Vec<f64> = svd.singular_values.iter().copied().collect();
        singular_values.sort_by(|x, y| y.total_cmp(x));
        let sigma_max = singular_values.first().copied().unwrap_or(0.0);
        let threshold = (sigma_max * self.rank_tolerance).max(f64::MIN_POSITIVE);

        let rank = singular_values.iter().filter(|&&s| s > threshold).count();
        let condition_number = if rank < cols {
            f64::INFINITY
        } else {
            sigma_max / singular_values[cols - 1]
        };

        let x = svd.solve(b, threshold).map_err(SolverError::Decomposition)?;
        let null_space = if rank < cols {
            self.null_space(a, cols - rank)
        } else {
            Vec::new()
        };

        Ok(LinearSolution {
            x,
            conditioning: Conditioning {
                rank,
                cols,
                condition_number,
                singular_values,
            },
            null_space,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_full_rank_exact_solution() {
        let a = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, -1.0]);
        let x_true = DVector::from_vec(vec![2.0, -3.0]);
        let b = &a * &x_true;

        let sol = SvdSolver::default().solve(&a, &b).unwrap();

        assert_relative_eq!(sol.x, x_true, epsilon = 1e-12);
        assert_eq!(sol.conditioning.rank, 2);
        assert!(!sol.conditioning.is_rank_deficient());
        assert!(sol.conditioning.condition_number.is_finite());
        assert!(sol.null_space.is_empty());
    }

    #[test]
    fn test_rank_deficient_minimum_norm() {
        // Second column duplicates the first
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 2.0, 2.0, 3.0, 3.0]);
        let b = DVector::from_vec(vec![2.0, 4.0, 6.0]);

        let sol = SvdSolver::default().solve(&a, &b).unwrap();

        assert_relative_eq!(sol.x, DVector::from_vec(vec![1.0, 1.0]), epsilon = 1e-10);
        assert_eq!(sol.conditioning.rank, 1);
        assert_eq!(sol.conditioning.nullity(), 1);
        assert!(sol.conditioning.condition_number.is_infinite());

        let n = &sol.null_space[0];
        assert_relative_eq!(n[0].abs(), std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-10);
        assert_relative_eq!(n[0], -n[1], epsilon = 1e-10);
    }

    #[test]
    fn test_wide_system_reports_null_space() {
        let a = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let b = DVector::from_vec(vec![1.0, 2.0]);

        let sol = SvdSolver::default().solve(&a, &b).unwrap();

        assert_relative_eq!(sol.x, DVector::from_vec(vec![1.0, 2.0, 0.0]), epsilon = 1e-12);
        assert_eq!(sol.conditioning.rank, 2);
        assert_eq!(sol.null_space.len(), 1);
        assert_relative_eq!(sol.null_space[0][2].abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = DMatrix::<f64>::identity(3, 3);
        let b = DVector::zeros(2);

        assert!(matches!(
            SvdSolver::default().solve(&a, &b),
            Err(SolverError::DimensionMismatch { rows: 3, rhs_rows: 2 })
        ));
    }
}
