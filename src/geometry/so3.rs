//! SO(3) Lie group utilities for preintegration and bias estimation.
//!
//! Provides the hat operator, exponential/logarithm maps and the right
//! Jacobian Jr(φ) following the convention in Forster et al.
//! "IMU Preintegration on Manifold".

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

/// Small angle threshold for numerical stability.
const SMALL_ANGLE_THRESHOLD: f64 = 1e-6;

/// Constructs the skew-symmetric matrix [v]× such that [v]× u = v × u.
///
/// ```text
/// [v]× = |  0   -v_z   v_y |
///        |  v_z   0   -v_x |
///        | -v_y  v_x    0  |
/// ```
#[inline]
#[rustfmt::skip]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// Exponential map: axis-angle vector to rotation.
#[inline]
pub fn exp_so3(phi: &Vector3<f64>) -> Rotation3<f64> {
    Rotation3::new(*phi)
}

/// Logarithm map: rotation to axis-angle vector.
///
/// Goes through the unit quaternion and `θ = 2·atan2(|v|, w)`, which stays
/// finite when rounding pushes the trace above 3 and keeps full precision
/// near the identity, where an `acos` of the trace cannot.
pub fn log_so3(rot: &Rotation3<f64>) -> Vector3<f64> {
    let q = UnitQuaternion::from_rotation_matrix(rot);
    let (w, v) = if q.scalar() < 0.0 {
        (-q.scalar(), -q.imag())
    } else {
        (q.scalar(), q.imag())
    };

    let n = v.norm();
    if n < 1e-15 {
        // θ/n → 2/w
        return v * (2.0 / w);
    }
    v * (2.0 * n.atan2(w) / n)
}

/// Computes the right Jacobian Jr(φ) of SO(3).
///
/// ```text
/// Jr(φ) = I - (1 - cos|φ|)/|φ|² [φ]× + (|φ| - sin|φ|)/|φ|³ [φ]×²
/// ```
///
/// For small angles (|φ| < ε):
/// ```text
/// Jr(φ) ≈ I - 0.5 [φ]×
/// ```
pub fn right_jacobian_so3(phi: &Vector3<f64>) -> Matrix3<f64> {
    let theta = phi.norm();

    if theta < SMALL_ANGLE_THRESHOLD {
        return Matrix3::identity() - 0.5 * skew(phi);
    }

    let theta_sq = theta * theta;
    let theta_cu = theta_sq * theta;
    let skew_phi = skew(phi);
    let skew_phi_sq = skew_phi * skew_phi;

    Matrix3::identity() - ((1.0 - theta.cos()) / theta_sq) * skew_phi
        + ((theta - theta.sin()) / theta_cu) * skew_phi_sq
}

/// Computes the inverse of the right Jacobian Jr⁻¹(φ).
///
/// ```text
/// Jr⁻¹(φ) = I + 0.5 [φ]× + (1/|φ|² - (1 + cos|φ|)/(2|φ| sin|φ|)) [φ]×²
/// ```
pub fn right_jacobian_so3_inv(phi: &Vector3<f64>) -> Matrix3<f64> {
    let theta = phi.norm();
    let skew_phi = skew(phi);

    if theta < SMALL_ANGLE_THRESHOLD {
        return Matrix3::identity() + 0.5 * skew_phi + (1.0 / 12.0) * skew_phi * skew_phi;
    }

    let theta_sq = theta * theta;
    let coeff = 1.0 / theta_sq - (1.0 + theta.cos()) / (2.0 * theta * theta.sin());

    Matrix3::identity() + 0.5 * skew_phi + coeff * skew_phi * skew_phi
}

/// Rotation taking unit direction `from` onto unit direction `to`.
///
/// Anti-parallel inputs rotate by π about an axis perpendicular to `from`.
pub fn rotation_between(from: &Vector3<f64>, to: &Vector3<f64>) -> Rotation3<f64> {
    let from = from.normalize();
    let to = to.normalize();
    let cross = from.cross(&to);
    let dot = from.dot(&to);

    if cross.norm() < 1e-10 {
        if dot > 0.0 {
            return Rotation3::identity();
        }
        let perp = if from.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let axis = from.cross(&perp).normalize();
        return exp_so3(&(axis * std::f64::consts::PI));
    }

    let angle = cross.norm().atan2(dot);
    exp_so3(&(cross.normalize() * angle))
}
