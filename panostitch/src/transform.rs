use crate::error::{PanoError, Result};
use nalgebra::{Matrix3, Vector3};
use std::ops::{Index, Mul};

/// A 2-D projective transform in homogeneous coordinates.
///
/// Points are column vectors `(x, y, 1)`, so `a * b` applies `b` first and
/// then `a`.
///
/// ```text
///   | m00 m01 m02 |   | x |
///   | m10 m11 m12 | * | y |
///   | m20 m21 m22 |   | 1 |
/// ```
///
/// # Examples
/// ```
/// # use panostitch::transform::Transform3x3;
/// let t = Transform3x3::translation(10.0, -4.0) * Transform3x3::rotation(90.0);
/// let (x, y) = t.apply(1.0, 0.0);
/// assert!((x - 10.0).abs() < 1e-12 && (y - -3.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3x3 {
    m: Matrix3<f64>,
}

impl Default for Transform3x3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform3x3 {
    pub fn identity() -> Self {
        Transform3x3 { m: Matrix3::identity() }
    }

    /// Builds a transform from rows.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Self {
        Transform3x3 {
            m: Matrix3::new(
                rows[0][0], rows[0][1], rows[0][2],
                rows[1][0], rows[1][1], rows[1][2],
                rows[2][0], rows[2][1], rows[2][2],
            ),
        }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::from_rows([[1.0, 0.0, tx], [0.0, 1.0, ty], [0.0, 0.0, 1.0]])
    }

    /// In-plane rotation about the origin, counter-clockwise for positive angles
    /// in a y-up frame (clockwise on screen, where y grows downward).
    pub fn rotation(degrees: f64) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        Self::from_rows([[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]])
    }

    /// 3-D rotation about the x axis (camera tilt), for direction vectors.
    pub fn pitch(degrees: f64) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        Self::from_rows([[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]])
    }

    /// 3-D rotation about the y axis (camera pan), for direction vectors.
    pub fn yaw(degrees: f64) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        Self::from_rows([[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]])
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.m
    }

    /// Translation part `(m02, m12)`.
    pub fn translation_part(&self) -> (f64, f64) {
        (self.m[(0, 2)], self.m[(1, 2)])
    }

    /// True when the bottom row is `(0, 0, 1)`, so no per-point divide is needed.
    pub fn is_affine(&self) -> bool {
        self.m[(2, 0)] == 0.0 && self.m[(2, 1)] == 0.0 && self.m[(2, 2)] == 1.0
    }

    /// Applies the transform to `(x, y, 1)` and performs the homogeneous divide.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let v = self.m * Vector3::new(x, y, 1.0);
        (v.x / v.z, v.y / v.z)
    }

    /// Inverts by Gauss-Jordan elimination on `[M | I]` with partial pivoting.
    ///
    /// # Errors
    /// [`PanoError::SingularMatrix`] when no non-zero pivot exists for a column.
    pub fn inverse(&self) -> Result<Transform3x3> {
        let mut a = self.m;
        let mut inv = Matrix3::<f64>::identity();

        for col in 0..3 {
            let mut pivot_row = col;
            for row in col + 1..3 {
                if a[(row, col)].abs() > a[(pivot_row, col)].abs() {
                    pivot_row = row;
                }
            }
            if a[(pivot_row, col)] == 0.0 || !a[(pivot_row, col)].is_finite() {
                return Err(PanoError::SingularMatrix { column: col });
            }
            if pivot_row != col {
                a.swap_rows(pivot_row, col);
                inv.swap_rows(pivot_row, col);
            }

            let pivot = a[(col, col)];
            for k in 0..3 {
                a[(col, k)] /= pivot;
                inv[(col, k)] /= pivot;
            }

            for row in 0..3 {
                if row == col {
                    continue;
                }
                let factor = a[(row, col)];
                if factor == 0.0 {
                    continue;
                }
                for k in 0..3 {
                    a[(row, k)] -= factor * a[(col, k)];
                    inv[(row, k)] -= factor * inv[(col, k)];
                }
            }
        }

        Ok(Transform3x3 { m: inv })
    }

    /// Element-wise comparison within `tol`.
    pub fn approx_eq(&self, other: &Transform3x3, tol: f64) -> bool {
        self.m
            .iter()
            .zip(other.m.iter())
            .all(|(a, b)| (a - b).abs() <= tol)
    }
}

impl Index<(usize, usize)> for Transform3x3 {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &f64 {
        &self.m[index]
    }
}

impl Mul for Transform3x3 {
    type Output = Transform3x3;

    fn mul(self, rhs: Transform3x3) -> Transform3x3 {
        Transform3x3 { m: self.m * rhs.m }
    }
}

impl Mul<Vector3<f64>> for Transform3x3 {
    type Output = Vector3<f64>;

    /// Plain matrix-vector product; the caller divides by `z` when projective.
    fn mul(self, rhs: Vector3<f64>) -> Vector3<f64> {
        self.m * rhs
    }
}
