//! Small dense square matrices of f64 values.

use std::ops::{Index, IndexMut};

/// Pivots smaller than this fraction of the largest matrix entry are treated
/// as zero during inversion.
pub const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Row-major N×N matrix of f64 values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SquareMatrix<const N: usize> {
    data: [[f64; N]; N],
}

/// The 4×4 matrix used by the tilt/shift normal equations.
pub type Mat4 = SquareMatrix<4>;

impl<const N: usize> SquareMatrix<N> {
    #[inline]
    pub const fn zeros() -> Self {
        Self {
            data: [[0.0; N]; N],
        }
    }

    pub fn identity() -> Self {
        let mut m = Self::zeros();
        for i in 0..N {
            m.data[i][i] = 1.0;
        }
        m
    }

    #[inline]
    pub const fn from_rows(data: [[f64; N]; N]) -> Self {
        Self { data }
    }

    #[inline]
    pub const fn rows(&self) -> &[[f64; N]; N] {
        &self.data
    }

    pub fn transpose(&self) -> Self {
        let mut t = Self::zeros();
        for i in 0..N {
            for j in 0..N {
                t.data[j][i] = self.data[i][j];
            }
        }
        t
    }

    /// Exact symmetry, no tolerance.
    pub fn is_symmetric(&self) -> bool {
        (0..N).all(|i| (i + 1..N).all(|j| self.data[i][j] == self.data[j][i]))
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().flatten().all(|v| v.is_finite())
    }

    /// Largest absolute entry (0 for an empty or all-zero matrix).
    pub fn max_abs(&self) -> f64 {
        self.data
            .iter()
            .flatten()
            .fold(0.0f64, |acc, v| acc.max(v.abs()))
    }

    pub fn mul_vec(&self, v: &[f64; N]) -> [f64; N] {
        let mut out = [0.0; N];
        for (o, row) in out.iter_mut().zip(&self.data) {
            *o = row.iter().zip(v).map(|(a, b)| a * b).sum();
        }
        out
    }

    #[allow(clippy::needless_range_loop)]
    pub fn mul_mat(&self, rhs: &Self) -> Self {
        let mut out = Self::zeros();
        for i in 0..N {
            for j in 0..N {
                out.data[i][j] = (0..N).map(|k| self.data[i][k] * rhs.data[k][j]).sum();
            }
        }
        out
    }

    /// Matrix inverse via Gauss-Jordan elimination with partial pivoting.
    ///
    /// Returns `None` when the matrix is zero, non-finite, or has a pivot
    /// below [`SINGULAR_TOLERANCE`] relative to its largest entry.
    #[allow(clippy::needless_range_loop)]
    pub fn inverse(&self) -> Option<Self> {
        let scale = self.max_abs();
        if !self.is_finite() || scale == 0.0 {
            return None;
        }
        let threshold = SINGULAR_TOLERANCE * scale;

        let mut a = self.data;
        let mut inv = Self::identity().data;

        for col in 0..N {
            let mut pivot_row = col;
            let mut pivot_abs = a[col][col].abs();
            for row in (col + 1)..N {
                let val = a[row][col].abs();
                if val > pivot_abs {
                    pivot_abs = val;
                    pivot_row = row;
                }
            }

            if pivot_abs <= threshold {
                return None;
            }

            if pivot_row != col {
                a.swap(col, pivot_row);
                inv.swap(col, pivot_row);
            }

            let pivot = a[col][col];
            for j in 0..N {
                a[col][j] /= pivot;
                inv[col][j] /= pivot;
            }

            for row in 0..N {
                if row == col {
                    continue;
                }
                let factor = a[row][col];
                if factor == 0.0 {
                    continue;
                }
                for j in 0..N {
                    a[row][j] -= factor * a[col][j];
                    inv[row][j] -= factor * inv[col][j];
                }
            }
        }

        Some(Self { data: inv })
    }

    /// Inverse of a symmetric positive semi-definite matrix such as a
    /// normal-equations matrix.
    ///
    /// The matrix is scaled to `D·A·D` with `D = diag(1 / sqrt(a_ii))` before
    /// [`inverse`](Self::inverse) runs, and `A⁻¹ = D·(D·A·D)⁻¹·D` is returned.
    /// The singularity test therefore sees a unit diagonal and does not depend
    /// on the units of the unknowns. Returns `None` for a non-finite matrix or
    /// a diagonal entry that is not strictly positive.
    pub fn inverse_equilibrated(&self) -> Option<Self> {
        if !self.is_finite() {
            return None;
        }

        let mut d = [0.0; N];
        for (i, di) in d.iter_mut().enumerate() {
            let diag = self.data[i][i];
            if diag <= 0.0 {
                return None;
            }
            *di = 1.0 / diag.sqrt();
        }

        let mut scaled = *self;
        scaled.scale_symmetric(&d);
        let mut inv = scaled.inverse()?;
        inv.scale_symmetric(&d);
        Some(inv)
    }

    /// `self[i][j] *= d[i] · d[j]`
    fn scale_symmetric(&mut self, d: &[f64; N]) {
        for (row, di) in self.data.iter_mut().zip(d) {
            for (v, dj) in row.iter_mut().zip(d) {
                *v *= di * dj;
            }
        }
    }
}

impl<const N: usize> Index<(usize, usize)> for SquareMatrix<N> {
    type Output = f64;

    #[inline]
    fn index(&self, (row, col): (usize, usize)) -> &f64 {
        &self.data[row][col]
    }
}

impl<const N: usize> IndexMut<(usize, usize)> for SquareMatrix<N> {
    #[inline]
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut f64 {
        &mut self.data[row][col]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_near_identity<const N: usize>(m: &SquareMatrix<N>, tol: f64) {
        let id = SquareMatrix::<N>::identity();
        for i in 0..N {
            for j in 0..N {
                assert!(
                    (m[(i, j)] - id[(i, j)]).abs() < tol,
                    "entry ({i}, {j}) = {} deviates from identity",
                    m[(i, j)]
                );
            }
        }
    }

    #[test]
    fn test_identity_inverse() {
        let id = Mat4::identity();
        assert_eq!(id.inverse(), Some(id));
    }

    #[test]
    fn test_inverse_2x2_known() {
        // [[4, 7], [2, 6]]^-1 = [[0.6, -0.7], [-0.2, 0.4]]
        let m = SquareMatrix::from_rows([[4.0, 7.0], [2.0, 6.0]]);
        let inv = m.inverse().unwrap();
        let expected = [[0.6, -0.7], [-0.2, 0.4]];
        for i in 0..2 {
            for j in 0..2 {
                assert!((inv[(i, j)] - expected[i][j]).abs() < 1e-14);
            }
        }
    }

    #[test]
    fn test_inverse_symmetric_4x4() {
        let m = Mat4::from_rows([
            [10.0, 2.0, 3.0, 1.0],
            [2.0, 8.0, 1.0, 0.5],
            [3.0, 1.0, 6.0, 2.0],
            [1.0, 0.5, 2.0, 5.0],
        ]);
        let inv = m.inverse().unwrap();
        assert_near_identity(&m.mul_mat(&inv), 1e-13);
        assert_near_identity(&inv.mul_mat(&m), 1e-13);
    }

    #[test]
    fn test_inverse_needs_pivoting() {
        // Zero on the leading diagonal: fails without row exchange.
        let m = SquareMatrix::from_rows([[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 2.0]]);
        let inv = m.inverse().unwrap();
        assert_near_identity(&m.mul_mat(&inv), 1e-15);
        assert_eq!(inv[(0, 1)], 1.0);
        assert_eq!(inv[(2, 2)], 0.5);
    }

    #[test]
    fn test_inverse_badly_scaled_rows() {
        // Moments of very different magnitude, as in the normal equations.
        let m = Mat4::from_rows([
            [1e6, 0.0, 2e3, 0.0],
            [0.0, 1e6, 0.0, 2e3],
            [2e3, 0.0, 5.0, 0.0],
            [0.0, 2e3, 0.0, 5.0],
        ]);
        let inv = m.inverse().unwrap();
        assert_near_identity(&m.mul_mat(&inv), 1e-9);
    }

    #[test]
    fn test_zero_matrix_is_singular() {
        assert_eq!(Mat4::zeros().inverse(), None);
        assert_eq!(Mat4::zeros().inverse_equilibrated(), None);
    }

    #[test]
    fn test_equilibrated_inverse_ignores_unit_scale() {
        let base = Mat4::from_rows([
            [4.0, 1.0, 0.5, 0.2],
            [1.0, 3.0, 0.3, 0.1],
            [0.5, 0.3, 2.0, 0.4],
            [0.2, 0.1, 0.4, 1.0],
        ]);
        let scales = [1e-6, 1.0, 1e4, 1e9];
        let mut m = base;
        m.scale_symmetric(&scales);

        // Same system in different units: the plain relative test gives up.
        assert_eq!(m.inverse(), None);

        let inv = m.inverse_equilibrated().unwrap();
        let base_inv = base.inverse().unwrap();
        for i in 0..4 {
            for j in 0..4 {
                let expected = base_inv[(i, j)] / (scales[i] * scales[j]);
                assert!(
                    (inv[(i, j)] - expected).abs() <= 1e-12 * expected.abs(),
                    "entry ({i}, {j}): {} vs {expected}",
                    inv[(i, j)]
                );
            }
        }
    }

    #[test]
    fn test_equilibrated_inverse_rejects_non_positive_diagonal() {
        let mut m = Mat4::identity();
        m[(2, 2)] = 0.0;
        assert_eq!(m.inverse_equilibrated(), None);
        m[(2, 2)] = -1.0;
        assert_eq!(m.inverse_equilibrated(), None);
        m[(2, 2)] = f64::NAN;
        assert_eq!(m.inverse_equilibrated(), None);
    }

    #[test]
    fn test_equilibrated_inverse_detects_rank_deficiency() {
        // Rows 0 and 1 are proportional after scaling.
        let m = SquareMatrix::from_rows([[1e-8, 1e-4, 0.0], [1e-4, 1.0, 0.0], [0.0, 0.0, 1e6]]);
        assert_eq!(m.inverse_equilibrated(), None);
    }

    #[test]
    fn test_zeros_is_not_identity() {
        assert_eq!(Mat4::zeros().max_abs(), 0.0);
        assert_ne!(Mat4::zeros(), Mat4::identity());
    }

    #[test]
    fn test_rank_deficient_is_singular() {
        let m = SquareMatrix::from_rows([[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [1.0, 0.0, 1.0]]);
        assert_eq!(m.inverse(), None);
    }

    #[test]
    fn test_non_finite_is_singular() {
        let mut m = Mat4::identity();
        m[(2, 1)] = f64::NAN;
        assert_eq!(m.inverse(), None);
        m[(2, 1)] = f64::INFINITY;
        assert_eq!(m.inverse(), None);
    }

    #[test]
    fn test_mul_vec() {
        let m = SquareMatrix::from_rows([[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(m.mul_vec(&[1.0, -1.0]), [-1.0, -1.0]);
    }

    #[test]
    fn test_symmetry_and_transpose() {
        let m = SquareMatrix::from_rows([[1.0, 2.0], [3.0, 4.0]]);
        assert!(!m.is_symmetric());
        assert_eq!(m.transpose().rows(), &[[1.0, 3.0], [2.0, 4.0]]);
        let s = m.mul_mat(&m.transpose());
        assert!(s.is_symmetric());
    }

    #[test]
    fn test_max_abs() {
        let m = SquareMatrix::from_rows([[1.0, -7.5], [3.0, 4.0]]);
        assert_eq!(m.max_abs(), 7.5);
        assert_eq!(Mat4::zeros().max_abs(), 0.0);
    }
}
