//! Small dense linear-algebra routines for the Kalman recursions.
//!
//! Purpose
//! -------
//! Provide the handful of symmetric-positive-definite operations the filter
//! and the Gibbs draws need (Cholesky factor/solve, PSD validation,
//! multivariate-normal draws) on top of `ndarray`, so the hot loops stay
//! allocation-light and the numerical failure policy stays in one place.
//!
//! Invariants & assumptions
//! ------------------------
//! - State dimensions are small (a handful of components), so unblocked
//!   O(n^3) factorizations are appropriate.
//! - A non-positive pivot in a strict factorization, or a pivot below
//!   `-PSD_TOL` in a semi-definite one, is a **fatal numerical error**
//!   ([`SsmError::CholeskyFailed`] / [`SsmError::NotPositiveDefinite`]);
//!   there is no jitter regularization or retry.
//!
//! Conventions
//! -----------
//! - Cholesky factors are lower-triangular: `A = L L'`.
//! - `symmetrize` is applied after the covariance updates that accumulate
//!   asymmetric rounding error; it never masks an indefinite matrix.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::statespace::errors::{SsmError, SsmResult};

/// Tolerance below which a semi-definite pivot is treated as exactly zero.
const PSD_TOL: f64 = 1e-9;

/// Lower-triangular Cholesky factor of a strictly positive definite matrix.
///
/// # Errors
/// [`SsmError::CholeskyFailed`] if any pivot is non-positive or non-finite;
/// the `context` string names the caller for diagnostics.
pub fn cholesky(a: ArrayView2<'_, f64>, context: &'static str) -> SsmResult<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut diag = a[(j, j)];
        for k in 0..j {
            diag -= l[(j, k)] * l[(j, k)];
        }
        if !(diag.is_finite() && diag > 0.0) {
            return Err(SsmError::CholeskyFailed { context, pivot: j, value: diag });
        }
        let root = diag.sqrt();
        l[(j, j)] = root;
        for i in (j + 1)..n {
            let mut sum = a[(i, j)];
            for k in 0..j {
                sum -= l[(i, k)] * l[(j, k)];
            }
            l[(i, j)] = sum / root;
        }
    }
    Ok(l)
}

/// Lower-triangular Cholesky factor of a positive **semi**-definite matrix.
///
/// Pivots in `[-PSD_TOL, PSD_TOL]` are clamped to zero (their column is
/// zeroed); pivots below `-PSD_TOL` indicate an indefinite matrix.
///
/// # Errors
/// [`SsmError::NotPositiveDefinite`] when a pivot falls below `-PSD_TOL`.
pub fn psd_cholesky(a: ArrayView2<'_, f64>, context: &'static str) -> SsmResult<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut diag = a[(j, j)];
        for k in 0..j {
            diag -= l[(j, k)] * l[(j, k)];
        }
        if !diag.is_finite() || diag < -PSD_TOL {
            return Err(SsmError::NotPositiveDefinite { context });
        }
        if diag <= PSD_TOL {
            // Semi-definite direction: zero pivot, zero column.
            continue;
        }
        let root = diag.sqrt();
        l[(j, j)] = root;
        for i in (j + 1)..n {
            let mut sum = a[(i, j)];
            for k in 0..j {
                sum -= l[(i, k)] * l[(j, k)];
            }
            l[(i, j)] = sum / root;
        }
    }
    Ok(l)
}

/// Whether a symmetric matrix is positive semi-definite within tolerance.
pub fn is_positive_semidefinite(a: ArrayView2<'_, f64>) -> bool {
    psd_cholesky(a, "psd check").is_ok()
}

/// Solve `L x = b` for lower-triangular `L`.
fn solve_lower(l: ArrayView2<'_, f64>, b: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut x = b.to_owned();
    for i in 0..n {
        for k in 0..i {
            let lik = l[(i, k)];
            x[i] -= lik * x[k];
        }
        x[i] /= l[(i, i)];
    }
    x
}

/// Solve `L' x = b` for lower-triangular `L`.
fn solve_upper_transposed(l: ArrayView2<'_, f64>, b: ArrayView1<'_, f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut x = b.to_owned();
    for i in (0..n).rev() {
        for k in (i + 1)..n {
            let lki = l[(k, i)];
            x[i] -= lki * x[k];
        }
        x[i] /= l[(i, i)];
    }
    x
}

/// Solve `A x = b` given the lower Cholesky factor `L` of `A`.
pub fn cholesky_solve(l: ArrayView2<'_, f64>, b: ArrayView1<'_, f64>) -> Array1<f64> {
    let y = solve_lower(l, b);
    solve_upper_transposed(l, y.view())
}

/// Solve `A X = B` column-by-column given the lower Cholesky factor of `A`.
pub fn cholesky_solve_mat(l: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Array2<f64> {
    let mut x = Array2::<f64>::zeros(b.raw_dim());
    for (j, col) in b.columns().into_iter().enumerate() {
        let solved = cholesky_solve(l, col);
        x.column_mut(j).assign(&solved);
    }
    x
}

/// Log-determinant of `A` from its lower Cholesky factor.
pub fn cholesky_log_det(l: ArrayView2<'_, f64>) -> f64 {
    2.0 * l.diag().iter().map(|v| v.ln()).sum::<f64>()
}

/// Force exact symmetry by averaging a matrix with its transpose.
pub fn symmetrize(a: &mut Array2<f64>) {
    let n = a.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (a[(i, j)] + a[(j, i)]);
            a[(i, j)] = avg;
            a[(j, i)] = avg;
        }
    }
}

/// Draw `N(mean, L L')` given the lower Cholesky factor `L`.
pub fn draw_mvn<R: Rng>(
    rng: &mut R, mean: ArrayView1<'_, f64>, chol_lower: ArrayView2<'_, f64>,
) -> Array1<f64> {
    let n = mean.len();
    let z = Array1::from_iter((0..n).map(|_| rng.sample::<f64, _>(StandardNormal)));
    mean.to_owned() + chol_lower.dot(&z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Cholesky factorization and solve round-trips on small SPD matrices.
    // - Rejection of indefinite matrices in strict and semi-definite modes.
    // - Symmetrization behavior.
    //
    // They intentionally DO NOT cover:
    // - Large-dimension performance characteristics.
    // - Distributional properties of `draw_mvn` (covered indirectly by the
    //   sampler-level tests).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify that `cholesky` reproduces the textbook factor of a 2x2 SPD
    // matrix and that `cholesky_solve` inverts it.
    //
    // Given
    // -----
    // - A = [[4, 2], [2, 3]], b = [2, 1].
    //
    // Expect
    // ------
    // - L = [[2, 0], [1, sqrt(2)]].
    // - A * cholesky_solve(L, b) == b to 1e-12.
    fn cholesky_and_solve_round_trip() {
        // Arrange
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![2.0, 1.0];

        // Act
        let l = cholesky(a.view(), "test").expect("SPD matrix should factor");
        let x = cholesky_solve(l.view(), b.view());
        let back = a.dot(&x);

        // Assert
        assert!((l[(0, 0)] - 2.0).abs() < 1e-12);
        assert!((l[(1, 0)] - 1.0).abs() < 1e-12);
        assert!((l[(1, 1)] - 2.0_f64.sqrt()).abs() < 1e-12);
        for i in 0..2 {
            assert!((back[i] - b[i]).abs() < 1e-12);
        }
    }

    #[test]
    // Purpose
    // -------
    // Ensure a strictly indefinite matrix is rejected by both factorizations.
    //
    // Given
    // -----
    // - A = [[1, 2], [2, 1]] (eigenvalues 3 and -1).
    //
    // Expect
    // ------
    // - `cholesky` returns `CholeskyFailed`.
    // - `psd_cholesky` returns `NotPositiveDefinite`.
    // - `is_positive_semidefinite` is false.
    fn indefinite_matrix_is_rejected() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(matches!(
            cholesky(a.view(), "test"),
            Err(SsmError::CholeskyFailed { .. })
        ));
        assert!(matches!(
            psd_cholesky(a.view(), "test"),
            Err(SsmError::NotPositiveDefinite { .. })
        ));
        assert!(!is_positive_semidefinite(a.view()));
    }

    #[test]
    // Purpose
    // -------
    // Verify that a rank-deficient PSD matrix passes `psd_cholesky` while
    // failing the strict factorization.
    //
    // Given
    // -----
    // - A = [[1, 1], [1, 1]] (rank one).
    //
    // Expect
    // ------
    // - `psd_cholesky` succeeds with L L' == A.
    // - `cholesky` fails.
    fn rank_deficient_is_semidefinite_only() {
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        let l = psd_cholesky(a.view(), "test").expect("PSD matrix should factor");
        let back = l.dot(&l.t());
        for i in 0..2 {
            for j in 0..2 {
                assert!((back[(i, j)] - a[(i, j)]).abs() < 1e-9);
            }
        }
        assert!(cholesky(a.view(), "test").is_err());
    }

    #[test]
    // Purpose
    // -------
    // Check that `symmetrize` averages off-diagonal rounding error.
    //
    // Given
    // -----
    // - A 2x2 matrix with slightly asymmetric off-diagonals.
    //
    // Expect
    // ------
    // - Both off-diagonals equal their average afterwards.
    fn symmetrize_averages_off_diagonals() {
        let mut a = array![[1.0, 0.5 + 1e-13], [0.5 - 1e-13, 2.0]];
        symmetrize(&mut a);
        assert_eq!(a[(0, 1)], a[(1, 0)]);
        assert!((a[(0, 1)] - 0.5).abs() < 1e-12);
    }
}
