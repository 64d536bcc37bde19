//! Cholesky factorization of covariance plus nugget matrices and
//! the triangular solves built on it.
//!
//! Two factorizations are available:
//! * [`CholeskyFactor::full`]: strict decomposition `U^T U = C + diag(n)`
//!   with `U` upper triangular,
//! * [`CholeskyFactor::pivoted`]: incomplete decomposition with diagonal pivoting
//!   which stops when the remaining pivots are negligible. The factor is `r x n`
//!   and its columns taken in pivot order form an upper triangular matrix.

use crate::errors::{not_positive_definite, LcError, Result};
use linfa::Float;
use linfa_linalg::{cholesky::*, triangular::*};
use ndarray::{s, Array1, Array2, ArrayBase, Axis, CowArray, Data, Ix1, Ix2, Zip};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Default relative tolerance for pivoted factorization
pub const DEFAULT_PIVOT_TOLERANCE: f64 = 1e-10;

/// Upper triangular factor `U` such that `U^T U = C + diag(nugget)`
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct CholeskyFactor<F: Float> {
    /// (r, n) factor in original column order
    factor: Array2<F>,
    /// Retained point indices in pivot order, `None` for a full factor
    pivots: Option<Vec<usize>>,
}

fn add_nugget<F: Float>(
    cov: &ArrayBase<impl Data<Elem = F>, Ix2>,
    nugget: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<Array2<F>> {
    if !cov.is_square() {
        return Err(LcError::InvalidValueError(format!(
            "covariance matrix should be square, got {:?}",
            cov.dim()
        )));
    }
    if nugget.len() != cov.nrows() {
        return Err(LcError::InvalidValueError(format!(
            "nugget length {} does not match matrix size {}",
            nugget.len(),
            cov.nrows()
        )));
    }
    if nugget.iter().any(|v| !(v.is_finite() && *v >= F::zero())) {
        return Err(LcError::InvalidValueError(
            "nugget should be finite and positive or zero".to_string(),
        ));
    }
    let mut mat = cov.to_owned();
    Zip::from(mat.diag_mut())
        .and(nugget)
        .for_each(|d, &n| *d += n);
    Ok(mat)
}

impl<F: Float> CholeskyFactor<F> {
    /// Strict Cholesky decomposition of `cov + diag(nugget)`.
    ///
    /// Fails with [`LcError::NotPositiveDefiniteError`] when the matrix
    /// is not numerically positive definite.
    pub fn full(
        cov: &ArrayBase<impl Data<Elem = F>, Ix2>,
        nugget: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Self> {
        let mat = add_nugget(cov, nugget)?;
        let lower = mat
            .cholesky()
            .map_err(|err| not_positive_definite(err, "strict cholesky failed"))?;
        if lower.iter().any(|v| !v.is_finite()) {
            return Err(LcError::NotPositiveDefiniteError(
                "strict cholesky produced non finite values".to_string(),
            ));
        }
        let mut factor = lower.reversed_axes();
        for (i, mut row) in factor.rows_mut().into_iter().enumerate() {
            row.slice_mut(s![..i]).fill(F::zero());
        }
        Ok(CholeskyFactor {
            factor,
            pivots: None,
        })
    }

    /// Pivoted incomplete Cholesky decomposition of `cov + diag(nugget)`.
    ///
    /// At each step the largest remaining diagonal element is eliminated.
    /// Elimination stops when it falls below `rel_tol * max(diag)`, the
    /// remaining points are then linear combinations of the retained ones.
    pub fn pivoted(
        cov: &ArrayBase<impl Data<Elem = F>, Ix2>,
        nugget: &ArrayBase<impl Data<Elem = F>, Ix1>,
        rel_tol: F,
    ) -> Result<Self> {
        let mat = add_nugget(cov, nugget)?;
        let n = mat.nrows();
        let mut diag = mat.diag().to_owned();
        if diag.iter().any(|d| d.is_nan() || *d < F::zero()) {
            return Err(LcError::NotPositiveDefiniteError(
                "negative or NaN diagonal element".to_string(),
            ));
        }
        let max_diag = diag.iter().fold(F::zero(), |acc, &d| acc.max(d));
        let threshold = rel_tol * max_diag;

        let mut factor = Array2::<F>::zeros((n, n));
        let mut pivots = Vec::with_capacity(n);
        let mut selected = vec![false; n];
        for k in 0..n {
            let (pivot, dmax) = diag
                .iter()
                .enumerate()
                .filter(|(i, _)| !selected[*i])
                .fold((n, F::neg_infinity()), |best, (i, &d)| {
                    if d > best.1 {
                        (i, d)
                    } else {
                        best
                    }
                });
            if pivot == n || dmax <= threshold || !dmax.is_finite() {
                break;
            }
            selected[pivot] = true;
            pivots.push(pivot);
            let ukk = dmax.sqrt();
            factor[[k, pivot]] = ukk;
            for i in (0..n).filter(|i| !selected[*i]) {
                let mut v = mat[[pivot, i]];
                for l in 0..k {
                    v -= factor[[l, pivot]] * factor[[l, i]];
                }
                let uki = v / ukk;
                factor[[k, i]] = uki;
                diag[i] -= uki * uki;
            }
        }
        let rank = pivots.len();
        Ok(CholeskyFactor {
            factor: factor.slice_move(s![..rank, ..]),
            pivots: Some(pivots),
        })
    }

    /// Number of points
    pub fn size(&self) -> usize {
        self.factor.ncols()
    }

    /// Number of retained points, equals size() for a full factor
    pub fn rank(&self) -> usize {
        self.factor.nrows()
    }

    /// Retained points in pivot order, `None` for a full factor
    pub fn pivots(&self) -> Option<&[usize]> {
        self.pivots.as_deref()
    }

    /// (r, n) factor `U`
    pub fn factor(&self) -> &Array2<F> {
        &self.factor
    }

    /// `U^T U`, the factored matrix up to rounding (and up to the dropped
    /// residual for a pivoted factor)
    pub fn reconstruct(&self) -> Array2<F> {
        self.factor.t().dot(&self.factor)
    }

    /// Upper triangular (r, r) matrix, columns in pivot order
    fn triangular(&self) -> CowArray<'_, F, Ix2> {
        match &self.pivots {
            None => self.factor.view().into(),
            Some(p) => self.factor.select(Axis(1), p).into(),
        }
    }

    fn retained<'a>(
        &self,
        b: &'a ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<CowArray<'a, F, Ix2>> {
        if b.nrows() != self.size() {
            return Err(LcError::InvalidValueError(format!(
                "right hand side has {} rows, expected {}",
                b.nrows(),
                self.size()
            )));
        }
        Ok(match &self.pivots {
            None => b.view().into(),
            Some(p) => b.select(Axis(0), p).into(),
        })
    }

    /// `R^-T B`, restricted to retained rows of `B` for a pivoted factor.
    ///
    /// `B^T (U^T U)^-1 B = whiten(B)^T whiten(B)`.
    pub fn whiten(&self, b: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        let rhs = self.retained(b)?;
        if self.rank() == 0 {
            return Ok(Array2::zeros((0, b.ncols())));
        }
        let tri = self.triangular();
        Ok(tri.t().solve_triangular(&rhs, UPLO::Lower)?)
    }

    /// Solve `U^T U X = B`, components of dropped points are zero
    pub fn solve(&self, b: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        let y = self.whiten(b)?;
        if self.rank() == 0 {
            return Ok(Array2::zeros(b.raw_dim()));
        }
        let x = self.triangular().solve_triangular_into(y, UPLO::Upper)?;
        Ok(match &self.pivots {
            None => x,
            Some(p) => {
                let mut full = Array2::zeros(b.raw_dim());
                for (k, &i) in p.iter().enumerate() {
                    full.row_mut(i).assign(&x.row(k));
                }
                full
            }
        })
    }

    /// Solve `U^T U x = b`
    pub fn solve_vec(&self, b: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array1<F>> {
        let x = self.solve(&b.view().insert_axis(Axis(1)))?;
        Ok(x.column(0).to_owned())
    }

    /// `U^T Z` where `Z` is (r, m): maps standard normal draws to
    /// correlated draws with covariance `U^T U`
    pub fn sample(&self, z: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        self.factor.t().dot(z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariance::covariance_matrix;
    use crate::covariance_models::{CovParams, StationaryCov};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};

    fn drw_matrix(n: usize) -> Array2<f64> {
        let kernel = StationaryCov::from_name("drw", &CovParams::new(0.3, 15.)).unwrap();
        let t = Array::linspace(0., 100., n);
        covariance_matrix(&kernel, &t, &Array1::<usize>::zeros(n)).unwrap()
    }

    #[test]
    fn test_full_factor() {
        let cov = drw_matrix(20);
        let nugget = Array1::from_elem(20, 1e-3);
        let chol = CholeskyFactor::full(&cov, &nugget).unwrap();
        assert_eq!(chol.rank(), 20);
        assert!(chol.pivots().is_none());
        let mut expected = cov.clone();
        expected.diag_mut().mapv_inplace(|d| d + 1e-3);
        assert_abs_diff_eq!(chol.reconstruct(), expected, epsilon = 1e-12);
        // upper triangular
        for i in 0..20 {
            for j in 0..i {
                assert_eq!(chol.factor()[[i, j]], 0.);
            }
        }

        let b = Array::linspace(-1., 1., 20);
        let x = chol.solve_vec(&b).unwrap();
        assert_abs_diff_eq!(expected.dot(&x), b, epsilon = 1e-9);

        let w = chol.whiten(&b.clone().insert_axis(Axis(1))).unwrap();
        assert_abs_diff_eq!(w.column(0).dot(&w.column(0)), b.dot(&x), epsilon = 1e-9);
    }

    #[test]
    fn test_not_positive_definite() {
        let cov = array![[1., 2.], [2., 1.]];
        let err = CholeskyFactor::full(&cov, &Array1::zeros(2)).unwrap_err();
        assert!(matches!(err, LcError::NotPositiveDefiniteError(_)));
        assert!(err.is_numerical_failure());

        let err = CholeskyFactor::pivoted(&array![[-1.]], &array![0.], 1e-10).unwrap_err();
        assert!(matches!(err, LcError::NotPositiveDefiniteError(_)));

        let err = CholeskyFactor::full(&cov, &array![-1., 0.]).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_duplicated_points() {
        // duplicated epochs without nugget, pivoted drops the copies
        let kernel = StationaryCov::from_name("drw", &CovParams::new(1., 10.)).unwrap();
        let t = array![0., 5., 5., 20., 0.];
        let cov = covariance_matrix(&kernel, &t, &Array1::<usize>::zeros(5)).unwrap();
        assert!(CholeskyFactor::full(&array![[1., 1.], [1., 1.]], &Array1::zeros(2)).is_err());

        let chol = CholeskyFactor::pivoted(&cov, &Array1::zeros(5), 1e-10).unwrap();
        assert_eq!(chol.rank(), 3);
        assert_abs_diff_eq!(chol.reconstruct(), cov, epsilon = 1e-10);
        let pivots = chol.pivots().unwrap();
        assert!(pivots.contains(&3));
        // pivot order columns are upper triangular
        let tri = chol.factor().select(Axis(1), pivots);
        assert_abs_diff_eq!(tri[[1, 0]], 0.);
        assert_abs_diff_eq!(tri[[2, 0]], 0.);
        assert_abs_diff_eq!(tri[[2, 1]], 0.);

        // consistent right hand side is solved exactly
        let y = cov.dot(&array![1., -2., 0., 0.5, 0.]);
        let x = chol.solve_vec(&y).unwrap();
        assert_abs_diff_eq!(cov.dot(&x), y, epsilon = 1e-9);
    }

    #[test]
    fn test_rank_one() {
        let e = array![0.1, 0.2, 0.3];
        let cov = e.clone().insert_axis(Axis(1)).dot(&e.clone().insert_axis(Axis(0)));
        let chol = CholeskyFactor::pivoted(&cov, &Array1::zeros(3), 1e-10).unwrap();
        assert_eq!(chol.rank(), 1);
        assert_abs_diff_eq!(chol.reconstruct(), cov, epsilon = 1e-14);

        let zero = CholeskyFactor::pivoted(&Array2::<f64>::zeros((3, 3)), &Array1::zeros(3), 1e-10)
            .unwrap();
        assert_eq!(zero.rank(), 0);
        assert_abs_diff_eq!(zero.solve_vec(&e).unwrap(), Array1::<f64>::zeros(3));
        assert_eq!(zero.sample(&Array2::zeros((0, 4))).dim(), (3, 4));
    }

    #[test]
    fn test_pivoted_matches_full() {
        let cov = drw_matrix(15);
        let nugget = Array1::from_elem(15, 1e-2);
        let full = CholeskyFactor::full(&cov, &nugget).unwrap();
        let piv = CholeskyFactor::pivoted(&cov, &nugget, 1e-12).unwrap();
        assert_eq!(piv.rank(), 15);
        let b = Array::linspace(0., 3., 15).insert_axis(Axis(1));
        assert_abs_diff_eq!(full.solve(&b).unwrap(), piv.solve(&b).unwrap(), epsilon = 1e-8);
    }
}
