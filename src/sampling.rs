//! Correlated gaussian draws: process realizations and measurement noise.

use crate::cholesky::{CholeskyFactor, DEFAULT_PIVOT_TOLERANCE};
use crate::errors::{LcError, Result};
use crate::parameters::Rank;
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use ndarray_stats::QuantileExt;

/// Measurement errors at query points
#[derive(Clone, Debug, PartialEq)]
pub enum QueryErrors<F: Float> {
    /// Same error everywhere
    Scalar(F),
    /// One error per query point
    PerPoint(Array1<F>),
}

impl<F: Float> Default for QueryErrors<F> {
    fn default() -> Self {
        QueryErrors::Scalar(F::zero())
    }
}

impl<F: Float> From<F> for QueryErrors<F> {
    fn from(e: F) -> Self {
        QueryErrors::Scalar(e)
    }
}

impl<F: Float> From<Array1<F>> for QueryErrors<F> {
    fn from(e: Array1<F>) -> Self {
        QueryErrors::PerPoint(e)
    }
}

impl<F: Float> QueryErrors<F> {
    /// One error per point for `n` query points.
    ///
    /// Errors must be finite and positive or zero and, when given per point,
    /// match the number of query points.
    pub fn resolve(&self, n: usize) -> Result<Array1<F>> {
        let errors = match self {
            QueryErrors::Scalar(e) => Array1::from_elem(n, *e),
            QueryErrors::PerPoint(e) => {
                if e.len() != n {
                    return Err(LcError::InvalidValueError(format!(
                        "query errors should be a scalar or an array of length {n}, got length {}",
                        e.len()
                    )));
                }
                e.to_owned()
            }
        };
        if errors.iter().any(|e| !(e.is_finite() && *e >= F::zero())) {
            return Err(LcError::InvalidValueError(
                "query errors should be either 0 or positive".to_string(),
            ));
        }
        Ok(errors)
    }
}

/// Error correlation matrix: `e_i^2` on the diagonal, `rho * e_i * e_j` elsewhere.
///
/// `rho` must lie in `[-1/(m-1), 1]` for the matrix to be positive semi-definite.
pub fn error_covariance<F: Float>(
    errors: &ArrayBase<impl Data<Elem = F>, Ix1>,
    rho: F,
) -> Result<Array2<F>> {
    let m = errors.len();
    let lower = if m > 1 {
        -F::one() / F::cast(m - 1)
    } else {
        -F::one()
    };
    if !(rho >= lower && rho <= F::one()) {
        return Err(LcError::InvalidValueError(format!(
            "error correlation should be in [{lower}, 1], got {rho}"
        )));
    }
    let col = errors.view().insert_axis(Axis(1));
    let mut cov = col.dot(&col.t()) * rho;
    cov.diag_mut().assign(&errors.mapv(|e| e * e));
    Ok(cov)
}

/// Draw `n` zero mean noise vectors (one per column) from the
/// error correlation matrix, nothing is drawn when all errors are zero
pub fn sample_noise<F: Float, R: Rng + ?Sized>(
    errors: &ArrayBase<impl Data<Elem = F>, Ix1>,
    rho: F,
    n: usize,
    rng: &mut R,
) -> Result<Array2<F>> {
    let ecov = error_covariance(errors, rho)?;
    if errors.iter().all(|e| *e == F::zero()) {
        return Ok(Array2::zeros((errors.len(), n)));
    }
    let chol = CholeskyFactor::pivoted(
        &ecov,
        &Array1::zeros(errors.len()),
        F::cast(DEFAULT_PIVOT_TOLERANCE),
    )?;
    Ok(chol.sample(&standard_normal((chol.rank(), n), rng)))
}

/// Draw `n` vectors (one per column) from `N(mean, cov)`.
///
/// [`Rank::Full`] factors `cov` with a strict Cholesky decomposition after adding
/// a tiny relative jitter to the diagonal, [`Rank::NearlyFull`] uses a pivoted
/// decomposition which handles singular covariances.
pub fn sample<F: Float, R: Rng + ?Sized>(
    mean: &ArrayBase<impl Data<Elem = F>, Ix1>,
    cov: &ArrayBase<impl Data<Elem = F>, Ix2>,
    n: usize,
    rank: Rank,
    rng: &mut R,
) -> Result<Array2<F>> {
    let m = mean.len();
    if cov.dim() != (m, m) {
        return Err(LcError::InvalidValueError(format!(
            "covariance shape {:?} does not match mean length {m}",
            cov.dim()
        )));
    }
    if m == 0 {
        return Ok(Array2::zeros((0, n)));
    }
    let chol = match rank {
        Rank::Full => {
            let max_diag = *cov.diag().max().map_err(|_| {
                LcError::NotPositiveDefiniteError("NaN in covariance diagonal".to_string())
            })?;
            let jitter = F::cast(100.) * F::epsilon() * max_diag.max(F::zero());
            CholeskyFactor::full(cov, &Array1::from_elem(m, jitter))?
        }
        Rank::NearlyFull => CholeskyFactor::pivoted(
            cov,
            &Array1::zeros(m),
            F::cast(DEFAULT_PIVOT_TOLERANCE),
        )?,
    };
    let draws = chol.sample(&standard_normal((chol.rank(), n), rng));
    Ok(draws + &mean.view().insert_axis(Axis(1)))
}

fn standard_normal<F: Float, R: Rng + ?Sized>(shape: (usize, usize), rng: &mut R) -> Array2<F> {
    Array2::<f64>::random_using(shape, StandardNormal, rng).mapv(|v| F::cast(v))
}
