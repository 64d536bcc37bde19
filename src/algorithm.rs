//! Gaussian process state shared by the single and multi channel predictors.
//!
//! A state is a mean model, a covariance model and, once observations are
//! given, the cached conditioning: observed points, the Cholesky factor of
//! their covariance plus nugget and the residual `(C + N)^-1 (y - m)`.
//! Every query reuses the cached factor.

use crate::cholesky::CholeskyFactor;
use crate::covariance::{covariance_matrix, cross_covariance, prior_variance};
use crate::covariance_models::CovarianceModel;
use crate::errors::{LcError, Result};
use crate::mean_models::MeanModel;
use crate::parameters::Rank;
use crate::sampling;

use linfa::Float;
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1};
use ndarray_rand::rand::Rng;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Observations the process is conditioned on
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub(crate) struct Conditioning<F: Float> {
    epochs: Array1<F>,
    channels: Array1<usize>,
    factor: CholeskyFactor<F>,
    residual: Array1<F>,
}

/// Mean, covariance and optional conditioning of a gaussian process
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub(crate) struct GpState<F: Float, Mean: MeanModel<F>, Cov: CovarianceModel<F>> {
    mean: Mean,
    cov: Cov,
    rank: Rank,
    conditioning: Option<Conditioning<F>>,
}

impl<F: Float, Mean: MeanModel<F>, Cov: CovarianceModel<F>> GpState<F, Mean, Cov> {
    /// Prior process
    pub fn unconditioned(mean: Mean, cov: Cov, rank: Rank) -> Self {
        GpState {
            mean,
            cov,
            rank,
            conditioning: None,
        }
    }

    /// Process conditioned on `values` observed at (`epochs`, `channels`)
    /// with observation `variances`.
    ///
    /// `pivot_tolerance` is only used by the [`Rank::NearlyFull`] decomposition.
    ///
    /// Points are sorted by channel then epoch before the covariance is assembled.
    #[allow(clippy::too_many_arguments)]
    pub fn observe(
        mean: Mean,
        cov: Cov,
        rank: Rank,
        pivot_tolerance: F,
        epochs: &ArrayBase<impl Data<Elem = F>, Ix1>,
        channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
        values: &ArrayBase<impl Data<Elem = F>, Ix1>,
        variances: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<Self> {
        let n = epochs.len();
        if n == 0 || channels.len() != n || values.len() != n || variances.len() != n {
            return Err(LcError::InvalidValueError(format!(
                "observations should be non empty arrays of equal length, got epochs: {n}, channels: {}, values: {}, variances: {}",
                channels.len(),
                values.len(),
                variances.len()
            )));
        }
        let mut idx: Vec<usize> = (0..n).collect();
        idx.sort_by(|&a, &b| {
            channels[a].cmp(&channels[b]).then(
                epochs[a]
                    .partial_cmp(&epochs[b])
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        let epochs = epochs.select(Axis(0), &idx);
        let channels = channels.select(Axis(0), &idx);
        let values = values.select(Axis(0), &idx);
        let variances = variances.select(Axis(0), &idx);

        let now = Instant::now();
        let c = covariance_matrix(&cov, &epochs, &channels)?;
        debug!(
            "covariance matrix ({n}x{n}) calculated in {:?}ms",
            now.elapsed().as_millis()
        );

        let now = Instant::now();
        let factor = match rank {
            Rank::Full => CholeskyFactor::full(&c, &variances)?,
            Rank::NearlyFull => CholeskyFactor::pivoted(&c, &variances, pivot_tolerance)?,
        };
        debug!(
            "covariance matrix decomposed (rank {}/{n}) in {:?}ms",
            factor.rank(),
            now.elapsed().as_millis()
        );

        let residual = factor.solve_vec(&(&values - &mean.value(&epochs, &channels)))?;
        Ok(GpState {
            mean,
            cov,
            rank,
            conditioning: Some(Conditioning {
                epochs,
                channels,
                factor,
                residual,
            }),
        })
    }

    pub fn mean(&self) -> &Mean {
        &self.mean
    }

    pub fn cov(&self) -> &Cov {
        &self.cov
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn is_conditioned(&self) -> bool {
        self.conditioning.is_some()
    }

    /// Number of observed points, zero for the prior process
    pub fn n_observations(&self) -> usize {
        self.conditioning
            .as_ref()
            .map(|c| c.epochs.len())
            .unwrap_or(0)
    }

    /// Conditional mean at query points and the whitened cross covariance
    /// `R^-T K(obs, query)` (none for the prior process)
    fn conditional_terms(
        &self,
        epochs: &ArrayBase<impl Data<Elem = F>, Ix1>,
        channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
    ) -> Result<(Array1<F>, Option<Array2<F>>)> {
        let prior_mean = self.mean.value(epochs, channels);
        match &self.conditioning {
            None => Ok((prior_mean, None)),
            Some(cond) => {
                let k = cross_covariance(&self.cov, &cond.epochs, &cond.channels, epochs, channels)?;
                let mean = prior_mean + k.t().dot(&cond.residual);
                let w = cond.factor.whiten(&k)?;
                Ok((mean, Some(w)))
            }
        }
    }

    /// Point-wise conditional mean and variance at query points
    pub fn predict_valvar(
        &self,
        epochs: &ArrayBase<impl Data<Elem = F>, Ix1>,
        channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        let prior = prior_variance(&self.cov, epochs, channels)?;
        let (mean, w) = self.conditional_terms(epochs, channels)?;
        let var = match w {
            None => prior,
            Some(w) => {
                let reduction = (&w * &w).sum_axis(Axis(0));
                // rounding may yield small negative values
                (prior - reduction).mapv(|v| v.max(F::zero()))
            }
        };
        Ok((mean, var))
    }

    /// Conditional mean and covariance matrix at query points
    pub fn predict_mean_cov(
        &self,
        epochs: &ArrayBase<impl Data<Elem = F>, Ix1>,
        channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
    ) -> Result<(Array1<F>, Array2<F>)> {
        let prior = covariance_matrix(&self.cov, epochs, channels)?;
        let (mean, w) = self.conditional_terms(epochs, channels)?;
        let cov = match w {
            None => prior,
            Some(w) => {
                let cov = prior - w.t().dot(&w);
                (&cov + &cov.t()) * F::cast(0.5)
            }
        };
        Ok((mean, cov))
    }

    /// Draw `n` realizations (one per column) of the process at query points
    pub fn sample<R: Rng + ?Sized>(
        &self,
        epochs: &ArrayBase<impl Data<Elem = F>, Ix1>,
        channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
        n: usize,
        rng: &mut R,
    ) -> Result<Array2<F>> {
        let (mean, cov) = self.predict_mean_cov(epochs, channels)?;
        let now = Instant::now();
        let draws = sampling::sample(&mean, &cov, n, self.rank, rng)?;
        debug!(
            "{n} realization(s) at {} points drawn in {:?}ms",
            epochs.len(),
            now.elapsed().as_millis()
        );
        Ok(draws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariance_models::{CovParams, StationaryCov};
    use crate::mean_models::ConstantMean;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn drw() -> StationaryCov<f64> {
        StationaryCov::from_name("drw", &CovParams::new(1., 10.)).unwrap()
    }

    #[test]
    fn test_unconditioned_state() {
        let gp = GpState::unconditioned(ConstantMean::new(3.).unwrap(), drw(), Rank::Full);
        assert!(!gp.is_conditioned());
        let t = array![0., 1., 50.];
        let (m, v) = gp.predict_valvar(&t, &Array1::<usize>::zeros(3)).unwrap();
        assert_abs_diff_eq!(m, array![3., 3., 3.]);
        assert_abs_diff_eq!(v, array![1., 1., 1.]);
    }

    #[test]
    fn test_conditioned_state_recovers_observations() {
        let t = array![30., 0., 10.];
        let y = array![0.5, -0.2, 0.1];
        for rank in [Rank::Full, Rank::NearlyFull] {
            let gp = GpState::observe(
                ConstantMean::default(),
                drw(),
                rank,
                1e-12,
                &t,
                &Array1::<usize>::zeros(3),
                &y,
                &Array1::from_elem(3, 1e-10),
            )
            .unwrap();
            assert_eq!(gp.n_observations(), 3);
            let (m, v) = gp.predict_valvar(&t, &Array1::<usize>::zeros(3)).unwrap();
            assert_abs_diff_eq!(m, y, epsilon = 1e-6);
            assert_abs_diff_eq!(v, Array1::<f64>::zeros(3), epsilon = 1e-6);
            // far away the prior is recovered
            let (m, v) = gp.predict_valvar(&array![1000.], &array![0]).unwrap();
            assert_abs_diff_eq!(m[0], 0., epsilon = 1e-10);
            assert_abs_diff_eq!(v[0], 1., epsilon = 1e-10);
        }
    }

    #[test]
    fn test_covariance_consistent_with_variance() {
        let gp = GpState::observe(
            ConstantMean::default(),
            drw(),
            Rank::Full,
            1e-10,
            &array![0., 20.],
            &array![0, 0],
            &array![1., 2.],
            &array![0.01, 0.04],
        )
        .unwrap();
        let q = Array::linspace(-5., 25., 7);
        let qc = Array1::<usize>::zeros(7);
        let (m1, v) = gp.predict_valvar(&q, &qc).unwrap();
        let (m2, c) = gp.predict_mean_cov(&q, &qc).unwrap();
        assert_abs_diff_eq!(m1, m2, epsilon = 1e-12);
        assert_abs_diff_eq!(c.diag(), v, epsilon = 1e-12);
        assert_eq!(c, c.t());
    }

    #[test]
    fn test_sample_covariance_converges() {
        let gp = GpState::observe(
            ConstantMean::default(),
            drw(),
            Rank::Full,
            1e-10,
            &array![0., 20.],
            &array![0, 0],
            &array![1., 2.],
            &array![0.01, 0.04],
        )
        .unwrap();
        let q = array![5., 10., 30.];
        let qc = Array1::<usize>::zeros(3);
        let (mean, cov) = gp.predict_mean_cov(&q, &qc).unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let draws = gp.sample(&q, &qc, 50000, &mut rng).unwrap();
        let sample_mean = draws.mean_axis(Axis(1)).unwrap();
        assert_abs_diff_eq!(sample_mean, mean, epsilon = 2e-2);
        let centered = &draws - &sample_mean.insert_axis(Axis(1));
        let sample_cov = centered.dot(&centered.t()) / 50000.;
        assert_abs_diff_eq!(sample_cov, cov, epsilon = 2e-2);
    }
}
