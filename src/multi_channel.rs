//! Multi channel predictor: a driving light curve and its time-lagged echoes
//! modelled jointly with the [`SpearCov`] covariance.

use crate::algorithm::GpState;
use crate::covariance_models::CovarianceModel;
use crate::errors::{LcError, Result};
use crate::light_curve::{LightCurve, LightCurves};
use crate::mean_models::ChannelMeans;
use crate::parameters::{MultiChannelParams, MultiChannelValidParams};
use crate::sampling::sample_noise;
use crate::spear::SpearCov;

use linfa::{Float, ParamGuard};
use log::{info, warn};
use ndarray::{concatenate, s, Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix1};
use ndarray_rand::rand::Rng;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// A mock light curve request, request `i` of a batch is channel `i`
#[derive(Clone, Debug, PartialEq)]
pub enum CurveRequest<F: Float> {
    /// Mock of an observed light curve at its epochs with its errors,
    /// centered on the channel true mean
    Observed(LightCurve<F>),
    /// Mock light curve at given epochs with given errors.
    ///
    /// `mean` holds the intended mean of the mock curve, repeated for each epoch.
    Mock {
        /// Epochs of the mock curve
        epochs: Array1<F>,
        /// Intended mean, one value per epoch
        mean: Array1<F>,
        /// Measurement errors, one value per epoch
        errors: Array1<F>,
    },
}

/// A generated light curve
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct MockCurve<F: Float> {
    /// Epochs in ascending order
    pub epochs: Array1<F>,
    /// Realization of the process plus measurement noise
    pub values: Array1<F>,
    /// Measurement errors the noise was drawn with
    pub errors: Array1<F>,
}

/// Sorted epochs, errors and optional mean override of one request
struct PreparedCurve<F: Float> {
    epochs: Array1<F>,
    errors: Array1<F>,
    mean: Option<F>,
}

impl<F: Float> CurveRequest<F> {
    fn prepare(&self, index: usize) -> Result<PreparedCurve<F>> {
        match self {
            CurveRequest::Observed(lc) => {
                let lc = lc.sorted();
                Ok(PreparedCurve {
                    epochs: lc.epochs().to_owned(),
                    errors: lc.errors().to_owned(),
                    mean: None,
                })
            }
            CurveRequest::Mock {
                epochs,
                mean,
                errors,
            } => {
                // same checks as an observed light curve, the mean standing for values
                let lc = LightCurve::new(epochs.to_owned(), mean.to_owned(), errors.to_owned())?
                    .sorted();
                let first = lc.values()[0];
                let mean = if lc.values().iter().all(|m| *m == first) {
                    first
                } else {
                    warn!(
                        "Mock light curve {index} has unequal mean values, \
                         they should be filled with the desired mean of the mock light curve: \
                         reset to zero"
                    );
                    F::zero()
                };
                Ok(PreparedCurve {
                    epochs: lc.epochs().to_owned(),
                    errors: lc.errors().to_owned(),
                    mean: Some(mean),
                })
            }
        }
    }
}

/// Joint predictor of several light curves: the driver (channel 0) and
/// its echoes (channels 1..), conditioned on a joint dataset.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct MultiChannelPredictor<F: Float> {
    state: GpState<F, ChannelMeans<F>, SpearCov<F>>,
}

impl<F: Float> MultiChannelPredictor<F> {
    /// Multi channel predictor parameters given the SPEAR covariance
    pub fn params(kernel: SpearCov<F>) -> MultiChannelParams<F> {
        MultiChannelParams::new(kernel)
    }

    /// Number of channels
    pub fn n_channels(&self) -> usize {
        self.state.cov().n_channels()
    }

    /// Kernel of the joint process
    pub fn kernel(&self) -> &SpearCov<F> {
        self.state.cov()
    }

    /// Conditional mean and variance at (`epochs`, `channels`) points
    pub fn predict(
        &self,
        epochs: &ArrayBase<impl Data<Elem = F>, Ix1>,
        channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        self.state.predict_valvar(epochs, channels)
    }

    /// Conditional covariance matrix at (`epochs`, `channels`) points
    pub fn predict_cov(
        &self,
        epochs: &ArrayBase<impl Data<Elem = F>, Ix1>,
        channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
    ) -> Result<Array2<F>> {
        let (_, cov) = self.state.predict_mean_cov(epochs, channels)?;
        Ok(cov)
    }

    /// Generate one mock light curve per request.
    ///
    /// A joint realization of the conditioned process is drawn at all
    /// requested points, then each curve gets its own measurement noise with
    /// errors correlated by `errcov`. Mock requests are shifted to their
    /// requested mean.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        requests: &[CurveRequest<F>],
        errcov: F,
        rng: &mut R,
    ) -> Result<Vec<MockCurve<F>>> {
        if requests.len() > self.n_channels() {
            return Err(LcError::InvalidValueError(format!(
                "{} curves requested, covariance handles {} channel(s)",
                requests.len(),
                self.n_channels()
            )));
        }
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let curves = requests
            .iter()
            .enumerate()
            .map(|(i, req)| req.prepare(i))
            .collect::<Result<Vec<_>>>()?;

        let noises = curves
            .iter()
            .map(|curve| sample_noise(&curve.errors, errcov, 1, rng))
            .collect::<Result<Vec<_>>>()?;

        let epochs = concatenate(
            Axis(0),
            &curves.iter().map(|c| c.epochs.view()).collect::<Vec<_>>(),
        )
        .map_err(|e| LcError::InvalidValueError(e.to_string()))?;
        let channels: Array1<usize> = curves
            .iter()
            .enumerate()
            .flat_map(|(i, c)| std::iter::repeat(i).take(c.epochs.len()))
            .collect();
        let draw = self.state.sample(&epochs, &channels, 1, rng)?;
        let draw = draw.column(0);

        let mut start = 0;
        let mocks = curves
            .into_iter()
            .zip(noises)
            .enumerate()
            .map(|(i, (curve, noise))| {
                let n = curve.epochs.len();
                let sample: ArrayView1<F> = draw.slice(s![start..start + n]);
                start += n;
                let values = match curve.mean {
                    Some(mean) => sample.mapv(|v| v - self.state.mean().get(i) + mean),
                    None => sample.to_owned(),
                } + noise.column(0);
                MockCurve {
                    epochs: curve.epochs,
                    values,
                    errors: curve.errors,
                }
            })
            .collect();
        Ok(mocks)
    }
}

impl<F: Float> fmt::Display for MultiChannelPredictor<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "MultiChannelPredictor(kernel={}, means={}, rank={}, observations={})",
            self.state.cov(),
            self.state.mean(),
            self.state.rank(),
            self.state.n_observations()
        )
    }
}

impl<F: Float> MultiChannelValidParams<F> {
    /// Predictor conditioned on jointly observed light curves, curve `i` being channel `i`
    pub fn fit(&self, data: &LightCurves<F>) -> Result<MultiChannelPredictor<F>> {
        let kernel = self.kernel().clone();
        if data.n_curves() > kernel.n_channels() {
            return Err(LcError::InvalidValueError(format!(
                "{} light curves given, covariance handles {} channel(s)",
                data.n_curves(),
                kernel.n_channels()
            )));
        }
        let (epochs, values, variances, channels) = data.flatten();
        info!(
            "Constrained realization of {} light curves with {} observations",
            data.n_curves(),
            epochs.len()
        );
        let mut means = data.means().to_vec();
        means.resize(kernel.n_channels(), F::zero());
        let state = GpState::observe(
            ChannelMeans::new(means)?,
            kernel,
            self.rank(),
            self.pivot_tolerance(),
            &epochs,
            &channels,
            &values,
            &variances,
        )?;
        Ok(MultiChannelPredictor { state })
    }
}

impl<F: Float> MultiChannelParams<F> {
    /// Check parameters and build a predictor conditioned on `data`
    pub fn fit(&self, data: &LightCurves<F>) -> Result<MultiChannelPredictor<F>> {
        self.check_ref()?.fit(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::Rank;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn spear() -> SpearCov<f64> {
        SpearCov::new(1., 50.).unwrap().echo(20., 4., 0.5).unwrap()
    }

    fn joint_data() -> LightCurves<f64> {
        let driver = LightCurve::new(
            Array::linspace(0., 200., 41),
            Array::linspace(0., 200., 41).mapv(|t: f64| 10. + (t / 30.).sin()),
            Array1::from_elem(41, 0.05),
        )
        .unwrap();
        let echo = LightCurve::new(
            array![150., 40., 100.],
            array![11.54, 12.31, 12.23],
            array![0.05, 0.05, 0.05],
        )
        .unwrap();
        LightCurves::new(vec![driver, echo])
            .unwrap()
            .with_means(vec![10., 12.])
            .unwrap()
    }

    #[test]
    fn test_multi_channel_predict() {
        let predictor = MultiChannelPredictor::params(spear())
            .fit(&joint_data())
            .unwrap();
        assert_eq!(predictor.n_channels(), 2);
        let (mean, var) = predictor
            .predict(&array![50., 40., 3000.], &array![0, 1, 1])
            .unwrap();
        // observed points are recovered within errors
        assert_abs_diff_eq!(mean[0], 10. + (50f64 / 30.).sin(), epsilon = 0.1);
        assert_abs_diff_eq!(mean[1], 12.31, epsilon = 0.05);
        assert!(var[0] < 0.0025 && var[1] < 0.0025);
        // echo far from any observation falls back to its true mean and prior variance
        assert_abs_diff_eq!(mean[2], 12., epsilon = 1e-6);
        assert_abs_diff_eq!(var[2], predictor.kernel().variance(1), epsilon = 1e-6);

        let cov = predictor
            .predict_cov(&array![50., 40., 3000.], &array![0, 1, 1])
            .unwrap();
        assert_abs_diff_eq!(cov.diag(), var, epsilon = 1e-10);
    }

    #[test]
    fn test_too_many_curves() {
        let data = joint_data();
        let kernel = SpearCov::new(1., 50.).unwrap();
        let err = MultiChannelPredictor::params(kernel).fit(&data).unwrap_err();
        assert!(err.is_config_error());
        let predictor = MultiChannelPredictor::params(spear()).fit(&data).unwrap();
        assert!(predictor.predict(&array![1.], &array![2]).is_err());
    }

    #[test]
    fn test_multi_channel_generate() {
        let predictor = MultiChannelPredictor::params(spear())
            .rank(Rank::NearlyFull)
            .fit(&joint_data())
            .unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let requests = vec![
            CurveRequest::Observed(joint_data().curves()[0].clone()),
            CurveRequest::Mock {
                epochs: array![300., 250., 260.],
                mean: array![5., 5., 5.],
                errors: array![0.1, 0.1, 0.1],
            },
        ];
        let mocks = predictor.generate(&requests, 0., &mut rng).unwrap();
        assert_eq!(mocks.len(), 2);
        assert_eq!(mocks[0].epochs.len(), 41);
        // mock epochs are sorted and values centered on the requested mean
        assert_eq!(mocks[1].epochs, array![250., 260., 300.]);
        assert!(mocks[1].values.iter().all(|v| (v - 5.).abs() < 3.));

        // non uniform means are reset to zero
        let requests = vec![CurveRequest::Mock {
            epochs: array![500., 510.],
            mean: array![5., 6.],
            errors: array![0., 0.],
        }];
        let mut mean = 0.;
        for _ in 0..500 {
            let mocks = predictor.generate(&requests, 0., &mut rng).unwrap();
            mean += mocks[0].values[0] / 500.;
        }
        assert_abs_diff_eq!(mean, 0., epsilon = 0.2);
    }

    #[test]
    fn test_multi_channel_generate_statistics() {
        let predictor = MultiChannelPredictor::params(spear())
            .fit(&joint_data())
            .unwrap();
        let requests = vec![
            CurveRequest::Observed(
                LightCurve::new(array![60., 250.], array![0., 0.], array![0.05, 0.05]).unwrap(),
            ),
            CurveRequest::Mock {
                epochs: array![270.],
                mean: array![5.],
                errors: array![0.1],
            },
        ];
        let epochs = array![60., 250., 270.];
        let channels = array![0, 0, 1];
        let (mean, _) = predictor.predict(&epochs, &channels).unwrap();
        let cov = predictor.predict_cov(&epochs, &channels).unwrap();
        assert!(cov[[1, 2]] > 0.1);

        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let n = 4000;
        let mut draws = Array2::<f64>::zeros((n, 3));
        for mut row in draws.rows_mut() {
            let mocks = predictor.generate(&requests, 0., &mut rng).unwrap();
            let values = [mocks[0].values.view(), mocks[1].values.view()];
            row.assign(&concatenate(Axis(0), &values).unwrap());
        }
        let sample_mean = draws.mean_axis(Axis(0)).unwrap();
        // observed requests stay on the channel mean, mock requests move to the given one
        assert_abs_diff_eq!(sample_mean[0], mean[0], epsilon = 0.03);
        assert_abs_diff_eq!(sample_mean[1], mean[1], epsilon = 0.06);
        assert_abs_diff_eq!(sample_mean[2], mean[2] - 12. + 5., epsilon = 0.06);

        // driver and echo come from one joint draw, noise only adds to the variances
        let centered = &draws - &sample_mean;
        let sample_cov = centered.t().dot(&centered) / n as f64;
        assert_abs_diff_eq!(sample_cov[[1, 2]], cov[[1, 2]], epsilon = 0.03);
        assert_abs_diff_eq!(sample_cov[[1, 1]], cov[[1, 1]] + 0.0025, epsilon = 0.1);
        assert_abs_diff_eq!(sample_cov[[2, 2]], cov[[2, 2]] + 0.01, epsilon = 0.05);
    }

    #[test]
    fn test_generate_errors() {
        let predictor = MultiChannelPredictor::params(spear())
            .fit(&joint_data())
            .unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let mock = |errors| CurveRequest::Mock {
            epochs: array![1., 2.],
            mean: array![0., 0.],
            errors,
        };
        assert!(predictor
            .generate(&[mock(array![-0.1, 0.1])], 0., &mut rng)
            .unwrap_err()
            .is_config_error());
        assert!(predictor
            .generate(&[mock(array![0.1])], 0., &mut rng)
            .is_err());
        let too_many = vec![mock(array![0.1, 0.1]); 3];
        assert!(predictor.generate(&too_many, 0., &mut rng).is_err());
        assert!(predictor
            .generate(&[mock(array![0.1, 0.1])], 1.5, &mut rng)
            .is_err());
    }
}
