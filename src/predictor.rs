use crate::algorithm::GpState;
use crate::covariance_models::{CovParams, StationaryCov};
use crate::errors::{LcError, Result};
use crate::light_curve::LightCurve;
use crate::mean_models::MeanModel;
use crate::parameters::{PredictorParams, PredictorValidParams};
use crate::sampling::{sample_noise, QueryErrors};

use linfa::{Float, ParamGuard};
use log::info;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1};
use ndarray_rand::rand::Rng;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Single channel light curve predictor.
///
/// The light curve is modelled as a gaussian process with a given mean and a
/// stationary kernel selected by name. The predictor is either unconstrained
/// (prior process) or constrained by an observed light curve. Covariance,
/// Cholesky factor and conditioning residual are computed once at construction.
///
/// # Example
///
/// ```no_run
/// use lcpredict::{ConstantMean, CovParams, LightCurve, Predictor, QueryErrors};
/// use ndarray::{array, Array};
/// use ndarray_rand::rand::SeedableRng;
/// use rand_xoshiro::Xoshiro256Plus;
///
/// let lc = LightCurve::new(
///     array![25., 100., 175.],
///     array![0.7, 0.1, 0.4],
///     array![0.07, 0.02, 0.05],
/// ).expect("valid light curve");
///
/// let predictor = Predictor::params(
///     ConstantMean::default(),
///     "pow_exp",
///     CovParams::new(0.2, 10.).nu(1.),
/// )
/// .fit(&lc)
/// .expect("constrained predictor");
///
/// let epochs = Array::range(0., 200., 1.);
/// let (mean, variance) = predictor.evaluate(&epochs).expect("evaluation");
///
/// let mut rng = Xoshiro256Plus::seed_from_u64(42);
/// let mocks = predictor
///     .generate(&epochs, QueryErrors::Scalar(0.), 3, 0., &mut rng)
///     .expect("realizations");
/// ```
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Predictor<F: Float, Mean: MeanModel<F>> {
    /// Process state, conditioned when a light curve was given
    state: GpState<F, Mean, StationaryCov<F>>,
    /// Parameters used to build this predictor
    params: PredictorValidParams<F, Mean>,
}

impl<F: Float, Mean: MeanModel<F>> Predictor<F, Mean> {
    /// Predictor parameters: process mean, registered kernel name and kernel hyperparameters
    pub fn params(
        mean: Mean,
        kernel_name: &str,
        cov_params: CovParams<F>,
    ) -> PredictorParams<F, Mean> {
        PredictorParams::new(mean, kernel_name, cov_params)
    }

    /// Point-wise mean and variance of the (conditioned) process at `epochs`
    pub fn evaluate(
        &self,
        epochs: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        self.state.predict_valvar(epochs, &Array1::<usize>::zeros(epochs.len()))
    }

    /// Covariance matrix of the (conditioned) process at `epochs`
    pub fn evaluate_cov(&self, epochs: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Result<Array2<F>> {
        let (_, cov) = self
            .state
            .predict_mean_cov(epochs, &Array1::<usize>::zeros(epochs.len()))?;
        Ok(cov)
    }

    /// Draw `n_realizations` mock light curves at `epochs`.
    ///
    /// Each realization is a full stochastic draw of the (conditioned) process
    /// plus measurement noise with the given `errors` correlated between
    /// epochs by `errcov`. No noise is added when all errors are zero.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        epochs: &ArrayBase<impl Data<Elem = F>, Ix1>,
        errors: impl Into<QueryErrors<F>>,
        n_realizations: usize,
        errcov: F,
        rng: &mut R,
    ) -> Result<Vec<Array1<F>>> {
        let errors = errors.into().resolve(epochs.len())?;
        if n_realizations == 0 {
            return Err(LcError::InvalidValueError(
                "number of realizations should be strictly positive".to_string(),
            ));
        }
        let noise = sample_noise(&errors, errcov, n_realizations, rng)?;
        let channels = Array1::<usize>::zeros(epochs.len());
        let draws = self.state.sample(epochs, &channels, n_realizations, rng)? + noise;
        Ok(draws.columns().into_iter().map(|c| c.to_owned()).collect())
    }

    /// Whether the process is conditioned on an observed light curve
    pub fn is_conditioned(&self) -> bool {
        self.state.is_conditioned()
    }

    /// Kernel of the process
    pub fn kernel(&self) -> &StationaryCov<F> {
        self.state.cov()
    }

    /// Mean of the process
    pub fn mean(&self) -> &Mean {
        self.state.mean()
    }

    /// Parameters used to build this predictor
    pub fn params_used(&self) -> &PredictorValidParams<F, Mean> {
        &self.params
    }
}

impl<F: Float, Mean: MeanModel<F>> fmt::Display for Predictor<F, Mean> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Predictor(mean={}, kernel={}, rank={}, observations={})",
            self.state.mean(),
            self.state.cov(),
            self.state.rank(),
            self.state.n_observations()
        )
    }
}

impl<F: Float, Mean: MeanModel<F>> PredictorValidParams<F, Mean> {
    /// Predictor constrained by an observed light curve
    pub fn fit(&self, lc: &LightCurve<F>) -> Result<Predictor<F, Mean>> {
        info!("Constrained realization with {} observations", lc.len());
        let lc = lc.sorted();
        let state = GpState::observe(
            self.mean().clone(),
            self.kernel()?,
            self.rank(),
            self.pivot_tolerance(),
            lc.epochs(),
            &Array1::<usize>::zeros(lc.len()),
            lc.values(),
            &lc.variances(),
        )?;
        Ok(Predictor {
            state,
            params: self.clone(),
        })
    }

    /// Unconstrained predictor (prior process)
    pub fn build(&self) -> Result<Predictor<F, Mean>> {
        info!("Unconstrained realization");
        let state = GpState::unconditioned(
            self.mean().clone(),
            self.kernel()?,
            self.rank(),
        );
        Ok(Predictor {
            state,
            params: self.clone(),
        })
    }
}

impl<F: Float, Mean: MeanModel<F>> PredictorParams<F, Mean> {
    /// Check parameters and build a predictor constrained by `lc`
    pub fn fit(&self, lc: &LightCurve<F>) -> Result<Predictor<F, Mean>> {
        self.check_ref()?.fit(lc)
    }

    /// Check parameters and build an unconstrained predictor
    pub fn build(&self) -> Result<Predictor<F, Mean>> {
        self.check_ref()?.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mean_models::{ConstantMean, LinearMean};
    use crate::parameters::Rank;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array, Axis};
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn scenario_a() -> Predictor<f64, ConstantMean<f64>> {
        let lc = LightCurve::new(
            array![25., 100., 175.],
            array![0.7, 0.1, 0.4],
            array![0.07, 0.02, 0.05],
        )
        .unwrap();
        Predictor::params(
            ConstantMean::new(0.4).unwrap(),
            "pow_exp",
            CovParams::new(0.2, 10.).nu(1.),
        )
        .fit(&lc)
        .unwrap()
    }

    #[test]
    fn test_constrained_evaluate() {
        let predictor = scenario_a();
        assert!(predictor.is_conditioned());
        let epochs = Array::range(0., 200., 1.);
        let (mean, var) = predictor.evaluate(&epochs).unwrap();
        assert_eq!(mean.len(), 200);
        for (t, y, e) in [(25, 0.7, 0.07), (100, 0.1, 0.02), (175, 0.4, 0.05)] {
            assert_abs_diff_eq!(mean[t], y, epsilon = e);
            // small at observations, growing away from them
            assert!(var[t] < e * e);
            assert!(var[t] < var[t + 5] && var[t + 5] < var[t + 10]);
        }
        // prior far from any observation
        assert_abs_diff_eq!(mean[60], 0.4, epsilon = 1e-2);
        assert_abs_diff_eq!(var[60], 0.04, epsilon = 1e-3);
        assert!(var.iter().all(|v| *v >= 0.));
    }

    #[test]
    fn test_generate_mean_converges_to_evaluate() {
        let predictor = scenario_a();
        let epochs = array![20., 25., 60., 101.];
        let (mean, _) = predictor.evaluate(&epochs).unwrap();
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let draws = predictor
            .generate(&epochs, 0., 5000, 0., &mut rng)
            .unwrap();
        assert_eq!(draws.len(), 5000);
        let views: Vec<_> = draws.iter().map(|d| d.view()).collect();
        let stacked = ndarray::stack(Axis(0), &views).unwrap();
        assert_abs_diff_eq!(stacked.mean_axis(Axis(0)).unwrap(), mean, epsilon = 1e-2);
    }

    #[test]
    fn test_generate_adds_noise() {
        let predictor = scenario_a();
        let epochs = array![60., 61.];
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let draws = predictor
            .generate(&epochs, array![0.5, 0.5], 20000, 0., &mut rng)
            .unwrap();
        let cov = predictor.evaluate_cov(&epochs).unwrap();
        let n = draws.len() as f64;
        let mean = draws.iter().fold(Array1::<f64>::zeros(2), |acc, d| acc + d) / n;
        let var = draws
            .iter()
            .fold(Array1::<f64>::zeros(2), |acc, d| acc + (d - &mean).mapv(|v| v * v))
            / n;
        assert_abs_diff_eq!(var[0], cov[[0, 0]] + 0.25, epsilon = 1e-2);
        assert_abs_diff_eq!(var[1], cov[[1, 1]] + 0.25, epsilon = 1e-2);
    }

    #[test]
    fn test_generate_configuration_errors() {
        let predictor = scenario_a();
        let epochs = array![0., 1., 2.];
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let err = predictor
            .generate(&epochs, -0.1, 1, 0., &mut rng)
            .unwrap_err();
        assert!(err.is_config_error());
        assert!(predictor
            .generate(&epochs, array![0.1, 0.2], 1, 0., &mut rng)
            .unwrap_err()
            .is_config_error());
        assert!(predictor.generate(&epochs, 0.1, 0, 0., &mut rng).is_err());
        assert!(predictor.generate(&epochs, 0.1, 1, -0.9, &mut rng).is_err());
    }

    #[test]
    fn test_unconstrained_kepler_exp() {
        let predictor = Predictor::params(
            ConstantMean::new(10.).unwrap(),
            "kepler_exp",
            CovParams::new(2., 10.).nu(0.2),
        )
        .build()
        .unwrap();
        assert!(!predictor.is_conditioned());
        let epochs = Array::linspace(0., 200., 256);
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let mocks = predictor
            .generate(&epochs, 0.5, 300, 0., &mut rng)
            .unwrap();
        assert_eq!(mocks.len(), 300);
        assert!(mocks.iter().all(|m| m.len() == 256));

        // pooled over epochs and realizations: sigma^2 plus noise variance
        let n = (300 * 256) as f64;
        let mean = mocks.iter().map(|m| m.sum()).sum::<f64>() / n;
        let var = mocks
            .iter()
            .map(|m| m.mapv(|v| (v - 10.).powi(2)).sum())
            .sum::<f64>()
            / n;
        assert_abs_diff_eq!(mean, 10., epsilon = 0.15);
        assert_abs_diff_eq!(var, 4.25, epsilon = 0.3);

        // too wide a smoothing window is rejected at build time
        let err = Predictor::params(
            ConstantMean::new(10.).unwrap(),
            "kepler_exp",
            CovParams::new(2., 10.).nu(40.),
        )
        .build()
        .unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_linear_mean_prior() {
        let predictor = Predictor::params(
            LinearMean::new(1., 0.1, 0.).unwrap(),
            "matern",
            CovParams::new(0.5, 5.).nu(2.5),
        )
        .build()
        .unwrap();
        let (mean, var) = predictor.evaluate(&array![0., 10.]).unwrap();
        assert_abs_diff_eq!(mean, array![1., 2.]);
        assert_abs_diff_eq!(var, array![0.25, 0.25]);
        assert!(predictor.to_string().starts_with("Predictor(mean=Linear"));
    }

    #[test]
    fn test_degenerate_observations() {
        let lc = LightCurve::new(array![10., 10.], array![1., 1.], array![0., 0.]).unwrap();
        let params = Predictor::params(ConstantMean::default(), "drw", CovParams::new(1., 10.));
        let err = params.fit(&lc).unwrap_err();
        assert!(matches!(err, LcError::NotPositiveDefiniteError(_)));
        // redundant point dropped by the reduced rank decomposition
        let predictor = params.rank(Rank::NearlyFull).fit(&lc).unwrap();
        let (mean, _) = predictor.evaluate(&array![10.]).unwrap();
        assert_abs_diff_eq!(mean[0], 1., epsilon = 1e-10);
    }

    #[cfg(feature = "serializable")]
    #[test]
    fn test_save_load_predictor() {
        let predictor = scenario_a();
        let json = serde_json::to_string(&predictor).unwrap();
        let loaded: Predictor<f64, ConstantMean<f64>> = serde_json::from_str(&json).unwrap();
        let epochs = array![10., 25., 130.];
        let (m1, v1) = predictor.evaluate(&epochs).unwrap();
        let (m2, v2) = loaded.evaluate(&epochs).unwrap();
        assert_abs_diff_eq!(m1, m2, epsilon = 1e-12);
        assert_abs_diff_eq!(v1, v2, epsilon = 1e-12);
    }
}
