use crate::cholesky::DEFAULT_PIVOT_TOLERANCE;
use crate::covariance_models::{CovParams, StationaryCov};
use crate::errors::{LcError, Result};
use crate::mean_models::MeanModel;
use crate::spear::SpearCov;
use linfa::{Float, ParamGuard};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Representation of the covariance of observed points
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Rank {
    /// Dense strict Cholesky decomposition, fails on redundant points
    #[default]
    Full,
    /// Reduced rank pivoted Cholesky decomposition, redundant points are dropped
    NearlyFull,
}

impl FromStr for Rank {
    type Err = LcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Full" => Ok(Rank::Full),
            "NearlyFull" => Ok(Rank::NearlyFull),
            _ => Err(LcError::InvalidValueError(format!(
                "rank should be either Full or NearlyFull, got '{s}'"
            ))),
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Rank::Full => write!(f, "Full"),
            Rank::NearlyFull => write!(f, "NearlyFull"),
        }
    }
}

fn check_pivot_tolerance<F: Float>(tol: F) -> Result<()> {
    if !(tol >= F::zero() && tol < F::one()) {
        return Err(LcError::InvalidValueError(format!(
            "pivot tolerance should be in [0, 1), got {tol}"
        )));
    }
    Ok(())
}

/// A set of validated single channel predictor parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct PredictorValidParams<F: Float, Mean: MeanModel<F>> {
    /// Mean of the process
    pub(crate) mean: Mean,
    /// Registered kernel name
    pub(crate) kernel_name: String,
    /// Kernel hyperparameters
    pub(crate) cov_params: CovParams<F>,
    /// Covariance representation
    pub(crate) rank: Rank,
    /// Relative tolerance of the pivoted decomposition
    pub(crate) pivot_tolerance: F,
}

impl<F: Float, Mean: MeanModel<F>> PredictorValidParams<F, Mean> {
    /// Get mean model
    pub fn mean(&self) -> &Mean {
        &self.mean
    }

    /// Get kernel name
    pub fn kernel_name(&self) -> &str {
        &self.kernel_name
    }

    /// Get kernel hyperparameters
    pub fn cov_params(&self) -> &CovParams<F> {
        &self.cov_params
    }

    /// Get covariance representation
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Get pivoted decomposition tolerance
    pub fn pivot_tolerance(&self) -> F {
        self.pivot_tolerance
    }

    /// Kernel built from its name and hyperparameters
    pub fn kernel(&self) -> Result<StationaryCov<F>> {
        StationaryCov::from_name(&self.kernel_name, &self.cov_params)
    }
}

#[derive(Clone, Debug)]
/// The set of parameters that can be specified to build a
/// [single channel predictor](crate::Predictor).
pub struct PredictorParams<F: Float, Mean: MeanModel<F>>(PredictorValidParams<F, Mean>);

impl<F: Float, Mean: MeanModel<F>> PredictorParams<F, Mean> {
    /// A constructor for predictor parameters given mean, kernel name and hyperparameters
    pub fn new(mean: Mean, kernel_name: &str, cov_params: CovParams<F>) -> Self {
        Self(PredictorValidParams {
            mean,
            kernel_name: kernel_name.to_string(),
            cov_params,
            rank: Rank::default(),
            pivot_tolerance: F::cast(DEFAULT_PIVOT_TOLERANCE),
        })
    }

    /// Set mean model.
    pub fn mean(mut self, mean: Mean) -> Self {
        self.0.mean = mean;
        self
    }

    /// Set covariance representation.
    pub fn rank(mut self, rank: Rank) -> Self {
        self.0.rank = rank;
        self
    }

    /// Set relative tolerance below which pivots are dropped
    /// by the [`Rank::NearlyFull`] decomposition.
    pub fn pivot_tolerance(mut self, tol: F) -> Self {
        self.0.pivot_tolerance = tol;
        self
    }
}

impl<F: Float, Mean: MeanModel<F>> From<PredictorValidParams<F, Mean>>
    for PredictorParams<F, Mean>
{
    fn from(valid: PredictorValidParams<F, Mean>) -> Self {
        PredictorParams(valid)
    }
}

impl<F: Float, Mean: MeanModel<F>> ParamGuard for PredictorParams<F, Mean> {
    type Checked = PredictorValidParams<F, Mean>;
    type Error = LcError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        self.0.kernel()?;
        check_pivot_tolerance(self.0.pivot_tolerance)?;
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

/// A set of validated multi channel predictor parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct MultiChannelValidParams<F: Float> {
    pub(crate) kernel: SpearCov<F>,
    pub(crate) rank: Rank,
    pub(crate) pivot_tolerance: F,
}

impl<F: Float> MultiChannelValidParams<F> {
    /// Get multi channel kernel
    pub fn kernel(&self) -> &SpearCov<F> {
        &self.kernel
    }

    /// Get covariance representation
    pub fn rank(&self) -> Rank {
        self.rank
    }

    /// Get pivoted decomposition tolerance
    pub fn pivot_tolerance(&self) -> F {
        self.pivot_tolerance
    }
}

#[derive(Clone, Debug)]
/// The set of parameters that can be specified to build a
/// [multi channel predictor](crate::MultiChannelPredictor).
pub struct MultiChannelParams<F: Float>(MultiChannelValidParams<F>);

impl<F: Float> MultiChannelParams<F> {
    /// A constructor for multi channel parameters given the SPEAR kernel
    pub fn new(kernel: SpearCov<F>) -> Self {
        Self(MultiChannelValidParams {
            kernel,
            rank: Rank::default(),
            pivot_tolerance: F::cast(DEFAULT_PIVOT_TOLERANCE),
        })
    }

    /// Set covariance representation.
    pub fn rank(mut self, rank: Rank) -> Self {
        self.0.rank = rank;
        self
    }

    /// Set pivoted decomposition tolerance.
    pub fn pivot_tolerance(mut self, tol: F) -> Self {
        self.0.pivot_tolerance = tol;
        self
    }
}

impl<F: Float> ParamGuard for MultiChannelParams<F> {
    type Checked = MultiChannelValidParams<F>;
    type Error = LcError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        check_pivot_tolerance(self.0.pivot_tolerance)?;
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
