//! A module for mean models of the light curve process.
//!
//! The process is written `Y(t) = mu(t) + Z(t)` where `Z` is a zero-mean
//! Gaussian process. The following mean models are implemented:
//! * constant,
//! * linear trend,
//! * plain function,
//! * per channel constants (used by the multi channel predictor).

use crate::errors::{LcError, Result};
use linfa::Float;
use ndarray::{Array1, ArrayBase, Data, Ix1, Zip};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// A trait for mean models used by the predictors
pub trait MeanModel<F: Float>: Clone + fmt::Display + Sync {
    /// Mean of the process at epochs `t` for the given `channels`
    /// (one channel id per epoch).
    fn value(
        &self,
        t: &ArrayBase<impl Data<Elem = F>, Ix1>,
        channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
    ) -> Array1<F>;
}

/// A constant function as mean of the process
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct ConstantMean<F: Float>(F);

impl<F: Float> ConstantMean<F> {
    /// Constant mean, rejects non finite values
    pub fn new(value: F) -> Result<Self> {
        if !value.is_finite() {
            return Err(LcError::InvalidValueError(format!(
                "mean should be a finite constant, got {value}"
            )));
        }
        Ok(ConstantMean(value))
    }

    /// The constant value
    pub fn constant(&self) -> F {
        self.0
    }
}

impl<F: Float> Default for ConstantMean<F> {
    fn default() -> Self {
        ConstantMean(F::zero())
    }
}

impl<F: Float> fmt::Display for ConstantMean<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Constant({})", self.0)
    }
}

impl<F: Float> MeanModel<F> for ConstantMean<F> {
    fn value(
        &self,
        t: &ArrayBase<impl Data<Elem = F>, Ix1>,
        _channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
    ) -> Array1<F> {
        Array1::from_elem(t.len(), self.0)
    }
}

/// A linear trend `intercept + slope * (t - t0)` as mean of the process
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct LinearMean<F: Float> {
    intercept: F,
    slope: F,
    t0: F,
}

impl<F: Float> LinearMean<F> {
    /// Linear trend through `intercept` at epoch `t0`
    pub fn new(intercept: F, slope: F, t0: F) -> Result<Self> {
        if !(intercept.is_finite() && slope.is_finite() && t0.is_finite()) {
            return Err(LcError::InvalidValueError(
                "linear mean coefficients should be finite".to_string(),
            ));
        }
        Ok(LinearMean {
            intercept,
            slope,
            t0,
        })
    }
}

impl<F: Float> fmt::Display for LinearMean<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Linear({} + {} * (t - {}))", self.intercept, self.slope, self.t0)
    }
}

impl<F: Float> MeanModel<F> for LinearMean<F> {
    fn value(
        &self,
        t: &ArrayBase<impl Data<Elem = F>, Ix1>,
        _channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
    ) -> Array1<F> {
        t.mapv(|v| self.intercept + self.slope * (v - self.t0))
    }
}

/// Any plain function of time as mean of the process
#[derive(Clone, Copy)]
pub struct FnMean<F: Float>(pub fn(F) -> F);

impl<F: Float> fmt::Debug for FnMean<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("FnMean")
    }
}

impl<F: Float> fmt::Display for FnMean<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Function")
    }
}

impl<F: Float> MeanModel<F> for FnMean<F> {
    fn value(
        &self,
        t: &ArrayBase<impl Data<Elem = F>, Ix1>,
        _channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
    ) -> Array1<F> {
        t.mapv(self.0)
    }
}

/// One constant mean per channel, i.e. the true physical mean of each light curve
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct ChannelMeans<F: Float>(Vec<F>);

impl<F: Float> ChannelMeans<F> {
    /// Channel `i` gets `means[i]`
    pub fn new(means: Vec<F>) -> Result<Self> {
        if means.iter().any(|m| !m.is_finite()) {
            return Err(LcError::InvalidValueError(
                "channel means should be finite".to_string(),
            ));
        }
        Ok(ChannelMeans(means))
    }

    /// Mean of the given channel, zero when the channel is unknown
    pub fn get(&self, channel: usize) -> F {
        self.0.get(channel).copied().unwrap_or_else(F::zero)
    }
}

impl<F: Float> fmt::Display for ChannelMeans<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let means = self
            .0
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(f, "Channels([{means}])")
    }
}

impl<F: Float> MeanModel<F> for ChannelMeans<F> {
    fn value(
        &self,
        t: &ArrayBase<impl Data<Elem = F>, Ix1>,
        channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
    ) -> Array1<F> {
        let mut res = Array1::zeros(t.len());
        Zip::from(&mut res)
            .and(channels)
            .for_each(|m, &c| *m = self.get(c));
        res
    }
}
