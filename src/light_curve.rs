//! Observed light curves used to condition the predictors.

use crate::errors::{LcError, Result};
use linfa::Float;
use ndarray::{concatenate, Array1, ArrayBase, ArrayView1, Axis, Data, Ix1};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Indices sorting `values` in ascending order
fn argsort<F: Float>(values: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    idx.sort_by(|&a, &b| {
        values[a]
            .partial_cmp(&values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    idx
}

fn join<F: Float>(parts: Vec<ArrayView1<F>>) -> Array1<F> {
    concatenate(Axis(0), &parts).unwrap_or_else(|_| Array1::zeros(0))
}

/// A light curve: epochs, values and measurement errors of equal length
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct LightCurve<F: Float> {
    epochs: Array1<F>,
    values: Array1<F>,
    errors: Array1<F>,
}

impl<F: Float> LightCurve<F> {
    /// Build a light curve, arrays must have the same non zero length,
    /// be finite and errors positive or zero.
    pub fn new(epochs: Array1<F>, values: Array1<F>, errors: Array1<F>) -> Result<Self> {
        let n = epochs.len();
        if n == 0 {
            return Err(LcError::InvalidValueError(
                "light curve should have at least one point".to_string(),
            ));
        }
        if values.len() != n || errors.len() != n {
            return Err(LcError::InvalidValueError(format!(
                "light curve arrays should have the same length, got epochs: {n}, values: {}, errors: {}",
                values.len(),
                errors.len()
            )));
        }
        if epochs
            .iter()
            .chain(values.iter())
            .chain(errors.iter())
            .any(|v| !v.is_finite())
        {
            return Err(LcError::InvalidValueError(
                "light curve should only contain finite values".to_string(),
            ));
        }
        if errors.iter().any(|e| *e < F::zero()) {
            return Err(LcError::InvalidValueError(
                "light curve errors should be either 0 or positive".to_string(),
            ));
        }
        Ok(LightCurve {
            epochs,
            values,
            errors,
        })
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// Always false for a valid light curve
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Observation epochs
    pub fn epochs(&self) -> &Array1<F> {
        &self.epochs
    }

    /// Observed values
    pub fn values(&self) -> &Array1<F> {
        &self.values
    }

    /// Measurement errors (standard deviations)
    pub fn errors(&self) -> &Array1<F> {
        &self.errors
    }

    /// Observation variances (nugget), squared errors
    pub fn variances(&self) -> Array1<F> {
        self.errors.mapv(|e| e * e)
    }

    /// Same curve with epochs in ascending order
    pub fn sorted(&self) -> Self {
        let idx = argsort(&self.epochs);
        LightCurve {
            epochs: self.epochs.select(Axis(0), &idx),
            values: self.values.select(Axis(0), &idx),
            errors: self.errors.select(Axis(0), &idx),
        }
    }
}

/// Jointly observed light curves, curve `i` is channel `i`
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct LightCurves<F: Float> {
    curves: Vec<LightCurve<F>>,
    means: Vec<F>,
}

impl<F: Float> LightCurves<F> {
    /// Joint dataset with zero true mean for every channel
    pub fn new(curves: Vec<LightCurve<F>>) -> Result<Self> {
        if curves.is_empty() {
            return Err(LcError::InvalidValueError(
                "at least one light curve is required".to_string(),
            ));
        }
        let means = vec![F::zero(); curves.len()];
        Ok(LightCurves { curves, means })
    }

    /// Set the true physical mean of each light curve.
    ///
    /// The true mean has to be used instead of the sample mean which would
    /// bias the conditioning.
    pub fn with_means(mut self, means: Vec<F>) -> Result<Self> {
        if means.len() != self.curves.len() {
            return Err(LcError::InvalidValueError(format!(
                "{} means given for {} light curves",
                means.len(),
                self.curves.len()
            )));
        }
        if means.iter().any(|m| !m.is_finite()) {
            return Err(LcError::InvalidValueError(
                "light curve means should be finite".to_string(),
            ));
        }
        self.means = means;
        Ok(self)
    }

    /// Light curves in channel order
    pub fn curves(&self) -> &[LightCurve<F>] {
        &self.curves
    }

    /// True mean of each light curve
    pub fn means(&self) -> &[F] {
        &self.means
    }

    /// Number of light curves
    pub fn n_curves(&self) -> usize {
        self.curves.len()
    }

    /// Concatenated (epochs, values, variances, channels) of all curves,
    /// each curve sorted by epoch
    pub(crate) fn flatten(&self) -> (Array1<F>, Array1<F>, Array1<F>, Array1<usize>) {
        let sorted: Vec<LightCurve<F>> = self.curves.iter().map(|lc| lc.sorted()).collect();
        let variances: Vec<Array1<F>> = sorted.iter().map(|lc| lc.variances()).collect();
        let epochs = join(sorted.iter().map(|lc| lc.epochs.view()).collect());
        let values = join(sorted.iter().map(|lc| lc.values.view()).collect());
        let variances = join(variances.iter().map(|v| v.view()).collect());
        let channels = sorted
            .iter()
            .enumerate()
            .flat_map(|(c, lc)| std::iter::repeat(c).take(lc.len()))
            .collect();
        (epochs, values, variances, channels)
    }
}

impl<F: Float> From<LightCurve<F>> for LightCurves<F> {
    fn from(lc: LightCurve<F>) -> Self {
        LightCurves {
            curves: vec![lc],
            means: vec![F::zero()],
        }
    }
}
