//! Multi channel covariance for reverberation mapping.
//!
//! Channel 0 is a driving light curve following a damped random walk.
//! Every other channel is an echo of the driver: the driver is shifted by a
//! lag, smoothed by a top-hat transfer function of a given width and scaled.
//! Covariances between any pair of channels are evaluated in closed form.

use crate::covariance_models::CovarianceModel;
use crate::errors::{LcError, Result};
use linfa::Float;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-hat transfer function of an echo channel
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Echo<F: Float> {
    /// Time delay with respect to the driver
    pub lag: F,
    /// Top-hat full width, zero means a pure shifted copy
    pub width: F,
    /// Amplitude ratio with respect to the driver
    pub scale: F,
}

impl<F: Float> Echo<F> {
    /// Echo delayed by `lag`, smoothed over `width` and scaled by `scale`
    pub fn new(lag: F, width: F, scale: F) -> Self {
        Echo { lag, width, scale }
    }

    fn driver() -> Self {
        Echo {
            lag: F::zero(),
            width: F::zero(),
            scale: F::one(),
        }
    }
}

/// SPEAR covariance: a damped random walk driver plus top-hat smoothed echoes
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct SpearCov<F: Float> {
    sigma: F,
    tau: F,
    echoes: Vec<Echo<F>>,
}

impl<F: Float> SpearCov<F> {
    /// Driver alone, amplitude `sigma` and damping timescale `tau`
    pub fn new(sigma: F, tau: F) -> Result<Self> {
        if !(sigma.is_finite() && sigma > F::zero()) {
            return Err(LcError::InvalidValueError(format!(
                "sigma should be strictly positive, got {sigma}"
            )));
        }
        if !(tau.is_finite() && tau > F::zero()) {
            return Err(LcError::InvalidValueError(format!(
                "tau should be strictly positive, got {tau}"
            )));
        }
        Ok(SpearCov {
            sigma,
            tau,
            echoes: Vec::new(),
        })
    }

    /// Append an echo, it becomes the next channel id
    pub fn echo(mut self, lag: F, width: F, scale: F) -> Result<Self> {
        if !(lag.is_finite() && width.is_finite() && scale.is_finite()) {
            return Err(LcError::InvalidValueError(format!(
                "echo {} parameters should be finite",
                self.echoes.len() + 1
            )));
        }
        if width < F::zero() {
            return Err(LcError::InvalidValueError(format!(
                "echo width should be positive or zero, got {width}"
            )));
        }
        if scale <= F::zero() {
            return Err(LcError::InvalidValueError(format!(
                "echo scale should be strictly positive, got {scale}"
            )));
        }
        self.echoes.push(Echo::new(lag, width, scale));
        Ok(self)
    }

    /// Driver amplitude
    pub fn sigma(&self) -> F {
        self.sigma
    }

    /// Driver damping timescale
    pub fn tau(&self) -> F {
        self.tau
    }

    /// Echo channels, `echoes()[i]` is channel `i + 1`
    pub fn echoes(&self) -> &[Echo<F>] {
        &self.echoes
    }

    /// Transfer function of a channel
    fn transfer(&self, channel: usize) -> Echo<F> {
        debug_assert!(
            channel < 1 + self.echoes.len(),
            "channel {channel} out of range"
        );
        if channel == 0 {
            Echo::driver()
        } else {
            self.echoes[channel - 1]
        }
    }
}

impl<F: Float> fmt::Display for SpearCov<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Spear(sigma={}, tau={}", self.sigma, self.tau)?;
        for (i, e) in self.echoes.iter().enumerate() {
            write!(
                f,
                ", echo{}=(lag={}, width={}, scale={})",
                i + 1,
                e.lag,
                e.width,
                e.scale
            )?;
        }
        write!(f, ")")
    }
}

impl<F: Float> CovarianceModel<F> for SpearCov<F> {
    fn n_channels(&self) -> usize {
        1 + self.echoes.len()
    }

    /// # Panics
    ///
    /// When `c1` or `c2` is not lower than [`CovarianceModel::n_channels`].
    fn value(&self, t1: F, c1: usize, t2: F, c2: usize) -> F {
        let e1 = self.transfer(c1);
        let e2 = self.transfer(c2);
        let x = num_traits::Float::abs(((t1 - e1.lag) - (t2 - e2.lag)) / self.tau);
        let a = e1.width / self.tau;
        let b = e2.width / self.tau;
        let rho = match (a > F::zero(), b > F::zero()) {
            (false, false) => F::exp(-x),
            (true, false) => tophat_point(x, a),
            (false, true) => tophat_point(x, b),
            (true, true) => tophat_tophat(x, a, b),
        };
        self.sigma * self.sigma * e1.scale * e2.scale * rho
    }
}

/// sinh(h) / h
fn sinhc<F: Float>(h: F) -> F {
    if h < F::cast(1e-4) {
        F::one() + h * h / F::cast(6.)
    } else {
        h.sinh() / h
    }
}

/// Mean of exp(-|v|) over v in [x - a/2, x + a/2], x >= 0
fn tophat_point<F: Float>(x: F, a: F) -> F {
    let h = a / F::cast(2.);
    if x >= h {
        F::exp(-x) * sinhc(h)
    } else {
        // window straddles zero
        -((-(h + x)).exp_m1() + (-(h - x)).exp_m1()) / a
    }
}

/// exp(-z) - 1 + z - z^2 / 2 for z >= 0
fn exp_remainder<F: Float>(z: F) -> F {
    if z < F::cast(0.1) {
        let mut term = -z * z * z / F::cast(6.);
        let mut sum = term;
        for k in 4..14 {
            term = -term * z / F::cast(k);
            sum += term;
        }
        sum
    } else {
        (-z).exp_m1() + z - z * z / F::cast(2.)
    }
}

/// Mean of exp(-|x + u - v|) over u in [-a/2, a/2], v in [-b/2, b/2], x >= 0
fn tophat_tophat<F: Float>(x: F, a: F, b: F) -> F {
    let two = F::cast(2.);
    let (ha, hb) = (a / two, b / two);
    if x >= ha + hb {
        F::exp(-x) * sinhc(ha) * sinhc(hb)
    } else {
        // With G(u) = exp(-|u|) + |u|, the mean is the second difference
        // [G(x+A+B) - G(x-A+B) - G(x+A-B) + G(x-A-B)] / (ab). Writing
        // G(u) = 1 + u^2/2 + R(|u|), the polynomial part contributes exactly ab.
        let r = |u: F| exp_remainder(num_traits::Float::abs(u));
        let diff = r(x + ha + hb) - r(x - ha + hb) - r(x + ha - hb) + r(x - ha - hb);
        F::one() + diff / (a * b)
    }
}
