//! A module for covariance models of the light curve process.
//!
//! A covariance model gives the covariance between two (epoch, channel) points.
//! Single channel models are stationary kernels selected by name:
//! * `drw` (or `exponential`): damped random walk,
//! * `pow_exp`: power exponential,
//! * `matern`: matern with half integer degree,
//! * `kepler_exp`: damped random walk smoothed below a short cut timescale.
//!
//! The multi channel model lives in [`crate::spear`].

use crate::errors::{LcError, Result};
use linfa::Float;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Largest smoothing width accepted by the `kepler_exp` kernel, in `tau` units
pub const MAX_KEPLER_NU: f64 = 10.;

/// A trait for covariance models, possibly across several channels
pub trait CovarianceModel<F: Float>: Clone + fmt::Display + Sync {
    /// Number of channels handled by the model, valid channel ids are `0..n_channels()`
    fn n_channels(&self) -> usize {
        1
    }

    /// Covariance between the process at epoch `t1` on channel `c1`
    /// and at epoch `t2` on channel `c2`.
    ///
    /// Implementations may panic on a channel outside `0..n_channels()`,
    /// the assembly functions of [`crate::covariance`] check channels beforehand.
    fn value(&self, t1: F, c1: usize, t2: F, c2: usize) -> F;

    /// Zero lag variance of the given channel
    fn variance(&self, channel: usize) -> F {
        self.value(F::zero(), channel, F::zero(), channel)
    }
}

/// Registered stationary kernel families
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum KernelFamily {
    /// exp(-r)
    Drw,
    /// exp(-r^nu)
    PowExp,
    /// Matern with nu in {0.5, 1.5, 2.5}
    Matern,
    /// exp(-r) smoothed with a gaussian window of width nu (in tau units)
    KeplerExp,
}

impl KernelFamily {
    /// Registered kernel name
    pub fn name(&self) -> &'static str {
        match self {
            KernelFamily::Drw => "drw",
            KernelFamily::PowExp => "pow_exp",
            KernelFamily::Matern => "matern",
            KernelFamily::KeplerExp => "kepler_exp",
        }
    }
}

impl FromStr for KernelFamily {
    type Err = LcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "drw" | "exponential" => Ok(KernelFamily::Drw),
            "pow_exp" => Ok(KernelFamily::PowExp),
            "matern" => Ok(KernelFamily::Matern),
            "kepler_exp" => Ok(KernelFamily::KeplerExp),
            _ => Err(LcError::UnknownKernelError(format!(
                "'{s}', expected one of drw, exponential, pow_exp, matern, kepler_exp"
            ))),
        }
    }
}

impl fmt::Display for KernelFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Named kernel hyperparameters
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct CovParams<F: Float> {
    /// Amplitude, the process variance is `sigma^2`
    pub sigma: F,
    /// Damping timescale
    pub tau: F,
    /// Shape parameter, meaning depends on the kernel family
    pub nu: Option<F>,
}

impl<F: Float> CovParams<F> {
    /// Hyperparameters without shape parameter
    pub fn new(sigma: F, tau: F) -> Self {
        CovParams {
            sigma,
            tau,
            nu: None,
        }
    }

    /// Set shape parameter
    pub fn nu(mut self, nu: F) -> Self {
        self.nu = Some(nu);
        self
    }
}

/// Stationary single channel covariance `sigma^2 * rho(|t1 - t2| / tau)`
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct StationaryCov<F: Float> {
    family: KernelFamily,
    sigma: F,
    tau: F,
    nu: F,
}

impl<F: Float> StationaryCov<F> {
    /// Build a kernel of the given family, checking hyperparameters
    pub fn new(family: KernelFamily, params: &CovParams<F>) -> Result<Self> {
        let CovParams { sigma, tau, nu } = *params;
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
        let nu = match family {
            KernelFamily::Drw => F::one(),
            _ => {
                let nu = nu.ok_or_else(|| {
                    LcError::InvalidValueError(format!("{family} kernel requires nu"))
                })?;
                Self::check_nu(family, nu)?;
                nu
            }
        };
        Ok(StationaryCov {
            family,
            sigma,
            tau,
            nu,
        })
    }

    /// Build a kernel from its registered name
    pub fn from_name(name: &str, params: &CovParams<F>) -> Result<Self> {
        Self::new(name.parse()?, params)
    }

    fn check_nu(family: KernelFamily, nu: F) -> Result<()> {
        let valid = match family {
            KernelFamily::Drw => true,
            KernelFamily::PowExp => nu > F::zero() && nu <= F::cast(2.),
            KernelFamily::Matern => [0.5, 1.5, 2.5].iter().any(|v| nu == F::cast(*v)),
            KernelFamily::KeplerExp => nu > F::zero() && nu <= F::cast(MAX_KEPLER_NU),
        };
        if valid {
            Ok(())
        } else {
            Err(LcError::InvalidValueError(format!(
                "nu={nu} is not valid for {family} kernel"
            )))
        }
    }

    /// Kernel family
    pub fn family(&self) -> KernelFamily {
        self.family
    }

    /// Amplitude
    pub fn sigma(&self) -> F {
        self.sigma
    }

    /// Timescale
    pub fn tau(&self) -> F {
        self.tau
    }

    /// Correlation at lag `r` given in `tau` units, equals one at r = 0
    pub fn correlation(&self, r: F) -> F {
        let r = num_traits::Float::abs(r);
        match self.family {
            KernelFamily::Drw => F::exp(-r),
            KernelFamily::PowExp => F::exp(-r.powf(self.nu)),
            KernelFamily::Matern => matern(r, self.nu),
            KernelFamily::KeplerExp => smoothed_exp(r, self.nu) / smoothed_exp(F::zero(), self.nu),
        }
    }
}

impl<F: Float> fmt::Display for StationaryCov<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.family {
            KernelFamily::Drw => write!(f, "{}(sigma={}, tau={})", self.family, self.sigma, self.tau),
            _ => write!(
                f,
                "{}(sigma={}, tau={}, nu={})",
                self.family, self.sigma, self.tau, self.nu
            ),
        }
    }
}

impl<F: Float> CovarianceModel<F> for StationaryCov<F> {
    fn value(&self, t1: F, _c1: usize, t2: F, _c2: usize) -> F {
        self.sigma * self.sigma * self.correlation((t1 - t2) / self.tau)
    }
}

/// Matern correlation in closed form for half integer degrees
fn matern<F: Float>(r: F, nu: F) -> F {
    if nu == F::cast(0.5) {
        F::exp(-r)
    } else if nu == F::cast(1.5) {
        let v = r * F::cast(3.).sqrt();
        (F::one() + v) * F::exp(-v)
    } else {
        let v = r * F::cast(5.).sqrt();
        (F::one() + v + v * v / F::cast(3.)) * F::exp(-v)
    }
}

/// E[exp(-|r - u|)] for u ~ N(0, s^2), up to the factor 1/2 exp(s^2/2).
///
/// exp(-r) erfc((s^2 - r) / (s sqrt2)) + exp(r) erfc((s^2 + r) / (s sqrt2))
fn smoothed_exp<F: Float>(r: F, s: F) -> F {
    let r = r.to_f64().unwrap_or(f64::NAN);
    let s = s.to_f64().unwrap_or(f64::NAN);
    let s2 = s * s;
    let k = s * std::f64::consts::SQRT_2;
    let lower = (-r).exp() * libm::erfc((s2 - r) / k);
    let upper_arg = (s2 + r) / k;
    // erfc underflows well before exp(r) overflows
    let upper = if upper_arg > 26. {
        0.
    } else {
        r.exp() * libm::erfc(upper_arg)
    };
    F::cast(lower + upper)
}
