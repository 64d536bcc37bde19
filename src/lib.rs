//! This library predicts astronomical light curves modelled as
//! [Gaussian Processes](https://en.wikipedia.org/wiki/Gaussian_process).
//!
//! A light curve is either drawn from the prior process (unconstrained realization)
//! or from the process conditioned on noisy observations (constrained realization).
//! Several light curves, a driving signal and its time-lagged smoothed echoes, can be
//! modelled jointly with the SPEAR covariance used in reverberation mapping.
//!
//! The covariance of observed points plus their measurement variance (nugget) is
//! factored once by a Cholesky decomposition, strict ([`Rank::Full`]) or pivoted with
//! reduced rank ([`Rank::NearlyFull`]). Every query then reuses the cached factor.
//!
//! * [`Predictor`] handles one light curve with a stationary kernel selected by name
//!   (`drw`, `pow_exp`, `matern`, `kepler_exp`), parameterized by [`PredictorParams`].
//! * [`MultiChannelPredictor`] handles a driver and its echoes with [`SpearCov`],
//!   parameterized by [`MultiChannelParams`].
//!
//! Mock light curves are full stochastic realizations of the process with added
//! measurement noise, possibly correlated between epochs.
//!
//! Progress and timings are reported through the [`log`](https://docs.rs/log) facade.
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
pub mod cholesky;
pub mod covariance;
pub mod covariance_models;
mod errors;
mod light_curve;
pub mod mean_models;
mod multi_channel;
mod parameters;
mod predictor;
pub mod sampling;
pub mod spear;

pub use covariance_models::{CovParams, CovarianceModel, KernelFamily, StationaryCov};
pub use errors::*;
pub use light_curve::*;
pub use mean_models::{ChannelMeans, ConstantMean, FnMean, LinearMean, MeanModel};
pub use multi_channel::*;
pub use parameters::*;
pub use predictor::*;
pub use sampling::QueryErrors;
pub use spear::{Echo, SpearCov};
