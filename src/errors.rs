use thiserror::Error;

/// A result type for light curve prediction
pub type Result<T> = std::result::Result<T, LcError>;

/// An error when building or querying a [`Predictor`](crate::Predictor)
/// or a [`MultiChannelPredictor`](crate::MultiChannelPredictor)
#[derive(Error, Debug)]
pub enum LcError {
    /// When covariance plus nugget is not numerically positive definite
    #[error("Covariance matrix is not positive definite: {0}")]
    NotPositiveDefiniteError(String),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a kernel name is not registered
    #[error("Unknown kernel: {0}")]
    UnknownKernelError(String),
    /// When error due to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
}

impl LcError {
    /// Configuration errors are caller mistakes: fix inputs and rebuild
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            LcError::InvalidValueError(_) | LcError::UnknownKernelError(_)
        )
    }

    /// Numerical failures leave no usable predictor behind
    pub fn is_numerical_failure(&self) -> bool {
        matches!(
            self,
            LcError::NotPositiveDefiniteError(_) | LcError::LinalgError(_)
        )
    }
}

pub(crate) fn not_positive_definite(err: linfa_linalg::LinalgError, what: &str) -> LcError {
    match err {
        linfa_linalg::LinalgError::NotPositiveDefinite => LcError::NotPositiveDefiniteError(
            format!("{what} (degenerate epochs without nugget or invalid kernel parameters?)"),
        ),
        err => LcError::LinalgError(err),
    }
}
