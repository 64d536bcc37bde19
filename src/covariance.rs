//! Covariance matrix assembly from a [`CovarianceModel`].

use crate::covariance_models::CovarianceModel;
use crate::errors::{LcError, Result};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Zip};

fn check_points<F: Float>(
    kernel: &impl CovarianceModel<F>,
    epochs: &ArrayBase<impl Data<Elem = F>, Ix1>,
    channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
) -> Result<()> {
    if epochs.len() != channels.len() {
        return Err(LcError::InvalidValueError(format!(
            "{} epochs given with {} channel ids",
            epochs.len(),
            channels.len()
        )));
    }
    if let Some(c) = channels.iter().find(|&&c| c >= kernel.n_channels()) {
        return Err(LcError::InvalidValueError(format!(
            "channel {c} out of range, covariance model handles {} channel(s)",
            kernel.n_channels()
        )));
    }
    if epochs.iter().any(|t| !t.is_finite()) {
        return Err(LcError::InvalidValueError(
            "epochs should be finite".to_string(),
        ));
    }
    Ok(())
}

/// Covariance matrix `C[i, j] = k(t_i, c_i, t_j, c_j)` of a set of points.
///
/// The upper triangle is computed row-wise in parallel and mirrored,
/// so the result is exactly symmetric.
pub fn covariance_matrix<F: Float>(
    kernel: &impl CovarianceModel<F>,
    epochs: &ArrayBase<impl Data<Elem = F>, Ix1>,
    channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
) -> Result<Array2<F>> {
    check_points(kernel, epochs, channels)?;
    let (epochs, channels) = (epochs.view(), channels.view());
    let n = epochs.len();
    let mut cov = Array2::zeros((n, n));
    Zip::indexed(cov.rows_mut())
        .and(&epochs)
        .and(&channels)
        .par_for_each(|i, mut row, &ti, &ci| {
            for j in i..n {
                row[j] = kernel.value(ti, ci, epochs[j], channels[j]);
            }
        });
    for i in 0..n {
        for j in 0..i {
            cov[[i, j]] = cov[[j, i]];
        }
    }
    Ok(cov)
}

/// Cross covariance `K[i, j] = k(a_i, ca_i, b_j, cb_j)` between two sets of points
pub fn cross_covariance<F: Float>(
    kernel: &impl CovarianceModel<F>,
    a_epochs: &ArrayBase<impl Data<Elem = F>, Ix1>,
    a_channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
    b_epochs: &ArrayBase<impl Data<Elem = F>, Ix1>,
    b_channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
) -> Result<Array2<F>> {
    check_points(kernel, a_epochs, a_channels)?;
    check_points(kernel, b_epochs, b_channels)?;
    let (b_epochs, b_channels) = (b_epochs.view(), b_channels.view());
    let mut cross = Array2::zeros((a_epochs.len(), b_epochs.len()));
    Zip::from(cross.rows_mut())
        .and(a_epochs)
        .and(a_channels)
        .par_for_each(|mut row, &ti, &ci| {
            Zip::from(&mut row)
                .and(&b_epochs)
                .and(&b_channels)
                .for_each(|k, &tj, &cj| *k = kernel.value(ti, ci, tj, cj));
        });
    Ok(cross)
}

/// Zero lag variance at each point
pub fn prior_variance<F: Float>(
    kernel: &impl CovarianceModel<F>,
    epochs: &ArrayBase<impl Data<Elem = F>, Ix1>,
    channels: &ArrayBase<impl Data<Elem = usize>, Ix1>,
) -> Result<Array1<F>> {
    check_points(kernel, epochs, channels)?;
    Ok(channels.mapv(|c| kernel.variance(c)))
}
