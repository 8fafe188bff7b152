//! Latent variance-weight augmentation for Student-t observation errors.
//!
//! Purpose
//! -------
//! Express each series' Student-t error as a Gaussian scale mixture: a
//! latent weight `w ~ Gamma(nu/2, nu/2)` divides the Gaussian variance, so
//! conditional on `w` the observation error is `N(0, sigsq / w)`. This
//! module draws the weights from their full conditional given the current
//! residuals, which is what turns the heavy-tailed model into a sequence of
//! weighted-Gaussian updates downstream.
//!
//! Key behaviors
//! -------------
//! - The full conditional for one cell with standardized residual `z` is
//!   `Gamma((nu + 1) / 2, (nu + z^2) / 2)` (shape, rate).
//! - Missing cells keep weight 1, so they contribute nothing to the
//!   weighted sufficient statistics.
//!
//! Invariants & assumptions
//! ------------------------
//! - `nu` is fixed per series (no hyperprior); callers validate it once at
//!   model assembly, this module re-validates defensively at the boundary.
//! - Residuals passed in are already net of every state contribution and
//!   the regression effect.
use ndarray::{Array1, ArrayView1};
use rand::Rng;

use crate::statespace::core::draws::draw_gamma;
use crate::statespace::errors::{SsmError, SsmResult};

/// Draw one latent weight from its full conditional.
///
/// `residual` is the raw (unstandardized) residual; `sigsq` the series'
/// Gaussian-scale variance; `nu` the fixed tail thickness.
///
/// # Errors
/// - [`SsmError::InvalidDegreesOfFreedom`] if `nu` is not strictly positive.
/// - [`SsmError::InvalidVariance`] if `sigsq` is not strictly positive.
pub fn draw_student_weight<R: Rng>(
    rng: &mut R, residual: f64, sigsq: f64, nu: f64,
) -> SsmResult<f64> {
    if !(nu.is_finite() && nu > 0.0) {
        return Err(SsmError::InvalidDegreesOfFreedom { value: nu });
    }
    if !(sigsq.is_finite() && sigsq > 0.0) {
        return Err(SsmError::InvalidVariance { what: "student weight sigsq", value: sigsq });
    }
    let z2 = residual * residual / sigsq;
    draw_gamma(rng, 0.5 * (nu + 1.0), 0.5 * (nu + z2))
}

/// Draw the weight vector for one series from the per-cell full
/// conditionals. `observed` masks cells that should keep weight 1.
///
/// # Errors
/// - [`SsmError::DimensionMismatch`] if the mask and residual lengths
///   differ.
/// - Propagates the per-cell validation from [`draw_student_weight`].
pub fn impute_series_weights<R: Rng>(
    rng: &mut R, residuals: ArrayView1<'_, f64>, observed: &[bool], sigsq: f64, nu: f64,
) -> SsmResult<Array1<f64>> {
    if residuals.len() != observed.len() {
        return Err(SsmError::DimensionMismatch {
            what: "student weight residuals vs observation mask",
            expected: observed.len(),
            actual: residuals.len(),
        });
    }
    let mut weights = Array1::<f64>::ones(residuals.len());
    for (t, (&residual, &is_observed)) in residuals.iter().zip(observed).enumerate() {
        if is_observed {
            weights[t] = draw_student_weight(rng, residual, sigsq, nu)?;
        }
    }
    Ok(weights)
}
