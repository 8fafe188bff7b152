//! Finite Gaussian mixture estimation by Gibbs sampling.
//!
//! Purpose
//! -------
//! Fit a univariate Gaussian mixture with a Dirichlet prior on the mixing
//! weights: alternate latent component assignments, the mixing-weight draw,
//! and conjugate per-component mean/variance draws. Observations with a
//! known source keep their pinned assignment throughout, which both
//! sharpens the posterior and anchors component labels.
//!
//! Key behaviors
//! -------------
//! - Assignment draws are computed in log space with a max shift, so widely
//!   separated components never underflow to an all-zero weight vector.
//! - Every shape and prior is validated before the first iteration; the
//!   chain never starts on inconsistent inputs.
use ndarray::{Array1, Array2};
use rand::Rng;

use crate::mixtures::errors::{MixtureError, MixtureResult};
use crate::rng::seed_rng;
use crate::statespace::core::component::VariancePrior;
use crate::statespace::core::draws::{draw_categorical, draw_dirichlet};
use crate::statespace::errors::SsmError;

/// One univariate Gaussian mixture component with conjugate priors.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianComponent {
    mean: f64,
    sigsq: f64,
    prior_mean: f64,
    prior_sd: f64,
    variance_prior: VariancePrior,
}

impl GaussianComponent {
    /// Construct a validated component.
    ///
    /// # Errors
    /// [`MixtureError::InvalidPrior`] for a non-positive `sigsq` or
    /// `prior_sd`.
    pub fn new(
        mean: f64, sigsq: f64, prior_mean: f64, prior_sd: f64, variance_prior: VariancePrior,
    ) -> MixtureResult<Self> {
        if !(sigsq.is_finite() && sigsq > 0.0) {
            return Err(MixtureError::InvalidPrior { what: "component sigsq", value: sigsq });
        }
        if !(prior_sd.is_finite() && prior_sd > 0.0) {
            return Err(MixtureError::InvalidPrior { what: "component prior sd", value: prior_sd });
        }
        Ok(Self { mean, sigsq, prior_mean, prior_sd, variance_prior })
    }

    /// The component mean.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// The component variance.
    pub fn sigsq(&self) -> f64 {
        self.sigsq
    }

    /// Log density of one observation under the component.
    pub fn ln_density(&self, y: f64) -> f64 {
        let z = y - self.mean;
        -0.5 * ((2.0 * std::f64::consts::PI * self.sigsq).ln() + z * z / self.sigsq)
    }

    /// Conjugate Gibbs update of `(mean, sigsq)` given the observations
    /// currently assigned to this component.
    ///
    /// # Errors
    /// Propagates draw failures from the shared numerical core.
    pub fn posterior_draw<R: Rng>(&mut self, rng: &mut R, assigned: &[f64]) -> Result<(), SsmError> {
        use rand_distr::{Distribution, Normal};

        let n = assigned.len() as f64;
        let sum: f64 = assigned.iter().sum();
        let prior_precision = 1.0 / (self.prior_sd * self.prior_sd);
        let posterior_precision = prior_precision + n / self.sigsq;
        let posterior_mean =
            (self.prior_mean * prior_precision + sum / self.sigsq) / posterior_precision;
        let posterior_sd = (1.0 / posterior_precision).sqrt();
        let normal = Normal::new(posterior_mean, posterior_sd).map_err(|_| {
            SsmError::InvalidVariance { what: "component posterior sd", value: posterior_sd }
        })?;
        self.mean = normal.sample(rng);

        let sse: f64 = assigned.iter().map(|&y| (y - self.mean) * (y - self.mean)).sum();
        self.sigsq = self.variance_prior.posterior_draw(rng, sse, assigned.len())?;
        Ok(())
    }
}

/// Recorded draw history from one finite-mixture chain.
#[derive(Debug, Clone)]
pub struct FiniteMixtureFit {
    mixing_weights: Array2<f64>,
    means: Array2<f64>,
    variances: Array2<f64>,
    loglik: Array1<f64>,
}

impl FiniteMixtureFit {
    /// Mixing-weight draws, one row per iteration.
    pub fn mixing_weight_draws(&self) -> &Array2<f64> {
        &self.mixing_weights
    }

    /// Component-mean draws, one row per iteration.
    pub fn mean_draws(&self) -> &Array2<f64> {
        &self.means
    }

    /// Component-variance draws, one row per iteration.
    pub fn variance_draws(&self) -> &Array2<f64> {
        &self.variances
    }

    /// Mixture log likelihood per iteration.
    pub fn loglik(&self) -> &Array1<f64> {
        &self.loglik
    }
}

pub(crate) fn validate_known_source(
    known_source: Option<&[Option<usize>]>, ndata: usize, ncomponents: usize,
) -> MixtureResult<()> {
    if let Some(known) = known_source {
        if known.len() != ndata {
            return Err(MixtureError::KnownSourceLengthMismatch {
                expected: ndata,
                actual: known.len(),
            });
        }
        for source in known.iter().flatten() {
            if *source >= ncomponents {
                return Err(MixtureError::KnownSourceOutOfRange {
                    index: *source,
                    ncomponents,
                });
            }
        }
    }
    Ok(())
}

pub(crate) fn validate_concentrations(
    concentrations: &Array1<f64>, ncomponents: usize, what: &'static str,
) -> MixtureResult<()> {
    if concentrations.len() != ncomponents {
        return Err(MixtureError::DimensionMismatch {
            what,
            expected: ncomponents,
            actual: concentrations.len(),
        });
    }
    for &a in concentrations {
        if !(a.is_finite() && a > 0.0) {
            return Err(MixtureError::InvalidPrior { what, value: a });
        }
    }
    Ok(())
}

/// Draw one categorical assignment from unnormalized log weights.
pub(crate) fn draw_from_log_weights<R: Rng>(
    rng: &mut R, log_weights: &mut [f64],
) -> Result<usize, SsmError> {
    let max = log_weights.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    for w in log_weights.iter_mut() {
        *w = (*w - max).exp();
    }
    draw_categorical(rng, Array1::from_vec(log_weights.to_vec()).view())
}

/// Fit a finite Gaussian mixture by Gibbs sampling.
///
/// `mixing_prior` holds the Dirichlet concentrations; `known_source`
/// optionally pins per-observation assignments; `ping` is the reporting
/// stride (0 for silence); `seed` seeds this call's random stream.
///
/// # Errors
/// Configuration errors before the first iteration; numerical failures
/// abort the chain.
#[allow(clippy::too_many_arguments)]
pub fn fit_finite_mixture(
    data: &[f64], mut components: Vec<GaussianComponent>, mixing_prior: Array1<f64>,
    niter: usize, ping: usize, known_source: Option<&[Option<usize>]>, seed: u64,
) -> MixtureResult<FiniteMixtureFit> {
    if data.is_empty() {
        return Err(MixtureError::EmptyData);
    }
    if components.is_empty() {
        return Err(MixtureError::NoComponents);
    }
    if niter == 0 {
        return Err(MixtureError::InvalidOption {
            name: "niter",
            reason: "must be positive".to_string(),
        });
    }
    let k = components.len();
    validate_concentrations(&mixing_prior, k, "mixing prior concentrations")?;
    validate_known_source(known_source, data.len(), k)?;

    let mut rng = seed_rng(seed);
    let mut mixing = Array1::from_elem(k, 1.0 / k as f64);
    let mut mixing_draws = Array2::<f64>::zeros((niter, k));
    let mut mean_draws = Array2::<f64>::zeros((niter, k));
    let mut variance_draws = Array2::<f64>::zeros((niter, k));
    let mut loglik = Array1::<f64>::zeros(niter);

    let mut log_weights = vec![0.0; k];
    for iteration in 0..niter {
        if ping > 0 && iteration % ping == 0 {
            log::info!("finite mixture iteration {iteration} of {niter}");
        }

        // Latent assignments.
        let mut assigned: Vec<Vec<f64>> = vec![Vec::new(); k];
        for (i, &y) in data.iter().enumerate() {
            let source = match known_source.and_then(|known| known[i]) {
                Some(pinned) => pinned,
                None => {
                    for (slot, component) in log_weights.iter_mut().zip(&components) {
                        *slot = component.ln_density(y);
                    }
                    for (slot, &pi) in log_weights.iter_mut().zip(&mixing) {
                        *slot += pi.ln();
                    }
                    draw_from_log_weights(&mut rng, &mut log_weights)?
                }
            };
            assigned[source].push(y);
        }

        // Mixing weights.
        let posterior_concentration = Array1::from_iter(
            mixing_prior.iter().zip(&assigned).map(|(&a, bucket)| a + bucket.len() as f64),
        );
        mixing = draw_dirichlet(&mut rng, posterior_concentration.view())
            .map_err(MixtureError::from)?;

        // Component parameters.
        for (component, bucket) in components.iter_mut().zip(&assigned) {
            component.posterior_draw(&mut rng, bucket)?;
        }

        // Record.
        for (j, component) in components.iter().enumerate() {
            mixing_draws[(iteration, j)] = mixing[j];
            mean_draws[(iteration, j)] = component.mean();
            variance_draws[(iteration, j)] = component.sigsq();
        }
        loglik[iteration] = data
            .iter()
            .map(|&y| {
                let total: f64 = components
                    .iter()
                    .zip(&mixing)
                    .map(|(component, &pi)| pi * component.ln_density(y).exp())
                    .sum();
                total.ln()
            })
            .sum();
    }

    Ok(FiniteMixtureFit {
        mixing_weights: mixing_draws,
        means: mean_draws,
        variances: variance_draws,
        loglik,
    })
}
