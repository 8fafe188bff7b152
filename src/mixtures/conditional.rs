//! Conditional (covariate-dependent) Gaussian mixture estimation.
//!
//! Purpose
//! -------
//! Like the finite mixture, but the mixing weights are a multinomial-logit
//! function of a per-observation design row: component `k` gets weight
//! proportional to `exp(x_i' gamma_k)`, with the last component's
//! coefficient vector pinned to zero as the reference. Latent assignments
//! and component parameters keep their conjugate Gibbs updates; the logit
//! coefficients move by random-walk Metropolis within Gibbs.
//!
//! Key behaviors
//! -------------
//! - The Metropolis step updates one component's coefficient vector at a
//!   time against the current assignments, with a caller-supplied Gaussian
//!   prior applied to every free coordinate.
//! - Acceptance statistics are recorded so callers can judge the proposal
//!   scale.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::mixtures::errors::{MixtureError, MixtureResult};
use crate::mixtures::finite::{
    draw_from_log_weights, validate_known_source, GaussianComponent,
};
use crate::rng::seed_rng;
use crate::statespace::core::component::CoefficientPrior;

/// Recorded draw history from one conditional-mixture chain.
#[derive(Debug, Clone)]
pub struct ConditionalMixtureFit {
    means: Array2<f64>,
    variances: Array2<f64>,
    coefficients: Array2<f64>,
    acceptance_rate: f64,
}

impl ConditionalMixtureFit {
    /// Component-mean draws, one row per iteration.
    pub fn mean_draws(&self) -> &Array2<f64> {
        &self.means
    }

    /// Component-variance draws, one row per iteration.
    pub fn variance_draws(&self) -> &Array2<f64> {
        &self.variances
    }

    /// Logit-coefficient draws, one row per iteration; columns are the
    /// non-reference components' vectors concatenated in component order.
    pub fn coefficient_draws(&self) -> &Array2<f64> {
        &self.coefficients
    }

    /// Fraction of Metropolis proposals accepted across the chain.
    pub fn acceptance_rate(&self) -> f64 {
        self.acceptance_rate
    }
}

/// Per-observation log mixing weights (normalized) for the current
/// coefficients. `gamma` is `k x p` with the last row identically zero.
fn log_mixing_weights(x: ArrayView1<'_, f64>, gamma: &Array2<f64>) -> Array1<f64> {
    let mut logits = gamma.dot(&x);
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let log_norm = logits.iter().map(|&v| (v - max).exp()).sum::<f64>().ln() + max;
    logits -= log_norm;
    logits
}

/// Log target for one coefficient configuration: assignment likelihood
/// plus the Gaussian prior on the free (non-reference) rows.
fn coefficient_log_target(
    design: ArrayView2<'_, f64>, assignments: &[usize], gamma: &Array2<f64>,
    mixing_prior: &CoefficientPrior,
) -> f64 {
    let mut total = 0.0;
    for (row, &z) in design.rows().into_iter().zip(assignments) {
        total += log_mixing_weights(row, gamma)[z];
    }
    let free = gamma.nrows().saturating_sub(1);
    let prior_scale = 0.5 / (mixing_prior.sd() * mixing_prior.sd());
    let penalty: f64 = gamma
        .slice(s![..free, ..])
        .iter()
        .map(|&g| {
            let centered = g - mixing_prior.mean();
            centered * centered
        })
        .sum();
    total - penalty * prior_scale
}

/// Fit a covariate-dependent Gaussian mixture by Metropolis-within-Gibbs.
///
/// `design` is `n x p`, one row per observation; `mixing_prior` is the
/// Gaussian prior applied to every free logit coefficient; `proposal_sd`
/// scales the random-walk proposal on those coefficients. Remaining
/// arguments as in [`crate::mixtures::finite::fit_finite_mixture`].
///
/// # Errors
/// Configuration errors before the first iteration; numerical failures
/// abort the chain.
#[allow(clippy::too_many_arguments)]
pub fn fit_conditional_mixture(
    data: &[f64], design: ArrayView2<'_, f64>, mut components: Vec<GaussianComponent>,
    mixing_prior: CoefficientPrior, proposal_sd: f64, niter: usize, ping: usize,
    known_source: Option<&[Option<usize>]>, seed: u64,
) -> MixtureResult<ConditionalMixtureFit> {
    if data.is_empty() {
        return Err(MixtureError::EmptyData);
    }
    if components.is_empty() {
        return Err(MixtureError::NoComponents);
    }
    if design.nrows() != data.len() {
        return Err(MixtureError::DimensionMismatch {
            what: "design matrix rows",
            expected: data.len(),
            actual: design.nrows(),
        });
    }
    if !(proposal_sd.is_finite() && proposal_sd > 0.0) {
        return Err(MixtureError::InvalidPrior {
            what: "metropolis proposal sd",
            value: proposal_sd,
        });
    }
    if niter == 0 {
        return Err(MixtureError::InvalidOption {
            name: "niter",
            reason: "must be positive".to_string(),
        });
    }
    let k = components.len();
    let p = design.ncols();
    validate_known_source(known_source, data.len(), k)?;

    let mut rng = seed_rng(seed);
    let mut gamma = Array2::<f64>::zeros((k, p));
    let mut assignments = vec![0usize; data.len()];
    let mut mean_draws = Array2::<f64>::zeros((niter, k));
    let mut variance_draws = Array2::<f64>::zeros((niter, k));
    let free = k.saturating_sub(1);
    let mut coefficient_draws = Array2::<f64>::zeros((niter, free * p));
    let mut accepted = 0usize;
    let mut proposed = 0usize;

    let mut log_weights = vec![0.0; k];
    for iteration in 0..niter {
        if ping > 0 && iteration % ping == 0 {
            log::info!("conditional mixture iteration {iteration} of {niter}");
        }

        // Latent assignments given (gamma, components).
        let mut assigned: Vec<Vec<f64>> = vec![Vec::new(); k];
        for (i, &y) in data.iter().enumerate() {
            let source = match known_source.and_then(|known| known[i]) {
                Some(pinned) => pinned,
                None => {
                    let log_mix = log_mixing_weights(design.row(i), &gamma);
                    for ((slot, component), &lw) in
                        log_weights.iter_mut().zip(&components).zip(&log_mix)
                    {
                        *slot = component.ln_density(y) + lw;
                    }
                    draw_from_log_weights(&mut rng, &mut log_weights)?
                }
            };
            assignments[i] = source;
            assigned[source].push(y);
        }

        // Component parameters.
        for (component, bucket) in components.iter_mut().zip(&assigned) {
            component.posterior_draw(&mut rng, bucket)?;
        }

        // Random-walk Metropolis on each non-reference coefficient vector.
        let mut current_target =
            coefficient_log_target(design, &assignments, &gamma, &mixing_prior);
        for component in 0..free {
            let mut proposal = gamma.clone();
            for j in 0..p {
                let step: f64 = rng.sample(StandardNormal);
                proposal[(component, j)] += proposal_sd * step;
            }
            let proposal_target =
                coefficient_log_target(design, &assignments, &proposal, &mixing_prior);
            proposed += 1;
            if (proposal_target - current_target) > rng.random::<f64>().ln() {
                gamma = proposal;
                current_target = proposal_target;
                accepted += 1;
            }
        }

        // Record.
        for (j, component) in components.iter().enumerate() {
            mean_draws[(iteration, j)] = component.mean();
            variance_draws[(iteration, j)] = component.sigsq();
        }
        if free > 0 {
            let flat: Vec<f64> = gamma.slice(s![..free, ..]).iter().copied().collect();
            coefficient_draws
                .row_mut(iteration)
                .assign(&Array1::from_vec(flat));
        }
    }

    Ok(ConditionalMixtureFit {
        means: mean_draws,
        variances: variance_draws,
        coefficients: coefficient_draws,
        acceptance_rate: if proposed == 0 { 0.0 } else { accepted as f64 / proposed as f64 },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statespace::core::component::VariancePrior;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Configuration validation specific to the conditional variant
    //   (design shape, proposal scale).
    // - Sign recovery of the logit coefficient when the covariate cleanly
    //   separates two anchored clusters.
    // - The mixing-distribution prior actually regularizing the logit
    //   coefficients.
    //
    // They intentionally DO NOT cover:
    // - Proposal-scale tuning diagnostics beyond the acceptance rate.
    // -------------------------------------------------------------------------

    fn component(mean: f64) -> GaussianComponent {
        GaussianComponent::new(
            mean,
            1.0,
            mean,
            10.0,
            VariancePrior::new(1.0, 1.0).expect("valid prior"),
        )
        .expect("valid component")
    }

    fn diffuse_mixing_prior() -> CoefficientPrior {
        CoefficientPrior::new(0.0, 10.0).expect("valid mixing prior")
    }

    #[test]
    // Purpose
    // -------
    // Design-shape and proposal-scale violations fail before sampling.
    //
    // Given
    // -----
    // - A 2-row design for 3 observations; a zero proposal sd.
    //
    // Expect
    // ------
    // - DimensionMismatch, then InvalidPrior.
    fn configuration_validation() {
        let data = [0.0, 1.0, 2.0];
        let short_design = Array2::<f64>::ones((2, 1));
        assert!(matches!(
            fit_conditional_mixture(
                &data,
                short_design.view(),
                vec![component(0.0), component(1.0)],
                diffuse_mixing_prior(),
                0.5,
                5,
                0,
                None,
                1
            ),
            Err(MixtureError::DimensionMismatch { .. })
        ));
        let design = Array2::<f64>::ones((3, 1));
        assert!(matches!(
            fit_conditional_mixture(
                &data,
                design.view(),
                vec![component(0.0), component(1.0)],
                diffuse_mixing_prior(),
                0.0,
                5,
                0,
                None,
                1
            ),
            Err(MixtureError::InvalidPrior { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // When the covariate perfectly separates two anchored clusters, the
    // free logit coefficient turns decisively positive for the component
    // the positive covariate selects.
    //
    // Given
    // -----
    // - 30 observations near +5 with x = +1 pinned sparsely to component
    //   0, 30 near -5 with x = -1, 300 iterations, proposal sd 0.8.
    //
    // Expect
    // ------
    // - Posterior mean of the coefficient above 0.5; acceptance rate
    //   strictly inside (0, 1); component means near +/-5.
    fn recovers_covariate_link() {
        let mut data = Vec::new();
        let mut design_rows = Vec::new();
        let mut known = Vec::new();
        for i in 0..30 {
            data.push(5.0 + 0.1 * (i as f64 * 0.3).sin());
            design_rows.push(1.0);
            known.push(if i == 0 { Some(0) } else { None });
        }
        for i in 0..30 {
            data.push(-5.0 + 0.1 * (i as f64 * 0.4).cos());
            design_rows.push(-1.0);
            known.push(if i == 0 { Some(1) } else { None });
        }
        let design = Array2::from_shape_vec((60, 1), design_rows).expect("rectangular");

        let fit = fit_conditional_mixture(
            &data,
            design.view(),
            vec![component(4.0), component(-4.0)],
            diffuse_mixing_prior(),
            0.8,
            300,
            0,
            Some(&known),
            7,
        )
        .expect("chain runs");

        let niter = fit.coefficient_draws().nrows() as f64;
        let coefficient = fit.coefficient_draws().column(0).sum() / niter;
        assert!(coefficient > 0.5, "logit coefficient averaged {coefficient}");
        assert!(fit.acceptance_rate() > 0.0 && fit.acceptance_rate() < 1.0);

        let mean0 = fit.mean_draws().column(0).sum() / niter;
        let mean1 = fit.mean_draws().column(1).sum() / niter;
        assert!((mean0 - 5.0).abs() < 0.5);
        assert!((mean1 + 5.0).abs() < 0.5);
    }

    #[test]
    // Purpose
    // -------
    // The mixing-distribution prior must regularize the free logit
    // coefficients: a near-degenerate prior pins them at its mean even
    // when the data strongly favor a large coefficient.
    //
    // Given
    // -----
    // - The same cleanly separated +/-5 clusters as above, fit twice with
    //   identical seeds: once under a diffuse prior (sd 10) and once
    //   under a tight zero-centered prior (sd 0.05).
    //
    // Expect
    // ------
    // - The diffuse-prior posterior mean coefficient exceeds 0.5, while
    //   the tight-prior one stays below 0.3 in magnitude.
    fn mixing_prior_shrinks_logit_coefficients() {
        let mut data = Vec::new();
        let mut design_rows = Vec::new();
        let mut known = Vec::new();
        for i in 0..30 {
            data.push(5.0 + 0.1 * (i as f64 * 0.3).sin());
            design_rows.push(1.0);
            known.push(if i == 0 { Some(0) } else { None });
        }
        for i in 0..30 {
            data.push(-5.0 + 0.1 * (i as f64 * 0.4).cos());
            design_rows.push(-1.0);
            known.push(if i == 0 { Some(1) } else { None });
        }
        let design = Array2::from_shape_vec((60, 1), design_rows).expect("rectangular");

        let posterior_mean = |prior: CoefficientPrior| {
            let fit = fit_conditional_mixture(
                &data,
                design.view(),
                vec![component(4.0), component(-4.0)],
                prior,
                0.8,
                300,
                0,
                Some(&known),
                7,
            )
            .expect("chain runs");
            let niter = fit.coefficient_draws().nrows() as f64;
            fit.coefficient_draws().column(0).sum() / niter
        };

        let diffuse = posterior_mean(diffuse_mixing_prior());
        let tight = posterior_mean(CoefficientPrior::new(0.0, 0.05).expect("valid mixing prior"));
        assert!(diffuse > 0.5, "diffuse-prior coefficient averaged {diffuse}");
        assert!(tight.abs() < 0.3, "tight-prior coefficient averaged {tight}");
    }
}
