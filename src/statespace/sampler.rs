//! Posterior sampling driver for the Student state-space model.
//!
//! Purpose
//! -------
//! Own the MCMC loop: seed a reproducible generator, alternate the model's
//! state-imputation sweep with its parameter sweep, and record the draw
//! history callers summarize afterwards. Progress reporting goes through
//! the `log` facade so embedding applications choose the sink.
//!
//! Conventions
//! -----------
//! - Recorded parameter vectors use the minimal vectorization, so fixed
//!   quantities (loadings, tail thickness) never pad the draw matrix.
//! - `ping = 0` disables progress reporting entirely.
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;

use crate::params::Vectorize;
use crate::rng::{seed_rng, SsmRng};
use crate::statespace::errors::{SsmError, SsmResult};
use crate::statespace::models::student_mvss::StudentMvssModel;

/// Validated sampler configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerOptions {
    niter: usize,
    burn_in: usize,
    ping: usize,
    seed: u64,
}

impl SamplerOptions {
    /// Construct validated options. `ping` is the reporting stride in
    /// iterations (0 for silence); `burn_in` iterations run but are not
    /// recorded.
    ///
    /// # Errors
    /// [`SsmError::InvalidOption`] if `niter` is zero or does not exceed
    /// `burn_in`.
    pub fn new(niter: usize, burn_in: usize, ping: usize, seed: u64) -> SsmResult<Self> {
        if niter == 0 {
            return Err(SsmError::InvalidOption {
                name: "niter",
                reason: "must be positive".to_string(),
            });
        }
        if burn_in >= niter {
            return Err(SsmError::InvalidOption {
                name: "burn_in",
                reason: format!("must be below niter = {niter}, got {burn_in}"),
            });
        }
        Ok(Self { niter, burn_in, ping, seed })
    }

    /// Total iterations.
    pub fn niter(&self) -> usize {
        self.niter
    }

    /// Unrecorded warm-up iterations.
    pub fn burn_in(&self) -> usize {
        self.burn_in
    }

    /// Reporting stride (0 = silent).
    pub fn ping(&self) -> usize {
        self.ping
    }

    /// Seed for the sampler's generator.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// Recorded draw history from one sampler run.
#[derive(Debug, Clone)]
pub struct SamplerOutput {
    parameters: Array2<f64>,
    loglik: Array1<f64>,
}

impl SamplerOutput {
    /// Recorded parameter draws, one row per retained iteration, columns
    /// in the model's minimal vectorization order.
    pub fn parameter_draws(&self) -> &Array2<f64> {
        &self.parameters
    }

    /// Conditional log likelihood per retained iteration.
    pub fn loglik(&self) -> ArrayView1<'_, f64> {
        self.loglik.view()
    }

    /// Number of retained iterations.
    pub fn ndraws(&self) -> usize {
        self.parameters.nrows()
    }

    /// Posterior mean of each recorded parameter.
    pub fn posterior_mean(&self) -> Array1<f64> {
        let n = self.parameters.nrows().max(1) as f64;
        self.parameters.sum_axis(ndarray::Axis(0)) / n
    }
}

/// The MCMC driver. Borrows the model for the duration of the run.
pub struct PosteriorSampler<'a> {
    model: &'a mut StudentMvssModel,
    options: SamplerOptions,
    rng: SsmRng,
}

impl<'a> PosteriorSampler<'a> {
    /// Pair a model with validated options and a freshly seeded generator.
    pub fn new(model: &'a mut StudentMvssModel, options: SamplerOptions) -> Self {
        let rng = seed_rng(options.seed());
        Self { model, options, rng }
    }

    /// Run the full chain and return the retained draw history.
    ///
    /// # Errors
    /// Propagates sweep failures from the model; a failed iteration aborts
    /// the run rather than recording a partial draw.
    pub fn run(&mut self) -> SsmResult<SamplerOutput> {
        let niter = self.options.niter();
        let burn_in = self.options.burn_in();
        let retained = niter - burn_in;
        let width = self.model.parameter_count(true);
        let mut parameters = Array2::<f64>::zeros((retained, width));
        let mut loglik = Array1::<f64>::zeros(retained);

        for iteration in 0..niter {
            self.report_progress(iteration);
            self.model.impute_state(&mut self.rng)?;
            self.model.draw_parameters(&mut self.rng)?;
            if iteration >= burn_in {
                let row = iteration - burn_in;
                parameters.row_mut(row).assign(&self.model.vectorize(true));
                loglik[row] = self.model.log_likelihood()?;
            }
        }
        Ok(SamplerOutput { parameters, loglik })
    }

    /// Draw `ndraws` posterior-predictive forecast panels, one per retained
    /// draw request, continuing the sampler's generator stream.
    ///
    /// # Errors
    /// Propagates forecast failures.
    pub fn forecast_draws(
        &mut self, ndraws: usize, horizon: usize, predictors: ndarray::ArrayView2<'_, f64>,
    ) -> SsmResult<Vec<Array2<f64>>> {
        let mut draws = Vec::with_capacity(ndraws);
        for _ in 0..ndraws {
            self.model.impute_state(&mut self.rng)?;
            self.model.draw_parameters(&mut self.rng)?;
            draws.push(self.model.simulate_forecast(&mut self.rng, horizon, predictors)?);
        }
        Ok(draws)
    }

    fn report_progress(&self, iteration: usize) {
        let ping = self.options.ping();
        if ping > 0 && iteration % ping == 0 {
            log::info!(
                "posterior sampling iteration {} of {}",
                iteration,
                self.options.niter()
            );
        }
    }
}

/// Convenience: run one chain over a model with default reporting.
///
/// # Errors
/// Propagates option validation and sweep failures.
pub fn sample_posterior(
    model: &mut StudentMvssModel, niter: usize, burn_in: usize, seed: u64,
) -> SsmResult<SamplerOutput> {
    let options = SamplerOptions::new(niter, burn_in, 100, seed)?;
    PosteriorSampler::new(model, options).run()
}
