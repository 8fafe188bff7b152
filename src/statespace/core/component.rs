//! State components: the additive building blocks of the latent state.
//!
//! Purpose
//! -------
//! Define [`StateComponent`], the closed set of latent-state building blocks
//! (local level, first-order autoregression) with the fixed capability set
//! the rest of the engine relies on: state/error dimension, transition and
//! observation operators, an initial-state distribution, a conjugate
//! posterior-draw step, and flat parameter I/O via [`Vectorize`].
//!
//! Key behaviors
//! -------------
//! - Each variant owns its parameters and priors; parameters are mutated
//!   only by that variant's own `draw_parameters` step.
//! - Per-series loading weights scale the component's contribution to each
//!   observed series; a length-1 loading vector means "loading 1 semantics"
//!   for whichever single series drives the component (the series-specific
//!   case). Loadings are fixed coefficients, not sampled.
//! - `observe_time_dimension` is monotonic and idempotent: the stored time
//!   dimension only ever grows.
//!
//! Invariants & assumptions
//! ------------------------
//! - Dimensions are fixed after construction.
//! - Innovation variances are finite and strictly positive; AR coefficients
//!   satisfy |phi| < 1. Violations at construction or `unvectorize` are
//!   configuration errors.
//! - The transition and error-variance operators are time-invariant for the
//!   variants here; the capability set still threads `t` through so
//!   time-varying variants can join the closed set without changing
//!   call sites.
//!
//! Conventions
//! -----------
//! - `sigsq` names an innovation variance throughout, matching the variance
//!   prior's guess-on-the-standard-deviation convention.
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::params::Vectorize;
use crate::statespace::core::draws::draw_inverse_gamma;
use crate::statespace::errors::{SsmError, SsmResult};

/// Attempts at drawing a stationary AR coefficient before keeping the
/// current value.
const AR_REJECTION_LIMIT: usize = 100;

/// Inverse-Gamma prior on an innovation variance, parameterized by a prior
/// sample size (`prior_df`) and a prior guess at the standard deviation.
///
/// `sigsq ~ InverseGamma(prior_df / 2, prior_df * prior_guess^2 / 2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariancePrior {
    prior_df: f64,
    prior_guess: f64,
}

impl VariancePrior {
    /// Construct a validated variance prior.
    ///
    /// # Errors
    /// [`SsmError::InvalidVariance`] if either parameter is non-finite or
    /// non-positive.
    pub fn new(prior_df: f64, prior_guess: f64) -> SsmResult<Self> {
        if !(prior_df.is_finite() && prior_df > 0.0) {
            return Err(SsmError::InvalidVariance { what: "variance prior df", value: prior_df });
        }
        if !(prior_guess.is_finite() && prior_guess > 0.0) {
            return Err(SsmError::InvalidVariance {
                what: "variance prior guess",
                value: prior_guess,
            });
        }
        Ok(Self { prior_df, prior_guess })
    }

    /// Prior sample size.
    pub fn prior_df(&self) -> f64 {
        self.prior_df
    }

    /// Prior guess at the standard deviation.
    pub fn prior_guess(&self) -> f64 {
        self.prior_guess
    }

    /// Draw `sigsq | data` from the conjugate full conditional given a
    /// residual sum of squares over `n` innovations.
    pub fn posterior_draw<R: Rng>(
        &self, rng: &mut R, sum_of_squares: f64, n: usize,
    ) -> SsmResult<f64> {
        let shape = 0.5 * (self.prior_df + n as f64);
        let rate = 0.5 * (self.prior_df * self.prior_guess * self.prior_guess + sum_of_squares);
        draw_inverse_gamma(rng, shape, rate)
    }
}

/// Gaussian prior on a scalar coefficient (the AR coefficient here).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoefficientPrior {
    mean: f64,
    sd: f64,
}

impl CoefficientPrior {
    /// Construct a validated coefficient prior.
    ///
    /// # Errors
    /// [`SsmError::InvalidVariance`] if `sd` is non-finite or non-positive,
    /// [`SsmError::NonFiniteValue`] if `mean` is non-finite.
    pub fn new(mean: f64, sd: f64) -> SsmResult<Self> {
        if !mean.is_finite() {
            return Err(SsmError::NonFiniteValue { context: "coefficient prior mean", value: mean });
        }
        if !(sd.is_finite() && sd > 0.0) {
            return Err(SsmError::InvalidVariance { what: "coefficient prior sd", value: sd });
        }
        Ok(Self { mean, sd })
    }

    /// The prior mean.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// The prior standard deviation.
    pub fn sd(&self) -> f64 {
        self.sd
    }

    fn precision(&self) -> f64 {
        1.0 / (self.sd * self.sd)
    }
}

/// Local-level (random-walk) component: `mu[t+1] = mu[t] + eta[t]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalLevelComponent {
    sigsq: f64,
    loadings: Array1<f64>,
    initial_mean: f64,
    initial_variance: f64,
    prior: VariancePrior,
    time_dimension: usize,
}

impl LocalLevelComponent {
    /// Construct a validated local-level component with loading 1.
    ///
    /// # Errors
    /// [`SsmError::InvalidVariance`] for a non-positive `sigsq` or
    /// `initial_variance`.
    pub fn new(
        sigsq: f64, initial_mean: f64, initial_variance: f64, prior: VariancePrior,
    ) -> SsmResult<Self> {
        if !(sigsq.is_finite() && sigsq > 0.0) {
            return Err(SsmError::InvalidVariance { what: "local level sigsq", value: sigsq });
        }
        if !(initial_variance.is_finite() && initial_variance > 0.0) {
            return Err(SsmError::InvalidVariance {
                what: "local level initial variance",
                value: initial_variance,
            });
        }
        Ok(Self {
            sigsq,
            loadings: Array1::ones(1),
            initial_mean,
            initial_variance,
            prior,
            time_dimension: 0,
        })
    }

    /// The innovation variance.
    pub fn sigsq(&self) -> f64 {
        self.sigsq
    }
}

/// Stationary AR(1) component: `a[t+1] = phi * a[t] + eta[t]`, |phi| < 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Ar1Component {
    phi: f64,
    sigsq: f64,
    loadings: Array1<f64>,
    variance_prior: VariancePrior,
    coefficient_prior: CoefficientPrior,
    time_dimension: usize,
}

impl Ar1Component {
    /// Construct a validated stationary AR(1) component with loading 1.
    ///
    /// The initial-state distribution is the stationary distribution
    /// `N(0, sigsq / (1 - phi^2))`.
    ///
    /// # Errors
    /// - [`SsmError::NonStationaryCoefficient`] if `|phi| >= 1`.
    /// - [`SsmError::InvalidVariance`] if `sigsq` is non-positive.
    pub fn new(
        phi: f64, sigsq: f64, variance_prior: VariancePrior, coefficient_prior: CoefficientPrior,
    ) -> SsmResult<Self> {
        if !(phi.is_finite() && phi.abs() < 1.0) {
            return Err(SsmError::NonStationaryCoefficient { value: phi });
        }
        if !(sigsq.is_finite() && sigsq > 0.0) {
            return Err(SsmError::InvalidVariance { what: "ar1 sigsq", value: sigsq });
        }
        Ok(Self {
            phi,
            sigsq,
            loadings: Array1::ones(1),
            variance_prior,
            coefficient_prior,
            time_dimension: 0,
        })
    }

    /// The autoregressive coefficient.
    pub fn phi(&self) -> f64 {
        self.phi
    }

    /// The innovation variance.
    pub fn sigsq(&self) -> f64 {
        self.sigsq
    }
}

/// The closed set of state-component variants.
///
/// Shared components carry per-series loadings (length = nseries);
/// series-specific components keep the default length-1 loading vector.
#[derive(Debug, Clone, PartialEq)]
pub enum StateComponent {
    /// Random-walk level.
    LocalLevel(LocalLevelComponent),
    /// Stationary first-order autoregression.
    Ar1(Ar1Component),
}

impl StateComponent {
    /// Dimension of this component's state block.
    pub fn state_dimension(&self) -> usize {
        match self {
            StateComponent::LocalLevel(_) | StateComponent::Ar1(_) => 1,
        }
    }

    /// Dimension of this component's innovation.
    pub fn error_dimension(&self) -> usize {
        match self {
            StateComponent::LocalLevel(_) | StateComponent::Ar1(_) => 1,
        }
    }

    /// Transition block `T` at time `t` (time-invariant for these variants).
    pub fn transition(&self, _t: usize) -> Array2<f64> {
        match self {
            StateComponent::LocalLevel(_) => Array2::eye(1),
            StateComponent::Ar1(c) => Array2::from_elem((1, 1), c.phi),
        }
    }

    /// Innovation variance block `R Q R'` at time `t`.
    pub fn state_error_variance(&self, _t: usize) -> Array2<f64> {
        match self {
            StateComponent::LocalLevel(c) => Array2::from_elem((1, 1), c.sigsq),
            StateComponent::Ar1(c) => Array2::from_elem((1, 1), c.sigsq),
        }
    }

    /// The observation row mapping this component's state block to a scalar
    /// response, before the per-series loading is applied.
    pub fn observation_row(&self, _t: usize) -> Array1<f64> {
        match self {
            StateComponent::LocalLevel(_) | StateComponent::Ar1(_) => Array1::ones(1),
        }
    }

    /// The loading weight applied for `series`.
    ///
    /// A length-1 loading vector applies to every series (and is the
    /// series-specific convention).
    pub fn loading(&self, series: usize) -> f64 {
        let loadings = self.loadings();
        if loadings.len() == 1 {
            loadings[0]
        } else {
            loadings[series]
        }
    }

    /// The loading vector.
    pub fn loadings(&self) -> &Array1<f64> {
        match self {
            StateComponent::LocalLevel(c) => &c.loadings,
            StateComponent::Ar1(c) => &c.loadings,
        }
    }

    /// Replace the loading vector (used when registering a shared
    /// component for a multi-series model).
    ///
    /// # Errors
    /// [`SsmError::NonFiniteValue`] if any loading is non-finite.
    pub fn set_loadings(&mut self, loadings: Array1<f64>) -> SsmResult<()> {
        if let Some(&bad) = loadings.iter().find(|v| !v.is_finite()) {
            return Err(SsmError::NonFiniteValue { context: "loading weight", value: bad });
        }
        match self {
            StateComponent::LocalLevel(c) => c.loadings = loadings,
            StateComponent::Ar1(c) => c.loadings = loadings,
        }
        Ok(())
    }

    /// Mean of the initial-state distribution.
    pub fn initial_state_mean(&self) -> Array1<f64> {
        match self {
            StateComponent::LocalLevel(c) => Array1::from_elem(1, c.initial_mean),
            StateComponent::Ar1(_) => Array1::zeros(1),
        }
    }

    /// Variance of the initial-state distribution.
    pub fn initial_state_variance(&self) -> Array2<f64> {
        match self {
            StateComponent::LocalLevel(c) => Array2::from_elem((1, 1), c.initial_variance),
            StateComponent::Ar1(c) => {
                Array2::from_elem((1, 1), c.sigsq / (1.0 - c.phi * c.phi))
            }
        }
    }

    /// Advance one state block a single step: `T a + eta`, with `eta` drawn
    /// from this component's innovation distribution.
    pub fn advance<R: Rng>(&self, rng: &mut R, state: ArrayView1<'_, f64>, t: usize) -> Array1<f64> {
        let mut next = self.transition(t).dot(&state);
        let variance = self.state_error_variance(t);
        for (i, slot) in next.iter_mut().enumerate() {
            let sd = variance[(i, i)].sqrt();
            // Normal::new only fails on non-finite sd, which construction
            // validation rules out.
            if let Ok(noise) = Normal::new(0.0, sd) {
                *slot += noise.sample(rng);
            }
        }
        next
    }

    /// Largest time dimension this component has been told about.
    pub fn time_dimension(&self) -> usize {
        match self {
            StateComponent::LocalLevel(c) => c.time_dimension,
            StateComponent::Ar1(c) => c.time_dimension,
        }
    }

    /// Propagate "at least `t` periods exist". Monotonic and idempotent.
    pub fn observe_time_dimension(&mut self, t: usize) {
        let slot = match self {
            StateComponent::LocalLevel(c) => &mut c.time_dimension,
            StateComponent::Ar1(c) => &mut c.time_dimension,
        };
        *slot = (*slot).max(t);
    }

    /// Draw this component's parameters from their full conditional given
    /// the freshly imputed state block (`state_dimension x time_dimension`).
    ///
    /// For the local level this is a single inverse-Gamma variance draw from
    /// the state innovations. For the AR(1) it is a truncated-normal
    /// coefficient draw (rejection-sampled into the stationary region)
    /// followed by the inverse-Gamma variance draw.
    pub fn draw_parameters<R: Rng>(
        &mut self, rng: &mut R, state: ArrayView2<'_, f64>,
    ) -> SsmResult<()> {
        let time_dimension = state.ncols();
        if time_dimension < 2 {
            // Nothing to learn from fewer than two state values.
            return Ok(());
        }
        match self {
            StateComponent::LocalLevel(c) => {
                let mut sum_of_squares = 0.0;
                for t in 0..(time_dimension - 1) {
                    let eta = state[(0, t + 1)] - state[(0, t)];
                    sum_of_squares += eta * eta;
                }
                c.sigsq = c.prior.posterior_draw(rng, sum_of_squares, time_dimension - 1)?;
            }
            StateComponent::Ar1(c) => {
                // phi | sigsq: Gaussian full conditional from regressing
                // a[t+1] on a[t], truncated to (-1, 1).
                let mut xx = 0.0;
                let mut xy = 0.0;
                for t in 0..(time_dimension - 1) {
                    xx += state[(0, t)] * state[(0, t)];
                    xy += state[(0, t)] * state[(0, t + 1)];
                }
                let prior = c.coefficient_prior;
                let posterior_precision = prior.precision() + xx / c.sigsq;
                let posterior_mean =
                    (prior.precision() * prior.mean + xy / c.sigsq) / posterior_precision;
                let posterior_sd = posterior_precision.sqrt().recip();
                let proposal = Normal::new(posterior_mean, posterior_sd).map_err(|_| {
                    SsmError::NonFiniteValue {
                        context: "ar1 coefficient full conditional",
                        value: posterior_sd,
                    }
                })?;
                for _attempt in 0..AR_REJECTION_LIMIT {
                    let candidate = proposal.sample(rng);
                    if candidate.abs() < 1.0 {
                        c.phi = candidate;
                        break;
                    }
                }
                let mut sum_of_squares = 0.0;
                for t in 0..(time_dimension - 1) {
                    let eta = state[(0, t + 1)] - c.phi * state[(0, t)];
                    sum_of_squares += eta * eta;
                }
                c.sigsq =
                    c.variance_prior.posterior_draw(rng, sum_of_squares, time_dimension - 1)?;
            }
        }
        Ok(())
    }
}

impl Vectorize for StateComponent {
    fn parameter_count(&self, minimal: bool) -> usize {
        let sampled = match self {
            StateComponent::LocalLevel(_) => 1,
            StateComponent::Ar1(_) => 2,
        };
        if minimal {
            sampled
        } else {
            sampled + self.loadings().len()
        }
    }

    fn vectorize(&self, minimal: bool) -> Array1<f64> {
        let mut out = Vec::with_capacity(self.parameter_count(minimal));
        match self {
            StateComponent::LocalLevel(c) => out.push(c.sigsq),
            StateComponent::Ar1(c) => {
                out.push(c.phi);
                out.push(c.sigsq);
            }
        }
        if !minimal {
            // Loadings are fixed coefficients; the minimal set carries only
            // the free (sampled) parameters.
            out.extend(self.loadings().iter().copied());
        }
        Array1::from(out)
    }

    fn unvectorize(&mut self, v: ArrayView1<'_, f64>, minimal: bool) -> SsmResult<()> {
        self.check_vector_length(v, minimal)?;
        match self {
            StateComponent::LocalLevel(c) => {
                let sigsq = v[0];
                if !(sigsq.is_finite() && sigsq > 0.0) {
                    return Err(SsmError::InvalidParameterValue {
                        what: "local level sigsq",
                        value: sigsq,
                    });
                }
                c.sigsq = sigsq;
                if !minimal {
                    c.loadings = v.slice(ndarray::s![1..]).to_owned();
                }
            }
            StateComponent::Ar1(c) => {
                let phi = v[0];
                let sigsq = v[1];
                if !(phi.is_finite() && phi.abs() < 1.0) {
                    return Err(SsmError::NonStationaryCoefficient { value: phi });
                }
                if !(sigsq.is_finite() && sigsq > 0.0) {
                    return Err(SsmError::InvalidParameterValue { what: "ar1 sigsq", value: sigsq });
                }
                c.phi = phi;
                c.sigsq = sigsq;
                if !minimal {
                    c.loadings = v.slice(ndarray::s![2..]).to_owned();
                }
            }
        }
        Ok(())
    }
}
