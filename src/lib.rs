//! rust_statespace — Bayesian state-space and mixture modeling with Python bindings.
//!
//! Purpose
//! -------
//! Serve as the crate root for Rust callers and as the PyO3 bridge that exposes
//! the posterior samplers to Python via the `_rust_statespace` extension
//! module. When the `python-bindings` feature is enabled, this module defines
//! the Python-facing classes and submodules used by the `rust_statespace`
//! package.
//!
//! Key behaviors
//! -------------
//! - Re-export the core Rust modules (`statespace`, `mixtures`, `hmm`, `gp`,
//!   `math`) as the public crate surface.
//! - Define `#[pyclass]` wrappers and the `#[pymodule]` initializer for the
//!   `_rust_statespace` Python extension.
//! - Create and register Python submodules (`state_models`, `mixture_models`)
//!   under `rust_statespace` so that dot-notation imports work as expected.
//!
//! Invariants & assumptions
//! ------------------------
//! - All heavy numerical work is implemented in the inner Rust modules; this
//!   file performs only FFI glue, input validation, and error mapping.
//! - When `python-bindings` is enabled, the Python-visible types mirror the
//!   invariants and signatures of their Rust counterparts (e.g.
//!   `StudentMvssModel`, `FiniteMixtureFit`).
//! - On successful conversion from Python objects to Rust types, the
//!   invariants documented in the core modules are assumed to hold.
//!
//! Conventions
//! -----------
//! - Python-exposed classes live under `_rust_statespace.<submodule>` and are
//!   typically wrapped by thin pure-Python facades in the top-level
//!   `rust_statespace` package.
//! - Indexing, units, and statistical conventions follow the documentation of
//!   the underlying Rust modules (`statespace::core`, `mixtures`, etc.).
//! - Errors from core Rust code are propagated as rich error types internally
//!   and converted to `PyErr` values at the PyO3 boundary.
//!
//! Downstream usage
//! ----------------
//! - Native Rust code should usually depend directly on the inner modules and
//!   can ignore the PyO3 items guarded by the `python-bindings` feature.
//! - The Python packaging layer imports the `_rust_statespace` module defined
//!   here and wraps its classes in user-facing Python APIs.
//! - External users are expected to interact with either the safe Rust APIs or
//!   the pure-Python wrappers; the PyO3 plumbing is considered internal.
//!
//! Testing notes
//! -------------
//! - Core numerical behavior is covered by unit tests in the inner modules and
//!   by the integration tests under `tests/`.
//! - Smoke tests for the PyO3 bindings verify that classes can be constructed,
//!   called, and round-tripped correctly from Python.

pub mod gp;
pub mod hmm;
pub mod math;
pub mod mixtures;
pub mod params;
pub mod rng;
pub mod statespace;
pub mod utils;

#[cfg(feature = "python-bindings")]
use ndarray::{Array1, Array2};

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, prelude::*, types::PyAny};

#[cfg(feature = "python-bindings")]
use crate::{
    hmm::{
        composite::{fit_composite_hmm, CompositeHmmFit},
        nested::{fit_nested_hmm, NestedHmmFit, NestedHmmOptions},
    },
    mixtures::{
        conditional::{fit_conditional_mixture, ConditionalMixtureFit},
        finite::{fit_finite_mixture, FiniteMixtureFit},
    },
    statespace::{
        core::component::{
            Ar1Component, CoefficientPrior, LocalLevelComponent, StateComponent, VariancePrior,
        },
        core::data::TimeSeriesRegressionData,
        models::student_mvss::StudentMvssModel,
        sampler::{PosteriorSampler, SamplerOptions, SamplerOutput},
    },
    utils::{
        build_gaussian_components, build_student_mvss_model, extract_f64_array,
        extract_f64_matrix, extract_known_source,
    },
};

#[cfg(feature = "python-bindings")]
fn rows_to_vecs(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
    matrix.rows().into_iter().map(|row| row.to_vec()).collect()
}

#[cfg(feature = "python-bindings")]
fn extract_loadings<'py>(
    py: Python<'py>, raw: Option<&Bound<'py, PyAny>>,
) -> PyResult<Option<Array1<f64>>> {
    match raw {
        None => Ok(None),
        Some(raw) => {
            let arr_ro = extract_f64_array(py, raw)?;
            Ok(Some(arr_ro.as_array().to_owned()))
        }
    }
}

/// StudentMvss — Python-facing wrapper for the multivariate Student state-space model.
///
/// Purpose
/// -------
/// Assemble a multi-series state-space regression with Student-t observation
/// errors from Python and forward all computation to [`StudentMvssModel`].
///
/// Key behaviors
/// -------------
/// - Accumulate observations one `(response, predictors, series, timestamp)`
///   record at a time, tolerating ragged and missing cells.
/// - Register shared and series-specific state components (local level and
///   AR(1)) with optional per-series loadings.
/// - Run the collapsed Gibbs sampler and return the retained draws as a
///   [`MvssPosterior`].
///
/// Parameters
/// ----------
/// Constructed from Python via `StudentMvss(nseries, xdim, ...)`:
/// - `nseries`: `usize`
///   Number of observed series; positive.
/// - `xdim`: `usize`
///   Number of regression predictors per observation; positive.
/// - `nu`: `Option<f64>`
///   Student-t tail thickness shared by every series; defaults to `3.0`.
/// - `coefficient_precision`, `variance_df`, `variance_guess`: `Option<f64>`
///   Regression and variance prior settings, matching
///   [`crate::statespace::core::regression::RegressionPrior`] and
///   [`VariancePrior`] semantics.
///
/// Fields
/// ------
/// - `inner`: [`StudentMvssModel`]
///   Fully configured model owning the data policy, state manager, and
///   per-series regressions.
///
/// Invariants
/// ----------
/// - `inner` is always a well-formed [`StudentMvssModel`] created through
///   [`build_student_mvss_model`]; every registered component has loadings
///   consistent with `nseries`.
///
/// Notes
/// -----
/// - Native Rust callers should usually work with [`StudentMvssModel`]
///   directly; this type exists solely for the PyO3 binding surface.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "rust_statespace.state_models", unsendable)]
pub struct StudentMvss {
    /// Underlying Rust StudentMvssModel.
    pub inner: StudentMvssModel,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl StudentMvss {
    #[new]
    #[pyo3(
        signature = (
            nseries,
            xdim,
            nu = None,
            coefficient_precision = None,
            variance_df = None,
            variance_guess = None,
        ),
        text_signature = "(nseries, xdim, /, nu=None, coefficient_precision=None, \
                          variance_df=None, variance_guess=None)"
    )]
    pub fn new(
        nseries: usize, xdim: usize, nu: Option<f64>, coefficient_precision: Option<f64>,
        variance_df: Option<f64>, variance_guess: Option<f64>,
    ) -> PyResult<Self> {
        let inner = build_student_mvss_model(
            nseries,
            xdim,
            nu,
            coefficient_precision,
            variance_df,
            variance_guess,
        )?;
        Ok(StudentMvss { inner })
    }

    /// Append one observation record.
    #[pyo3(
        signature = (response, predictors, series, timestamp),
        text_signature = "(response, predictors, series, timestamp, /)"
    )]
    pub fn add_observation<'py>(
        &mut self, py: Python<'py>, response: f64, predictors: &Bound<'py, PyAny>,
        series: usize, timestamp: usize,
    ) -> PyResult<()> {
        let predictors_ro = extract_f64_array(py, predictors)?;
        let predictors_arr: Array1<f64> = predictors_ro.as_array().to_owned();
        let observation = TimeSeriesRegressionData::new(response, predictors_arr, series, timestamp)?;
        self.inner.add_data(observation)?;
        Ok(())
    }

    /// Register a shared local-level component.
    #[pyo3(
        signature = (sigsq, initial_mean = None, initial_variance = None, prior_df = None,
                     prior_guess = None, loadings = None),
        text_signature = "(sigsq, /, initial_mean=None, initial_variance=None, \
                          prior_df=None, prior_guess=None, loadings=None)"
    )]
    pub fn add_local_level<'py>(
        &mut self, py: Python<'py>, sigsq: f64, initial_mean: Option<f64>,
        initial_variance: Option<f64>, prior_df: Option<f64>, prior_guess: Option<f64>,
        loadings: Option<&Bound<'py, PyAny>>,
    ) -> PyResult<()> {
        let prior = VariancePrior::new(prior_df.unwrap_or(1.0), prior_guess.unwrap_or(sigsq.sqrt()))?;
        let level = LocalLevelComponent::new(
            sigsq,
            initial_mean.unwrap_or(0.0),
            initial_variance.unwrap_or(1.0),
            prior,
        )?;
        let mut component = StateComponent::LocalLevel(level);
        if let Some(loadings) = extract_loadings(py, loadings)? {
            component.set_loadings(loadings)?;
        }
        self.inner.add_state(component)?;
        Ok(())
    }

    /// Register a shared stationary AR(1) component.
    #[pyo3(
        signature = (phi, sigsq, variance_df = None, variance_guess = None,
                     coefficient_prior_mean = None, coefficient_prior_sd = None,
                     loadings = None),
        text_signature = "(phi, sigsq, /, variance_df=None, variance_guess=None, \
                          coefficient_prior_mean=None, coefficient_prior_sd=None, \
                          loadings=None)"
    )]
    #[allow(clippy::too_many_arguments)]
    pub fn add_autoregression<'py>(
        &mut self, py: Python<'py>, phi: f64, sigsq: f64, variance_df: Option<f64>,
        variance_guess: Option<f64>, coefficient_prior_mean: Option<f64>,
        coefficient_prior_sd: Option<f64>, loadings: Option<&Bound<'py, PyAny>>,
    ) -> PyResult<()> {
        let mut component = build_ar1(
            phi,
            sigsq,
            variance_df,
            variance_guess,
            coefficient_prior_mean,
            coefficient_prior_sd,
        )?;
        if let Some(loadings) = extract_loadings(py, loadings)? {
            component.set_loadings(loadings)?;
        }
        self.inner.add_state(component)?;
        Ok(())
    }

    /// Register a private AR(1) component for one series.
    #[pyo3(
        signature = (series, phi, sigsq, variance_df = None, variance_guess = None,
                     coefficient_prior_mean = None, coefficient_prior_sd = None),
        text_signature = "(series, phi, sigsq, /, variance_df=None, variance_guess=None, \
                          coefficient_prior_mean=None, coefficient_prior_sd=None)"
    )]
    #[allow(clippy::too_many_arguments)]
    pub fn add_series_autoregression(
        &mut self, series: usize, phi: f64, sigsq: f64, variance_df: Option<f64>,
        variance_guess: Option<f64>, coefficient_prior_mean: Option<f64>,
        coefficient_prior_sd: Option<f64>,
    ) -> PyResult<()> {
        let component = build_ar1(
            phi,
            sigsq,
            variance_df,
            variance_guess,
            coefficient_prior_mean,
            coefficient_prior_sd,
        )?;
        self.inner.add_series_specific_state(component, series)?;
        Ok(())
    }

    /// Mark one cell of the observation panel as observed or missing.
    #[pyo3(
        signature = (timestamp, series, observed),
        text_signature = "(timestamp, series, observed, /)"
    )]
    pub fn set_observed(&mut self, timestamp: usize, series: usize, observed: bool) -> PyResult<()> {
        if timestamp >= self.inner.time_dimension() {
            return Err(PyValueError::new_err(format!(
                "timestamp {} is outside the observed span of {}",
                timestamp,
                self.inner.time_dimension()
            )));
        }
        let mut mask = self.inner.observed_status(timestamp).clone();
        if series >= mask.len() {
            return Err(PyValueError::new_err(format!(
                "series {} is outside the {} modeled series",
                series,
                mask.len()
            )));
        }
        mask.set(series, observed);
        self.inner.set_observed_status(timestamp, mask)?;
        Ok(())
    }

    /// Marginal Gaussian-mixture log likelihood at the current parameters.
    pub fn log_likelihood(&mut self) -> PyResult<f64> {
        Ok(self.inner.log_likelihood()?)
    }

    /// Run the Gibbs sampler and collect the retained draws.
    #[pyo3(
        signature = (niter, burn_in = None, ping = None, seed = None),
        text_signature = "(niter, /, burn_in=None, ping=None, seed=None)"
    )]
    pub fn sample(
        &mut self, niter: usize, burn_in: Option<usize>, ping: Option<usize>, seed: Option<u64>,
    ) -> PyResult<MvssPosterior> {
        let options = SamplerOptions::new(
            niter,
            burn_in.unwrap_or(0),
            ping.unwrap_or(100),
            seed.unwrap_or(0),
        )?;
        let inner = PosteriorSampler::new(&mut self.inner, options).run()?;
        Ok(MvssPosterior { inner })
    }

    /// Draw posterior-predictive forecast panels past the observed span.
    ///
    /// `predictors` holds `nseries * horizon` rows (time-major,
    /// series-minor). Each returned panel is `nseries x horizon`.
    #[pyo3(
        signature = (ndraws, horizon, predictors, seed = None),
        text_signature = "(ndraws, horizon, predictors, /, seed=None)"
    )]
    pub fn forecast<'py>(
        &mut self, ndraws: usize, horizon: usize, predictors: &Bound<'py, PyAny>,
        seed: Option<u64>,
    ) -> PyResult<Vec<Vec<Vec<f64>>>> {
        if ndraws == 0 {
            return Err(PyValueError::new_err("ndraws must be positive"));
        }
        let predictors_arr = extract_f64_matrix(predictors)?;
        let options = SamplerOptions::new(ndraws, 0, 0, seed.unwrap_or(0))?;
        let draws = PosteriorSampler::new(&mut self.inner, options).forecast_draws(
            ndraws,
            horizon,
            predictors_arr.view(),
        )?;
        Ok(draws.iter().map(rows_to_vecs).collect())
    }

    #[getter]
    pub fn nseries(&self) -> usize {
        self.inner.nseries()
    }

    #[getter]
    pub fn xdim(&self) -> usize {
        self.inner.xdim()
    }

    #[getter]
    pub fn time_dimension(&self) -> usize {
        self.inner.time_dimension()
    }
}

#[cfg(feature = "python-bindings")]
fn build_ar1(
    phi: f64, sigsq: f64, variance_df: Option<f64>, variance_guess: Option<f64>,
    coefficient_prior_mean: Option<f64>, coefficient_prior_sd: Option<f64>,
) -> PyResult<StateComponent> {
    let variance_prior =
        VariancePrior::new(variance_df.unwrap_or(1.0), variance_guess.unwrap_or(sigsq.sqrt()))?;
    let coefficient_prior = CoefficientPrior::new(
        coefficient_prior_mean.unwrap_or(0.0),
        coefficient_prior_sd.unwrap_or(1.0),
    )?;
    Ok(StateComponent::Ar1(Ar1Component::new(phi, sigsq, variance_prior, coefficient_prior)?))
}

/// MvssPosterior — retained Gibbs output for a [`StudentMvss`] model.
///
/// Purpose
/// -------
/// Provide Python access to the post-burn-in parameter draws and per-draw
/// log likelihoods produced by [`PosteriorSampler::run`].
///
/// Key behaviors
/// -------------
/// - Expose the draw matrix, log-likelihood path, draw count, and posterior
///   mean as copy-on-access properties.
///
/// Notes
/// -----
/// - Rust callers should use [`SamplerOutput`] directly; this wrapper exists
///   solely for the PyO3 binding.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "rust_statespace.state_models")]
pub struct MvssPosterior {
    /// Underlying Rust SamplerOutput.
    pub inner: SamplerOutput,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl MvssPosterior {
    #[getter]
    pub fn parameter_draws(&self) -> Vec<Vec<f64>> {
        rows_to_vecs(self.inner.parameter_draws())
    }

    #[getter]
    pub fn loglik(&self) -> Vec<f64> {
        self.inner.loglik().to_vec()
    }

    #[getter]
    pub fn ndraws(&self) -> usize {
        self.inner.ndraws()
    }

    #[getter]
    pub fn posterior_mean(&self) -> Vec<f64> {
        self.inner.posterior_mean().to_vec()
    }
}

/// FiniteMixture — collapsed Gibbs fit of a finite Gaussian mixture.
///
/// Purpose
/// -------
/// Run [`fit_finite_mixture`] at construction time and hold the resulting
/// draws for Python access.
///
/// Parameters
/// ----------
/// Constructed from Python via
/// `FiniteMixture(data, means, variances, ...)`:
/// - `data`: 1-D array-like of `f64` observations.
/// - `means`, `variances`: starting component parameters, one entry per
///   mixture component.
/// - `mixing_concentration`: `Option<f64>`
///   Symmetric Dirichlet concentration for the mixing weights; defaults to
///   `1.0`.
/// - `known_source`: optional per-observation assignment pins (`None` entries
///   stay latent).
/// - `niter`, `ping`, `seed`: chain length, reporting stride, and RNG seed.
/// - `prior_mean`, `prior_sd`, `prior_df`, `prior_guess`: conjugate prior
///   settings shared by every component.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "rust_statespace.mixture_models")]
pub struct FiniteMixture {
    /// Underlying Rust FiniteMixtureFit.
    pub inner: FiniteMixtureFit,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl FiniteMixture {
    #[new]
    #[pyo3(
        signature = (
            data,
            means,
            variances,
            mixing_concentration = None,
            niter = None,
            ping = None,
            known_source = None,
            seed = None,
            prior_mean = None,
            prior_sd = None,
            prior_df = None,
            prior_guess = None,
        ),
        text_signature = "(data, means, variances, /, mixing_concentration=None, \
                          niter=None, ping=None, known_source=None, seed=None, \
                          prior_mean=None, prior_sd=None, prior_df=None, \
                          prior_guess=None)"
    )]
    #[allow(clippy::too_many_arguments)]
    pub fn new<'py>(
        py: Python<'py>, data: &Bound<'py, PyAny>, means: &Bound<'py, PyAny>,
        variances: &Bound<'py, PyAny>, mixing_concentration: Option<f64>, niter: Option<usize>,
        ping: Option<usize>, known_source: Option<&Bound<'py, PyAny>>, seed: Option<u64>,
        prior_mean: Option<f64>, prior_sd: Option<f64>, prior_df: Option<f64>,
        prior_guess: Option<f64>,
    ) -> PyResult<Self> {
        let data_ro = extract_f64_array(py, data)?;
        let data_slice = data_ro.as_slice().map_err(|_| {
            PyValueError::new_err("data must be a 1-D contiguous float64 array or sequence")
        })?;
        let components =
            build_gaussian_components(py, means, variances, prior_mean, prior_sd, prior_df, prior_guess)?;
        let mixing_prior =
            Array1::from_elem(components.len(), mixing_concentration.unwrap_or(1.0));
        let pins = extract_known_source(known_source, data_slice.len())?;
        let inner = fit_finite_mixture(
            data_slice,
            components,
            mixing_prior,
            niter.unwrap_or(1000),
            ping.unwrap_or(0),
            pins.as_deref(),
            seed.unwrap_or(0),
        )?;
        Ok(FiniteMixture { inner })
    }

    #[getter]
    pub fn mixing_weight_draws(&self) -> Vec<Vec<f64>> {
        rows_to_vecs(self.inner.mixing_weight_draws())
    }

    #[getter]
    pub fn mean_draws(&self) -> Vec<Vec<f64>> {
        rows_to_vecs(self.inner.mean_draws())
    }

    #[getter]
    pub fn variance_draws(&self) -> Vec<Vec<f64>> {
        rows_to_vecs(self.inner.variance_draws())
    }

    #[getter]
    pub fn loglik(&self) -> Vec<f64> {
        self.inner.loglik().to_vec()
    }
}

/// ConditionalMixture — Gaussian mixture with covariate-driven mixing weights.
///
/// Purpose
/// -------
/// Run [`fit_conditional_mixture`] at construction time and hold the
/// resulting draws for Python access. Mixing weights follow a multinomial
/// logit in the supplied design matrix; the logit coefficients carry a
/// Gaussian prior (`mixing_prior_mean`, `mixing_prior_sd`) and move by
/// random-walk Metropolis.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "rust_statespace.mixture_models")]
pub struct ConditionalMixture {
    /// Underlying Rust ConditionalMixtureFit.
    pub inner: ConditionalMixtureFit,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl ConditionalMixture {
    #[new]
    #[pyo3(
        signature = (
            data,
            design,
            means,
            variances,
            mixing_prior_mean = None,
            mixing_prior_sd = None,
            proposal_sd = None,
            niter = None,
            ping = None,
            known_source = None,
            seed = None,
            prior_mean = None,
            prior_sd = None,
            prior_df = None,
            prior_guess = None,
        ),
        text_signature = "(data, design, means, variances, /, mixing_prior_mean=None, \
                          mixing_prior_sd=None, proposal_sd=None, \
                          niter=None, ping=None, known_source=None, seed=None, \
                          prior_mean=None, prior_sd=None, prior_df=None, \
                          prior_guess=None)"
    )]
    #[allow(clippy::too_many_arguments)]
    pub fn new<'py>(
        py: Python<'py>, data: &Bound<'py, PyAny>, design: &Bound<'py, PyAny>,
        means: &Bound<'py, PyAny>, variances: &Bound<'py, PyAny>,
        mixing_prior_mean: Option<f64>, mixing_prior_sd: Option<f64>, proposal_sd: Option<f64>,
        niter: Option<usize>, ping: Option<usize>, known_source: Option<&Bound<'py, PyAny>>,
        seed: Option<u64>, prior_mean: Option<f64>, prior_sd: Option<f64>,
        prior_df: Option<f64>, prior_guess: Option<f64>,
    ) -> PyResult<Self> {
        let data_ro = extract_f64_array(py, data)?;
        let data_slice = data_ro.as_slice().map_err(|_| {
            PyValueError::new_err("data must be a 1-D contiguous float64 array or sequence")
        })?;
        let design_arr = extract_f64_matrix(design)?;
        let components =
            build_gaussian_components(py, means, variances, prior_mean, prior_sd, prior_df, prior_guess)?;
        let pins = extract_known_source(known_source, data_slice.len())?;
        let mixing_prior = CoefficientPrior::new(
            mixing_prior_mean.unwrap_or(0.0),
            mixing_prior_sd.unwrap_or(10.0),
        )?;
        let inner = fit_conditional_mixture(
            data_slice,
            design_arr.view(),
            components,
            mixing_prior,
            proposal_sd.unwrap_or(0.25),
            niter.unwrap_or(1000),
            ping.unwrap_or(0),
            pins.as_deref(),
            seed.unwrap_or(0),
        )?;
        Ok(ConditionalMixture { inner })
    }

    #[getter]
    pub fn mean_draws(&self) -> Vec<Vec<f64>> {
        rows_to_vecs(self.inner.mean_draws())
    }

    #[getter]
    pub fn variance_draws(&self) -> Vec<Vec<f64>> {
        rows_to_vecs(self.inner.variance_draws())
    }

    #[getter]
    pub fn coefficient_draws(&self) -> Vec<Vec<f64>> {
        rows_to_vecs(self.inner.coefficient_draws())
    }

    #[getter]
    pub fn acceptance_rate(&self) -> f64 {
        self.inner.acceptance_rate()
    }
}

/// CompositeHmm — forward-filter backward-sample fit of a Gaussian HMM.
///
/// Purpose
/// -------
/// Run [`fit_composite_hmm`] at construction time and hold the resulting
/// draws for Python access. The hidden chain moves over the supplied
/// components; transition rows carry a symmetric Dirichlet prior.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "rust_statespace.mixture_models")]
pub struct CompositeHmm {
    /// Underlying Rust CompositeHmmFit.
    pub inner: CompositeHmmFit,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl CompositeHmm {
    #[new]
    #[pyo3(
        signature = (
            data,
            means,
            variances,
            transition_concentration = None,
            niter = None,
            ping = None,
            seed = None,
            prior_mean = None,
            prior_sd = None,
            prior_df = None,
            prior_guess = None,
        ),
        text_signature = "(data, means, variances, /, transition_concentration=None, \
                          niter=None, ping=None, seed=None, prior_mean=None, \
                          prior_sd=None, prior_df=None, prior_guess=None)"
    )]
    #[allow(clippy::too_many_arguments)]
    pub fn new<'py>(
        py: Python<'py>, data: &Bound<'py, PyAny>, means: &Bound<'py, PyAny>,
        variances: &Bound<'py, PyAny>, transition_concentration: Option<f64>,
        niter: Option<usize>, ping: Option<usize>, seed: Option<u64>, prior_mean: Option<f64>,
        prior_sd: Option<f64>, prior_df: Option<f64>, prior_guess: Option<f64>,
    ) -> PyResult<Self> {
        let data_ro = extract_f64_array(py, data)?;
        let data_slice = data_ro.as_slice().map_err(|_| {
            PyValueError::new_err("data must be a 1-D contiguous float64 array or sequence")
        })?;
        let components =
            build_gaussian_components(py, means, variances, prior_mean, prior_sd, prior_df, prior_guess)?;
        let k = components.len();
        let transition_prior =
            Array2::from_elem((k, k), transition_concentration.unwrap_or(1.0));
        let inner = fit_composite_hmm(
            data_slice,
            components,
            &transition_prior,
            niter.unwrap_or(1000),
            ping.unwrap_or(0),
            seed.unwrap_or(0),
        )?;
        Ok(CompositeHmm { inner })
    }

    #[getter]
    pub fn transition_draws(&self) -> Vec<Vec<f64>> {
        rows_to_vecs(self.inner.transition_draws())
    }

    #[getter]
    pub fn mean_draws(&self) -> Vec<Vec<f64>> {
        rows_to_vecs(self.inner.mean_draws())
    }

    #[getter]
    pub fn variance_draws(&self) -> Vec<Vec<f64>> {
        rows_to_vecs(self.inner.variance_draws())
    }

    #[getter]
    pub fn loglik(&self) -> Vec<f64> {
        self.inner.loglik().to_vec()
    }
}

/// NestedHmm — multi-threaded Gibbs fit of a categorical-emission HMM over streams.
///
/// Purpose
/// -------
/// Run [`fit_nested_hmm`] at construction time and hold the resulting draws
/// for Python access. Each stream is a symbol sequence terminated by an
/// end-of-stream marker; per-stream forward-backward passes fan out over a
/// scoped thread pool while staying byte-identical across thread counts.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "rust_statespace.mixture_models")]
pub struct NestedHmm {
    /// Underlying Rust NestedHmmFit.
    pub inner: NestedHmmFit,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl NestedHmm {
    #[new]
    #[pyo3(
        signature = (
            streams,
            alphabet,
            end_of_stream_marker,
            nstates,
            niter = None,
            burn_in = None,
            ping = None,
            thread_count = None,
            seed = None,
            print_level = None,
            transition_concentration = None,
            emission_concentration = None,
        ),
        text_signature = "(streams, alphabet, end_of_stream_marker, nstates, /, \
                          niter=None, burn_in=None, ping=None, thread_count=None, \
                          seed=None, print_level=None, transition_concentration=None, \
                          emission_concentration=None)"
    )]
    #[allow(clippy::too_many_arguments)]
    pub fn new<'py>(
        streams: &Bound<'py, PyAny>, alphabet: usize, end_of_stream_marker: usize,
        nstates: usize, niter: Option<usize>, burn_in: Option<usize>, ping: Option<usize>,
        thread_count: Option<usize>, seed: Option<u64>, print_level: Option<u8>,
        transition_concentration: Option<f64>, emission_concentration: Option<f64>,
    ) -> PyResult<Self> {
        let streams: Vec<Vec<usize>> = streams.extract().map_err(|_| {
            pyo3::exceptions::PyTypeError::new_err(
                "streams must be a sequence of sequences of non-negative ints",
            )
        })?;
        let options = NestedHmmOptions::new(
            nstates,
            niter.unwrap_or(1000),
            burn_in.unwrap_or(0),
            ping.unwrap_or(0),
            thread_count.unwrap_or(1),
            seed.unwrap_or(0),
            print_level.unwrap_or(0),
        )?;
        let inner = fit_nested_hmm(
            &streams,
            alphabet,
            end_of_stream_marker,
            transition_concentration.unwrap_or(1.0),
            emission_concentration.unwrap_or(1.0),
            options,
        )?;
        Ok(NestedHmm { inner })
    }

    #[getter]
    pub fn transition_draws(&self) -> Vec<Vec<f64>> {
        rows_to_vecs(self.inner.transition_draws())
    }

    #[getter]
    pub fn emission_draws(&self) -> Vec<Vec<f64>> {
        rows_to_vecs(self.inner.emission_draws())
    }

    #[getter]
    pub fn loglik(&self) -> Vec<f64> {
        self.inner.loglik().to_vec()
    }
}

/// _rust_statespace — PyO3 module initializer for the Python extension.
///
/// Purpose
/// -------
/// Define the `_rust_statespace` Python module and register its submodules
/// used by the public `rust_statespace` package.
///
/// Key behaviors
/// -------------
/// - Create `state_models` and `mixture_models` submodules.
/// - Attach those submodules to the parent `_rust_statespace` module.
/// - Register the submodules in `sys.modules` so they are importable via
///   dotted paths from Python.
///
/// Notes
/// -----
/// - This function is invoked automatically by Python when importing the
///   compiled extension; it is not called directly by user code.
#[cfg(feature = "python-bindings")]
#[pymodule]
fn _rust_statespace<'py>(_py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    let state_models_mod = PyModule::new(_py, "state_models")?;
    let mixture_models_mod = PyModule::new(_py, "mixture_models")?;
    state_models(_py, m, &state_models_mod)?;
    mixture_models(_py, m, &mixture_models_mod)?;

    // Manually add submodules into sys.modules to allow for dot notation.
    _py.import("sys")?
        .getattr("modules")?
        .set_item("rust_statespace.state_models", state_models_mod)?;

    _py.import("sys")?
        .getattr("modules")?
        .set_item("rust_statespace.mixture_models", mixture_models_mod)?;
    Ok(())
}

#[cfg(feature = "python-bindings")]
fn state_models<'py>(
    _py: Python, rust_statespace: &Bound<'py, PyModule>, m: &Bound<'py, PyModule>,
) -> PyResult<()> {
    m.add_class::<StudentMvss>()?;
    m.add_class::<MvssPosterior>()?;
    rust_statespace.add_submodule(m)?;
    Ok(())
}

#[cfg(feature = "python-bindings")]
fn mixture_models<'py>(
    _py: Python, rust_statespace: &Bound<'py, PyModule>, m: &Bound<'py, PyModule>,
) -> PyResult<()> {
    m.add_class::<FiniteMixture>()?;
    m.add_class::<ConditionalMixture>()?;
    m.add_class::<CompositeHmm>()?;
    m.add_class::<NestedHmm>()?;
    rust_statespace.add_submodule(m)?;
    Ok(())
}
