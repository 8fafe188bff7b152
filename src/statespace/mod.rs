//! statespace — Bayesian multivariate state-space modeling with MCMC
//! state imputation.
//!
//! Purpose
//! -------
//! Provide the full stack for panels of time series driven by shared and
//! series-specific latent state with Student-t observation errors: data
//! containers and panel bookkeeping, state components with conjugate
//! parameter draws, the Kalman filter/smoother engine, the composite model,
//! and the posterior sampling driver. This is the surface most consumers
//! (including the Python bindings) should depend on.
//!
//! Key behaviors
//! -------------
//! - Heavy-tailed observation errors are handled by latent-weight
//!   augmentation, so every conditional update in the stack is a weighted
//!   Gaussian one.
//! - State imputation alternates a shared multivariate draw with scalar
//!   per-series draws, both through the simulation smoother in
//!   [`core::kalman`].
//! - Every random quantity flows from a caller-supplied seed; a fixed seed
//!   reproduces chains and forecasts exactly.
//!
//! Invariants & assumptions
//! ------------------------
//! - Observations are validated on entry ([`core::data`]): finite
//!   responses, in-range series, consistent predictor dimensions, one
//!   observation per (series, time) cell.
//! - Missing data are represented by observation masks and handled by
//!   dropping rows inside the filter, never by imputing responses.
//! - Models are single-threaded by construction; concurrent use of one
//!   model instance is not supported.
//!
//! Conventions
//! -----------
//! - Indexing is 0-based; time runs oldest to newest; panels are
//!   `nseries x time_dimension`, state paths
//!   `state_dimension x time_dimension`.
//! - Errors surface as [`errors::SsmResult`]; panics indicate programming
//!   errors such as out-of-bounds component indices or `RefCell` borrow
//!   violations.
//! - The stack performs no I/O; progress reporting goes through the `log`
//!   facade.
//!
//! Downstream usage
//! ----------------
//! - Typical flow:
//!   1. Build one [`StudentRegression`] per series and assemble a
//!      [`StudentMvssModel`].
//!   2. Add observations as [`TimeSeriesRegressionData`] and register
//!      [`StateComponent`]s (shared or series-specific).
//!   3. Run [`sampler::PosteriorSampler`] (or [`sampler::sample_posterior`])
//!      for the chain, then `simulate_forecast` for posterior-predictive
//!      panels.
//!
//! Testing notes
//! -------------
//! - Unit tests live beside each module; the end-to-end recovery test for
//!   the full Gibbs cycle lives in `tests/integration_student_mvss.rs`.

pub mod core;
pub mod errors;
pub mod forecast;
pub mod models;
pub mod sampler;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::core::{
    Ar1Component, CoefficientPrior, LocalLevelComponent, ObservedMask, RegressionPrior,
    StateComponent, StudentRegression, TimeSeriesRegressionData, VariancePrior,
};
pub use self::errors::{SsmError, SsmResult};
pub use self::models::StudentMvssModel;
pub use self::sampler::{PosteriorSampler, SamplerOptions, SamplerOutput, sample_posterior};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::{
        Ar1Component, CoefficientPrior, LocalLevelComponent, ObservedMask, PosteriorSampler,
        RegressionPrior, SamplerOptions, SamplerOutput, SsmError, SsmResult, StateComponent,
        StudentMvssModel, StudentRegression, TimeSeriesRegressionData, VariancePrior,
        sample_posterior,
    };
}
