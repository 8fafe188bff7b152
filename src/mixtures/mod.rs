//! mixtures — finite and covariate-dependent Gaussian mixture samplers.
//!
//! Purpose
//! -------
//! Back the `fit_finite_mixture` and `fit_conditional_mixture` entry
//! points: Gibbs chains over univariate Gaussian components with a
//! Dirichlet mixing prior ([`finite`]) or multinomial-logit mixing weights
//! updated by Metropolis-within-Gibbs ([`conditional`]).
//!
//! Conventions
//! -----------
//! - Every fit validates its configuration before the first iteration and
//!   seeds its own random stream from the caller's `seed`.
//! - `known_source` pins latent assignments, which is also the supported
//!   way to anchor component labels in tests and downstream summaries.

pub mod conditional;
pub mod errors;
pub mod finite;

pub use self::conditional::{fit_conditional_mixture, ConditionalMixtureFit};
pub use self::errors::{MixtureError, MixtureResult};
pub use self::finite::{fit_finite_mixture, FiniteMixtureFit, GaussianComponent};
