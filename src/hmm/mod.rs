//! hmm — hidden-Markov-model samplers.
//!
//! Purpose
//! -------
//! Back the `fit_composite_hmm` and `fit_nested_hmm` entry points: a
//! single-sequence Gaussian-emission HMM ([`composite`]) and a
//! multi-stream categorical HMM with per-stream parallel
//! forward-filter/backward-sampling ([`nested`]).
//!
//! Conventions
//! -----------
//! - Initial hidden-state distributions are uniform and not sampled.
//! - All randomness derives from the caller's seed; the nested sampler's
//!   results are independent of its `thread_count`.

pub mod composite;
pub mod nested;

pub use self::composite::{fit_composite_hmm, CompositeHmmFit};
pub use self::nested::{fit_nested_hmm, NestedHmmFit, NestedHmmOptions};
