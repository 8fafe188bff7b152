//! Errors for the mixture-model and hidden-Markov samplers.
//!
//! Same conventions as [`crate::statespace::errors`]: configuration errors
//! are detected before the first iteration and are fatal to the call;
//! numerical failures inside an iteration abort the chain. Draw-level
//! failures from the shared conjugate-draw helpers arrive wrapped via
//! `From<SsmError>`.
#[cfg(feature = "python-bindings")]
use pyo3::exceptions::PyValueError;
#[cfg(feature = "python-bindings")]
use pyo3::prelude::*;

use crate::statespace::errors::SsmError;

/// Result alias for mixture and HMM operations.
pub type MixtureResult<T> = Result<T, MixtureError>;

/// Unified error type for the mixture/HMM samplers.
#[derive(Debug, Clone, PartialEq)]
pub enum MixtureError {
    /// The fit was handed no observations.
    EmptyData,

    /// The fit was handed no mixture components / hidden states.
    NoComponents,

    /// An operand's dimension disagreed with the configuration.
    DimensionMismatch { what: &'static str, expected: usize, actual: usize },

    /// A Dirichlet concentration or proposal scale was out of domain.
    InvalidPrior { what: &'static str, value: f64 },

    /// A pinned source index pointed past the component set.
    KnownSourceOutOfRange { index: usize, ncomponents: usize },

    /// A known-source vector did not pair one entry with each observation.
    KnownSourceLengthMismatch { expected: usize, actual: usize },

    /// A stream symbol fell outside the declared alphabet.
    SymbolOutOfRange { symbol: usize, alphabet: usize },

    /// A stream violated the end-of-stream-marker contract.
    MalformedStream { stream: usize, reason: &'static str },

    /// A sampler option failed validation.
    InvalidOption { name: &'static str, reason: String },

    /// A draw or linear-algebra failure from the shared numerical core.
    Numerical(SsmError),
}

impl std::error::Error for MixtureError {}

impl std::fmt::Display for MixtureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MixtureError::EmptyData => {
                write!(f, "The sampler requires at least one observation.")
            }
            MixtureError::NoComponents => {
                write!(f, "The sampler requires at least one component.")
            }
            MixtureError::DimensionMismatch { what, expected, actual } => {
                write!(f, "Dimension mismatch for {what}: expected {expected}, got {actual}.")
            }
            MixtureError::InvalidPrior { what, value } => {
                write!(f, "{what} must be finite and > 0; got {value}.")
            }
            MixtureError::KnownSourceOutOfRange { index, ncomponents } => {
                write!(f, "Known source {index} is out of range [0, {ncomponents}).")
            }
            MixtureError::KnownSourceLengthMismatch { expected, actual } => {
                write!(f, "Known-source vector must have length {expected}; got {actual}.")
            }
            MixtureError::SymbolOutOfRange { symbol, alphabet } => {
                write!(f, "Stream symbol {symbol} is out of range [0, {alphabet}).")
            }
            MixtureError::MalformedStream { stream, reason } => {
                write!(f, "Stream {stream} is malformed: {reason}.")
            }
            MixtureError::InvalidOption { name, reason } => {
                write!(f, "Invalid option {name}: {reason}")
            }
            MixtureError::Numerical(err) => write!(f, "{err}"),
        }
    }
}

impl From<SsmError> for MixtureError {
    fn from(err: SsmError) -> Self {
        MixtureError::Numerical(err)
    }
}

/// Convert a [`MixtureError`] into a Python `ValueError` with the message.
#[cfg(feature = "python-bindings")]
impl std::convert::From<MixtureError> for PyErr {
    fn from(err: MixtureError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
