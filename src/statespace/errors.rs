//! Errors for the multivariate state-space core (configuration checks,
//! numerical failures, and deliberately unimplemented paths).
//!
//! This module defines the model error type, [`SsmError`], used across the
//! state-space core, the Gibbs sampler, the forecast simulator, and the GP
//! kernel collaborator. It implements `Display`/`Error` and converts to
//! `PyErr` at the PyO3 boundary when the `python-bindings` feature is on.
//!
//! ## Conventions
//! - **Indices are 0-based**; series indices lie in `[0, nseries)` and time
//!   indices in `[0, time_dimension)`.
//! - Configuration errors are detected eagerly at setup and are fatal to the
//!   current call; no component substitutes a default and continues.
//! - Numerical errors (non-positive-definite variance, degenerate Cholesky
//!   pivots) are fatal within an iteration; there is no silent retry or
//!   jitter regularization.
//! - Unimplemented paths (EM/gradient plumbing, even-length FFT reflection)
//!   fail loudly with [`SsmError::NotImplemented`] rather than returning
//!   zeros or partial results.
#[cfg(feature = "python-bindings")]
use pyo3::exceptions::PyValueError;
#[cfg(feature = "python-bindings")]
use pyo3::prelude::*;

/// Crate-wide result alias for state-space operations that may produce
/// [`SsmError`].
pub type SsmResult<T> = Result<T, SsmError>;

/// Unified error type for the state-space modeling core.
///
/// Covers configuration validation (dimensions, indices, priors), numerical
/// failures inside the Kalman recursions, and unimplemented code paths.
/// Implements `Display`/`Error` and converts to a Python `ValueError` at
/// PyO3 boundaries.
#[derive(Debug, Clone, PartialEq)]
pub enum SsmError {
    // ---- Configuration ----
    /// A series index fell outside `[0, nseries)`.
    SeriesIndexOutOfRange { series: usize, nseries: usize },

    /// A time index fell outside `[0, time_dimension)`.
    TimeIndexOutOfRange { time: usize, time_dimension: usize },

    /// Two observations claimed the same (series, time) identity.
    DuplicateObservation { series: usize, time: usize },

    /// Merging data from a model of a different concrete type.
    DataTypeMismatch { expected: &'static str },

    /// An operand's dimension disagreed with the model's.
    DimensionMismatch { what: &'static str, expected: usize, actual: usize },

    /// A predictor vector length disagreed with the model's xdim.
    PredictorLengthMismatch { expected: usize, actual: usize },

    /// A variance or scatter parameter was non-finite or non-positive.
    InvalidVariance { what: &'static str, value: f64 },

    /// Student-t degrees of freedom must be finite and > 0.
    InvalidDegreesOfFreedom { value: f64 },

    /// Per-series loading weights had the wrong length.
    InvalidLoadingsLength { expected: usize, actual: usize },

    /// An AR coefficient violated stationarity (|phi| >= 1).
    NonStationaryCoefficient { value: f64 },

    /// A sampler or forecast option failed validation.
    InvalidOption { name: &'static str, reason: String },

    /// A model was asked to sample with no state components registered.
    NoStateComponents,

    // ---- Parameter vectorization ----
    /// `unvectorize` received a vector of the wrong length.
    VectorizeLengthMismatch { expected: usize, actual: usize },

    /// `unvectorize` received a parameter value outside its domain.
    InvalidParameterValue { what: &'static str, value: f64 },

    // ---- Numerical ----
    /// A variance matrix lost positive semi-definiteness.
    NotPositiveDefinite { context: &'static str },

    /// A Cholesky factorization hit a non-positive pivot.
    CholeskyFailed { context: &'static str, pivot: usize, value: f64 },

    /// A recursion produced a non-finite value.
    NonFiniteValue { context: &'static str, value: f64 },

    // ---- Unimplemented paths ----
    /// A deliberately stubbed path was invoked.
    NotImplemented { what: &'static str },
}

impl std::error::Error for SsmError {}

impl std::fmt::Display for SsmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Configuration ----
            SsmError::SeriesIndexOutOfRange { series, nseries } => {
                write!(f, "Series index {series} is out of range [0, {nseries}).")
            }
            SsmError::TimeIndexOutOfRange { time, time_dimension } => {
                write!(f, "Time index {time} is out of range [0, {time_dimension}).")
            }
            SsmError::DuplicateObservation { series, time } => {
                write!(f, "An observation for series {series} at time {time} already exists.")
            }
            SsmError::DataTypeMismatch { expected } => {
                write!(f, "Data could not be combined: expected data of type {expected}.")
            }
            SsmError::DimensionMismatch { what, expected, actual } => {
                write!(f, "Dimension mismatch for {what}: expected {expected}, got {actual}.")
            }
            SsmError::PredictorLengthMismatch { expected, actual } => {
                write!(f, "Predictor length mismatch: expected {expected}, got {actual}.")
            }
            SsmError::InvalidVariance { what, value } => {
                write!(f, "{what} must be finite and > 0; got {value}.")
            }
            SsmError::InvalidDegreesOfFreedom { value } => {
                write!(f, "Degrees of freedom must be finite and > 0; got {value}.")
            }
            SsmError::InvalidLoadingsLength { expected, actual } => {
                write!(f, "Loading weights must have length {expected}; got {actual}.")
            }
            SsmError::NonStationaryCoefficient { value } => {
                write!(f, "AR coefficient must satisfy |phi| < 1; got {value}.")
            }
            SsmError::InvalidOption { name, reason } => {
                write!(f, "Invalid option {name}: {reason}")
            }
            SsmError::NoStateComponents => {
                write!(f, "The model has no state components; add state before sampling.")
            }
            // ---- Parameter vectorization ----
            SsmError::VectorizeLengthMismatch { expected, actual } => {
                write!(
                    f,
                    "Parameter vector length mismatch: expected {expected}, got {actual}."
                )
            }
            SsmError::InvalidParameterValue { what, value } => {
                write!(f, "Parameter {what} received an out-of-domain value: {value}.")
            }
            // ---- Numerical ----
            SsmError::NotPositiveDefinite { context } => {
                write!(f, "Variance matrix is not positive semi-definite in {context}.")
            }
            SsmError::CholeskyFailed { context, pivot, value } => {
                write!(
                    f,
                    "Cholesky factorization failed in {context}: pivot {pivot} has value {value}."
                )
            }
            SsmError::NonFiniteValue { context, value } => {
                write!(f, "Non-finite value produced in {context}: {value}.")
            }
            // ---- Unimplemented paths ----
            SsmError::NotImplemented { what } => {
                write!(f, "{what} is not implemented.")
            }
        }
    }
}

/// Convert an [`SsmError`] into a Python `ValueError` with the error message.
///
/// This is used at the Rust-Python boundary to surface domain errors cleanly.
#[cfg(feature = "python-bindings")]
impl std::convert::From<SsmError> for PyErr {
    fn from(err: SsmError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // These tests cover:
    // - Display formatting for representative variants of `SsmError`.
    //
    // They intentionally DO NOT cover:
    // - The PyErr conversion (exercised by Python-side integration tests).
    // -------------------------------------------------------------------------

    #[test]
    // Purpose
    // -------
    // Verify that configuration errors render the offending indices in their
    // message.
    //
    // Given
    // -----
    // - A `SeriesIndexOutOfRange` with series = 5, nseries = 3.
    //
    // Expect
    // ------
    // - The message contains both numbers.
    fn series_index_message_contains_indices() {
        let err = SsmError::SeriesIndexOutOfRange { series: 5, nseries: 3 };
        let msg = err.to_string();
        assert!(msg.contains('5'));
        assert!(msg.contains('3'));
    }

    #[test]
    // Purpose
    // -------
    // Ensure unimplemented paths advertise themselves as such.
    //
    // Given
    // -----
    // - A `NotImplemented` error for a named path.
    //
    // Expect
    // ------
    // - The message names the path and says "not implemented".
    fn not_implemented_message_is_loud() {
        let err = SsmError::NotImplemented { what: "observation model gradient" };
        let msg = err.to_string();
        assert!(msg.contains("observation model gradient"));
        assert!(msg.contains("not implemented"));
    }
}
