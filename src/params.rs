//! Numeric-parameter I/O contract shared by parameterized components.
//!
//! Purpose
//! -------
//! Define the [`Vectorize`] trait through which state components and GP
//! kernels expose their parameters as flat `f64` vectors and absorb updated
//! values back, for posterior-draw recording and host-language round-trips.
//!
//! Key behaviors
//! -------------
//! - `vectorize(minimal)` flattens a component's parameters into an
//!   `Array1<f64>`; `minimal = true` omits any parameter that is a
//!   deterministic function of the others.
//! - `unvectorize(v, minimal)` consumes such a vector and restores the
//!   component's parameters, validating domain constraints.
//!
//! Invariants & assumptions
//! ------------------------
//! - Round-trip exactness: `unvectorize(vectorize(c, m), m)` reproduces `c`'s
//!   observable parameters bit-for-bit when `m` matches between the calls.
//! - `parameter_count(minimal)` always equals the length of the vector
//!   produced by `vectorize(minimal)`.
//!
//! Conventions
//! -----------
//! - Implementations report length mismatches as
//!   [`SsmError::VectorizeLengthMismatch`] and out-of-domain values as
//!   [`SsmError::InvalidParameterValue`]; they never partially apply an
//!   update that later fails validation.
use ndarray::{Array1, ArrayView1};

use crate::statespace::errors::{SsmError, SsmResult};

/// Flat-vector parameter I/O for parameterized model components.
///
/// Implemented by every state component and GP kernel so that posterior
/// draws can be recorded uniformly and host environments can read or write
/// parameters without knowing the concrete variant.
pub trait Vectorize {
    /// Number of parameters reported by [`Vectorize::vectorize`] for the
    /// given `minimal` flag.
    fn parameter_count(&self, minimal: bool) -> usize;

    /// Flatten the component's parameters into a vector.
    ///
    /// With `minimal = true`, parameters that are deterministic functions of
    /// the others are omitted.
    fn vectorize(&self, minimal: bool) -> Array1<f64>;

    /// Restore the component's parameters from a flat vector produced by
    /// [`Vectorize::vectorize`] with the same `minimal` flag.
    ///
    /// # Errors
    /// - [`SsmError::VectorizeLengthMismatch`] if `v.len()` differs from
    ///   [`Vectorize::parameter_count`].
    /// - [`SsmError::InvalidParameterValue`] if any entry violates the
    ///   component's parameter domain.
    fn unvectorize(&mut self, v: ArrayView1<'_, f64>, minimal: bool) -> SsmResult<()>;

    /// Shared length check used by implementations before touching state.
    fn check_vector_length(&self, v: ArrayView1<'_, f64>, minimal: bool) -> SsmResult<()> {
        let expected = self.parameter_count(minimal);
        if v.len() != expected {
            return Err(SsmError::VectorizeLengthMismatch { expected, actual: v.len() });
        }
        Ok(())
    }
}
