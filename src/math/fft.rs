//! Discrete Fourier transforms for real series.
//!
//! Purpose
//! -------
//! The generic FFT collaborator: forward and inverse transforms of real
//! series, with a radix-2 Cooley-Tukey path for power-of-two lengths and a
//! direct DFT fallback for everything else, plus the reflection helper
//! used to symmetrize a series before transforming.
//!
//! Key behaviors
//! -------------
//! - The odd reflection (mirror without duplicating the endpoints) is
//!   implemented; the even reflection is a known gap and fails loudly with
//!   [`FftError::NotImplemented`] instead of guessing a convention.
//! - Transforms use the unnormalized forward / `1/n` inverse convention.
#[cfg(feature = "python-bindings")]
use pyo3::exceptions::PyValueError;
#[cfg(feature = "python-bindings")]
use pyo3::prelude::*;

use num_complex::Complex64;
use std::f64::consts::PI;

/// Result alias for FFT operations.
pub type FftResult<T> = Result<T, FftError>;

/// Errors from the FFT collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FftError {
    /// The transform was handed an empty series.
    EmptyInput,

    /// A deliberately unimplemented path was invoked.
    NotImplemented { what: &'static str },
}

impl std::error::Error for FftError {}

impl std::fmt::Display for FftError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FftError::EmptyInput => write!(f, "The transform requires a non-empty series."),
            FftError::NotImplemented { what } => write!(f, "{what} is not implemented."),
        }
    }
}

#[cfg(feature = "python-bindings")]
impl std::convert::From<FftError> for PyErr {
    fn from(err: FftError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

/// In-place radix-2 Cooley-Tukey transform; `inverse` flips the twiddle
/// sign. Length must be a power of two.
fn radix2(buffer: &mut [Complex64], inverse: bool) {
    let n = buffer.len();
    if n < 2 {
        return;
    }

    // Bit-reversal permutation.
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j |= bit;
        if i < j {
            buffer.swap(i, j);
        }
    }

    let sign = if inverse { 1.0 } else { -1.0 };
    let mut length = 2;
    while length <= n {
        let angle = sign * 2.0 * PI / length as f64;
        let root = Complex64::new(angle.cos(), angle.sin());
        for start in (0..n).step_by(length) {
            let mut twiddle = Complex64::new(1.0, 0.0);
            for offset in 0..length / 2 {
                let even = buffer[start + offset];
                let odd = buffer[start + offset + length / 2] * twiddle;
                buffer[start + offset] = even + odd;
                buffer[start + offset + length / 2] = even - odd;
                twiddle *= root;
            }
        }
        length <<= 1;
    }
}

/// Direct DFT for lengths the radix-2 path cannot take.
fn naive_dft(input: &[Complex64], inverse: bool) -> Vec<Complex64> {
    let n = input.len();
    let sign = if inverse { 1.0 } else { -1.0 };
    (0..n)
        .map(|k| {
            let mut sum = Complex64::new(0.0, 0.0);
            for (t, &value) in input.iter().enumerate() {
                let angle = sign * 2.0 * PI * (k * t) as f64 / n as f64;
                sum += value * Complex64::new(angle.cos(), angle.sin());
            }
            sum
        })
        .collect()
}

fn transform(mut buffer: Vec<Complex64>, inverse: bool) -> Vec<Complex64> {
    let n = buffer.len();
    if n.is_power_of_two() {
        radix2(&mut buffer, inverse);
        buffer
    } else {
        naive_dft(&buffer, inverse)
    }
}

/// Forward transform of a real series into its full complex spectrum.
///
/// # Errors
/// [`FftError::EmptyInput`] for an empty series.
pub fn real_fft(series: &[f64]) -> FftResult<Vec<Complex64>> {
    if series.is_empty() {
        return Err(FftError::EmptyInput);
    }
    let buffer: Vec<Complex64> = series.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    Ok(transform(buffer, false))
}

/// Inverse transform back to a real series (real parts of the scaled
/// inverse DFT).
///
/// # Errors
/// [`FftError::EmptyInput`] for an empty spectrum.
pub fn inverse_real_fft(spectrum: &[Complex64]) -> FftResult<Vec<f64>> {
    if spectrum.is_empty() {
        return Err(FftError::EmptyInput);
    }
    let n = spectrum.len() as f64;
    Ok(transform(spectrum.to_vec(), true).into_iter().map(|v| v.re / n).collect())
}

/// Extend a series with its reflection before transforming.
///
/// The odd reflection appends the reversed interior (endpoints not
/// duplicated), giving a series of length `2n - 2` whose periodic
/// extension is continuous. The even reflection convention is not settled
/// here and fails loudly.
///
/// # Errors
/// - [`FftError::EmptyInput`] for an empty series.
/// - [`FftError::NotImplemented`] for `even = true`.
pub fn concatenate_reflection(series: &[f64], even: bool) -> FftResult<Vec<f64>> {
    if series.is_empty() {
        return Err(FftError::EmptyInput);
    }
    if even {
        return Err(FftError::NotImplemented { what: "even-length series reflection" });
    }
    let mut reflected = series.to_vec();
    if series.len() > 2 {
        reflected.extend(series[1..series.len() - 1].iter().rev());
    }
    Ok(reflected)
}
