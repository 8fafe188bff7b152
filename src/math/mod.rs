//! math — generic numerical collaborators (Fourier transforms).

pub mod fft;

pub use self::fft::{concatenate_reflection, inverse_real_fft, real_fft, FftError, FftResult};
