//! gp — Gaussian-process collaborator types (kernels and mean functions).

pub mod kernels;

pub use self::kernels::{Kernel, MeanFunction};
