//! core — numerical and structural building blocks for the state-space stack.
//!
//! Purpose
//! -------
//! Collect the pieces the model layer composes: observation containers and
//! the multivariate panel policy ([`data`]), the closed set of state
//! components ([`component`]), composite-state bookkeeping ([`manager`]),
//! the Kalman filter/smoother/simulation-smoother engine ([`kalman`]), the
//! Student-t weight augmentation ([`weights`]), per-series regression
//! observation models ([`regression`]), and the small dense linear algebra
//! and conjugate-draw helpers everything else leans on ([`linalg`],
//! [`draws`]).
//!
//! Key behaviors
//! -------------
//! - Every fallible routine returns
//!   [`crate::statespace::errors::SsmResult`]; numerical failures (a
//!   forecast variance that will not factor, a non-finite input) surface as
//!   errors rather than being patched with jitter.
//! - Randomness always flows in through a caller-supplied `Rng`, so every
//!   draw in the stack is reproducible from one seed.
//!
//! Conventions
//! -----------
//! - State paths are `state_dimension x time_dimension` arrays, one column
//!   per period; panel observations are `nseries x time_dimension`.
//! - Partially observed periods are handled by dropping rows, never by
//!   imputing observations inside the filter.

pub mod component;
pub mod data;
pub mod draws;
pub mod kalman;
pub mod linalg;
pub mod manager;
pub mod regression;
pub mod weights;

pub use self::component::{
    Ar1Component, CoefficientPrior, LocalLevelComponent, StateComponent, VariancePrior,
};
pub use self::data::{DataPolicy, ObservedMask, StateIsolation, TimeSeriesRegressionData};
pub use self::kalman::{KalmanFilterOutput, StateSpace};
pub use self::manager::{ComponentHandle, SeriesProxy, StateManager};
pub use self::regression::{RegressionPrior, StudentRegression};
