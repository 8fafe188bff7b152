//! models — user-facing state-space model surfaces.
//!
//! Purpose
//! -------
//! House the composed models built from [`crate::statespace::core`].
//! Currently the sole resident is the multivariate Student-t state-space
//! regression in [`student_mvss`].

pub mod student_mvss;

pub use self::student_mvss::StudentMvssModel;
