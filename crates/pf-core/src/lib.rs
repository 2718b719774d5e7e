//! # pf-core
//!
//! Shared building blocks for the posfun workspace:
//! - [`Error`] / [`Result`] used by every library crate
//! - [`traits::LogDensityModel`], the seam between models and the optimizer
//! - [`FitResult`], the normalized output of a maximum-likelihood fit

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::LogDensityModel;
pub use types::FitResult;

/// Workspace version, reported by `posfun version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
