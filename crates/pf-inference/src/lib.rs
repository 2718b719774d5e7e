//! # pf-inference
//!
//! Fitting for posfun models.
//!
//! This crate provides:
//! - a bounded L-BFGS minimizer over plain `f64` objectives ([`optimizer`])
//! - maximum-likelihood estimation with Hessian-based uncertainties ([`mle`])
//!
//! Models are consumed through [`pf_core::LogDensityModel`] only.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Maximum-likelihood estimation via L-BFGS.
pub mod mle;
/// Generic numerical optimizer (argmin L-BFGS backend).
pub mod optimizer;

pub use mle::{MaximumLikelihoodEstimator, identifiability_warnings};
pub use optimizer::{LbfgsbOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
