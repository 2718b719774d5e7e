//! Core traits for posfun
//!
//! [`LogDensityModel`] is the only seam between a model and the inference
//! layer: the optimizer sees parameter vectors, an NLL and its gradient,
//! never the model's data or its AD machinery.

use crate::Result;

/// A model exposing a negative log-likelihood over a flat parameter vector.
pub trait LogDensityModel: Send + Sync {
    /// Number of parameters.
    fn dim(&self) -> usize;

    /// Parameter names, in parameter-vector order.
    fn parameter_names(&self) -> Vec<String>;

    /// Parameter bounds `(min, max)`; use infinities for unbounded parameters.
    fn parameter_bounds(&self) -> Vec<(f64, f64)>;

    /// Initial parameter values.
    fn parameter_init(&self) -> Vec<f64>;

    /// Negative log-likelihood at `params`.
    fn nll(&self, params: &[f64]) -> Result<f64>;

    /// Gradient of the negative log-likelihood at `params`.
    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>>;
}
