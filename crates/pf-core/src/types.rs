//! Common data types for posfun

use serde::{Deserialize, Serialize};

/// Fit result containing parameter estimates and uncertainties
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Best-fit parameter values
    pub parameters: Vec<f64>,

    /// Parameter uncertainties (sqrt of covariance diagonal)
    pub uncertainties: Vec<f64>,

    /// Covariance matrix (row-major, N×N). `None` if Hessian inversion failed.
    pub covariance: Option<Vec<f64>>,

    /// Negative log-likelihood at minimum
    pub nll: f64,

    /// Convergence status
    pub converged: bool,

    /// Number of optimizer iterations
    pub n_iter: usize,

    /// Number of objective evaluations
    pub n_fev: usize,

    /// Number of gradient evaluations
    pub n_gev: usize,

    /// Optimizer termination message
    #[serde(default)]
    pub message: String,

    /// Identifiability / numerical warnings collected after the fit
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl FitResult {
    /// Create a new fit result
    pub fn new(
        parameters: Vec<f64>,
        uncertainties: Vec<f64>,
        nll: f64,
        converged: bool,
        n_iter: usize,
        n_fev: usize,
        n_gev: usize,
    ) -> Self {
        Self {
            parameters,
            uncertainties,
            covariance: None,
            nll,
            converged,
            n_iter,
            n_fev,
            n_gev,
            message: String::new(),
            warnings: Vec::new(),
        }
    }

    /// Create a fit result with covariance matrix
    #[allow(clippy::too_many_arguments)]
    pub fn with_covariance(
        parameters: Vec<f64>,
        uncertainties: Vec<f64>,
        covariance: Vec<f64>,
        nll: f64,
        converged: bool,
        n_iter: usize,
        n_fev: usize,
        n_gev: usize,
    ) -> Self {
        let mut fr = Self::new(parameters, uncertainties, nll, converged, n_iter, n_fev, n_gev);
        fr.covariance = Some(covariance);
        fr
    }

    /// Attach the optimizer termination message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_result() {
        let result = FitResult::new(vec![0.5, 0.0], vec![0.1, 1.0], 3.09, true, 12, 20, 20);
        assert_eq!(result.parameters.len(), 2);
        assert_eq!(result.uncertainties.len(), 2);
        assert!(result.converged);
        assert!(result.covariance.is_none());
        assert!(result.message.is_empty() && result.warnings.is_empty());
    }

    #[test]
    fn test_with_covariance() {
        let cov = vec![0.04, 0.01, 0.01, 1.0];
        let result = FitResult::with_covariance(
            vec![0.5, 0.0],
            vec![0.2, 1.0],
            cov.clone(),
            1.0,
            true,
            1,
            1,
            1,
        );
        assert_eq!(result.covariance, Some(cov));
    }

    #[test]
    fn test_serde_roundtrip_keeps_message() {
        let result = FitResult::new(vec![0.5], vec![0.1], 1.0, false, 3, 4, 4)
            .with_message("Maximum number of iterations reached");
        let json = serde_json::to_string(&result).unwrap();
        let back: FitResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.message, "Maximum number of iterations reached");
        assert!(!back.converged);
    }
}
