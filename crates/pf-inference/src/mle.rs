//! Maximum Likelihood Estimation

use crate::optimizer::{LbfgsbOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
use nalgebra::DMatrix;
use pf_core::{Error, FitResult, LogDensityModel, Result};

/// Check for identifiability issues based on the Hessian and uncertainties.
///
/// Returns a list of human-readable warning strings (empty if the model is well-identified).
pub fn identifiability_warnings(
    hessian: &DMatrix<f64>,
    n: usize,
    param_names: &[String],
    uncertainties: &[f64],
) -> Vec<String> {
    let mut warnings = Vec::new();

    // Near-singular Hessian: condition number via SVD
    if n > 0 {
        let svd = hessian.clone().svd(false, false);
        let svals = &svd.singular_values;
        let s_max = svals.iter().fold(0.0_f64, |a, &b| a.max(b));
        let s_min = svals.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        if s_min > 0.0 {
            let cond = s_max / s_min;
            if cond > 1e8 {
                warnings.push(format!(
                    "Hessian condition number = {:.1e}: model may be poorly identified",
                    cond
                ));
            }
        } else {
            warnings.push("Hessian is singular: model is not identifiable".into());
        }
    }

    for i in 0..n.min(param_names.len()).min(uncertainties.len()) {
        if !uncertainties[i].is_finite() {
            warnings.push(format!(
                "Parameter '{}': uncertainty is {}",
                param_names[i], uncertainties[i]
            ));
        }
    }

    for i in 0..n.min(param_names.len()) {
        if hessian[(i, i)].abs() < 1e-12 {
            warnings.push(format!(
                "Parameter '{}': near-zero Hessian diagonal, not identifiable",
                param_names[i]
            ));
        }
    }

    warnings
}

/// [`ObjectiveFunction`] view of a model: NLL plus its AD gradient.
struct ModelObjective<'a, M: LogDensityModel + ?Sized> {
    model: &'a M,
}

impl<M: LogDensityModel + ?Sized> ObjectiveFunction for ModelObjective<'_, M> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        self.model.nll(params)
    }

    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        self.model.grad_nll(params)
    }
}

/// Maximum Likelihood Estimator
///
/// Fits statistical models by minimizing negative log-likelihood.
#[derive(Clone, Default)]
pub struct MaximumLikelihoodEstimator {
    config: OptimizerConfig,
}

impl MaximumLikelihoodEstimator {
    /// Create a new MLE with default configuration
    pub fn new() -> Self {
        Self { config: OptimizerConfig::default() }
    }

    /// Create MLE with custom optimizer configuration
    pub fn with_config(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Access the optimizer configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Fit any [`LogDensityModel`] by minimizing negative log-likelihood.
    ///
    /// # Returns
    /// FitResult with best-fit parameters, uncertainties, covariance and warnings
    pub fn fit<M: LogDensityModel>(&self, model: &M) -> Result<FitResult> {
        let result = self.fit_minimum(model)?;
        self.finish_fit(model, result)
    }

    /// Fit from an explicit starting point with full Hessian/covariance.
    ///
    /// Like [`fit`](Self::fit), but uses `initial_params` instead of `model.parameter_init()`.
    pub fn fit_from<M: LogDensityModel>(
        &self,
        model: &M,
        initial_params: &[f64],
    ) -> Result<FitResult> {
        let result = self.fit_minimum_from(model, initial_params)?;
        self.finish_fit(model, result)
    }

    /// Minimize NLL and return the optimizer result, without Hessian/covariance.
    pub fn fit_minimum(&self, model: &impl LogDensityModel) -> Result<OptimizationResult> {
        let initial_params: Vec<f64> = model.parameter_init();
        self.fit_minimum_from(model, &initial_params)
    }

    /// Minimize NLL from an explicit starting point.
    pub fn fit_minimum_from(
        &self,
        model: &impl LogDensityModel,
        initial_params: &[f64],
    ) -> Result<OptimizationResult> {
        if initial_params.len() != model.dim() {
            return Err(Error::Validation(format!(
                "fit_minimum_from: initial_params length {} != model.dim() {}",
                initial_params.len(),
                model.dim()
            )));
        }
        let bounds: Vec<(f64, f64)> = model.parameter_bounds();
        let objective = ModelObjective { model };
        let optimizer = LbfgsbOptimizer::new(self.config.clone());
        optimizer.minimize(&objective, initial_params, &bounds)
    }

    /// Attach uncertainties, covariance and warnings to a finished minimization.
    fn finish_fit<M: LogDensityModel>(
        &self,
        model: &M,
        result: OptimizationResult,
    ) -> Result<FitResult> {
        let hessian = self.compute_hessian(model, &result.parameters)?;
        let n = result.parameters.len();
        let diag_uncertainties = self.diagonal_uncertainties(&hessian, n);
        let n_iter = result.n_iter as usize;

        let fr = match self.invert_hessian(&hessian, n) {
            Some(covariance) => {
                let mut all_variances_ok = true;
                let mut uncertainties = Vec::with_capacity(n);
                for i in 0..n {
                    let var = covariance[(i, i)];
                    if var.is_finite() && var > 0.0 {
                        uncertainties.push(var.sqrt());
                    } else {
                        all_variances_ok = false;
                        uncertainties.push(diag_uncertainties[i]);
                    }
                }

                if all_variances_ok {
                    // Symmetric, so column-major storage is also row-major.
                    let cov_flat: Vec<f64> = covariance.iter().copied().collect();
                    FitResult::with_covariance(
                        result.parameters,
                        uncertainties,
                        cov_flat,
                        result.fval,
                        result.converged,
                        n_iter,
                        result.n_fev,
                        result.n_gev,
                    )
                } else {
                    log::warn!("Invalid covariance diagonal; omitting covariance matrix");
                    FitResult::new(
                        result.parameters,
                        uncertainties,
                        result.fval,
                        result.converged,
                        n_iter,
                        result.n_fev,
                        result.n_gev,
                    )
                }
            }
            None => {
                log::warn!("Hessian inversion failed, using diagonal approximation");
                FitResult::new(
                    result.parameters,
                    diag_uncertainties,
                    result.fval,
                    result.converged,
                    n_iter,
                    result.n_fev,
                    result.n_gev,
                )
            }
        };
        let mut fr = fr.with_message(result.message);

        let param_names = model.parameter_names();
        fr.warnings = identifiability_warnings(&hessian, n, &param_names, &fr.uncertainties);
        for w in &fr.warnings {
            log::warn!("{}", w);
        }
        if !fr.converged {
            log::warn!("Fit did not converge: {}", fr.message);
        }

        Ok(fr)
    }

    /// Compute full Hessian matrix using forward differences of the analytical gradient.
    ///
    /// H_{ij} = (∂g_i/∂x_j) ≈ (g_i(x + ε·e_j) − g_i(x)) / ε
    ///
    /// Cost: N+1 gradient evaluations.
    fn compute_hessian(
        &self,
        model: &impl LogDensityModel,
        best_params: &[f64],
    ) -> Result<DMatrix<f64>> {
        let n = best_params.len();
        let grad_center = model.grad_nll(best_params)?;

        let mut hessian = DMatrix::zeros(n, n);

        for j in 0..n {
            let eps = 1e-4 * best_params[j].abs().max(1.0);

            let mut params_plus = best_params.to_vec();
            params_plus[j] += eps;
            let grad_plus = model.grad_nll(&params_plus)?;

            for i in 0..n {
                hessian[(i, j)] = (grad_plus[i] - grad_center[i]) / eps;
            }
        }

        let ht = hessian.transpose();
        hessian = (&hessian + &ht) * 0.5;

        Ok(hessian)
    }

    /// Invert Hessian to get covariance matrix via damped Cholesky decomposition.
    ///
    /// Returns `None` if no positive-definite inverse could be found.
    fn invert_hessian(&self, hessian: &DMatrix<f64>, n: usize) -> Option<DMatrix<f64>> {
        if hessian.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let identity = DMatrix::identity(n, n);

        // Damping scaled to the Hessian diagonal.
        let diag_scale = (0..n).map(|i| hessian[(i, i)].abs()).fold(0.0_f64, f64::max).max(1.0);

        let mut h_damped = hessian.clone();
        let mut damping = 0.0_f64;
        let max_attempts = 10;

        for attempt in 0..max_attempts {
            if let Some(chol) = nalgebra::linalg::Cholesky::new(h_damped.clone()) {
                if damping > 0.0 {
                    log::debug!("Hessian needed diagonal damping {:.3e}", damping);
                }
                return Some(chol.solve(&identity));
            }

            if attempt + 1 == max_attempts {
                break;
            }

            let next_damping = if damping == 0.0 { diag_scale * 1e-9 } else { damping * 10.0 };
            let add = next_damping - damping;
            for i in 0..n {
                h_damped[(i, i)] += add;
            }
            damping = next_damping;
        }

        let cov = h_damped.lu().try_inverse()?;
        for i in 0..n {
            let v = cov[(i, i)];
            if !(v.is_finite() && v > 0.0) {
                return None;
            }
        }
        Some(cov)
    }

    /// Extract uncertainties from Hessian diagonal (fallback).
    fn diagonal_uncertainties(&self, hessian: &DMatrix<f64>, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let hess_ii = hessian[(i, i)];
                let denom = hess_ii.abs().max(1e-12);
                1.0 / denom.sqrt()
            })
            .collect()
    }
}
