//! Optimization algorithms
//!
//! Thin wrapper around argmin's L-BFGS with a More-Thuente line search.
//! Box constraints are enforced by clamping every trial point and projecting
//! the gradient at active bounds.
//!
//! A non-finite objective at a trial point does not end the fit: the run is
//! repeated from the start with a backtracking line search that treats such a
//! point as `+inf` and shrinks the step. Only a non-finite value at the
//! starting point is an error.

use argmin::core::{
    CostFunction, Executor, Gradient, IterState, Solver, State, TerminationReason,
    TerminationStatus,
};
use argmin::solver::linesearch::condition::ArmijoCondition;
use argmin::solver::linesearch::{BacktrackingLineSearch, MoreThuenteLineSearch};
use argmin::solver::quasinewton::LBFGS;
use pf_core::{Error, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Sufficient-decrease constant of the fallback Armijo search.
const ARMIJO_C: f64 = 1e-4;
/// Step contraction factor of the fallback search.
const BACKTRACK_RHO: f64 = 0.5;

type LbfgsState = IterState<Vec<f64>, Vec<f64>, (), (), (), f64>;

/// Configuration for the L-BFGS optimizer
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Convergence tolerance for gradient norm
    pub tol: f64,
    /// Number of corrections to approximate inverse Hessian
    pub m: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 1000, tol: 1e-6, m: 10 }
    }
}

/// Result of optimization
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best-fit parameters
    pub parameters: Vec<f64>,
    /// Function value at minimum
    pub fval: f64,
    /// Number of iterations
    pub n_iter: u64,
    /// Number of objective (cost) evaluations.
    pub n_fev: usize,
    /// Number of gradient evaluations.
    pub n_gev: usize,
    /// Convergence status
    pub converged: bool,
    /// Termination message
    pub message: String,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, n_fev={}, n_gev={}, converged={})",
            self.fval, self.n_iter, self.n_fev, self.n_gev, self.converged
        )
    }
}

/// Objective function trait for optimization
pub trait ObjectiveFunction: Send + Sync {
    /// Evaluate function at given parameters
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Compute gradient at given parameters (numerical if not overridden)
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let mut grad = vec![0.0; params.len()];
        for i in 0..params.len() {
            // h = sqrt(machine epsilon) * max(|x_i|, 1)
            let h = 1e-8 * params[i].abs().max(1.0);

            let mut params_plus = params.to_vec();
            params_plus[i] += h;
            let f_plus = self.eval(&params_plus)?;

            let mut params_minus = params.to_vec();
            params_minus[i] -= h;
            let f_minus = self.eval(&params_minus)?;

            grad[i] = (f_plus - f_minus) / (2.0 * h);
        }
        Ok(grad)
    }
}

/// What the cost function reports for a non-finite objective value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NonFinite {
    /// Abort the run with an error.
    Fail,
    /// Return `+inf` so the Armijo test rejects the trial step.
    Reject,
}

/// Adapter exposing an [`ObjectiveFunction`] to argmin.
struct ArgminProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    bounds: &'a [(f64, f64)],
    counts: Arc<FuncCounts>,
    on_non_finite: NonFinite,
}

fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds.iter()).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

#[derive(Default)]
struct FuncCounts {
    cost: AtomicUsize,
    grad: AtomicUsize,
    /// Set once any trial point produced a non-finite objective value.
    non_finite: AtomicBool,
}

impl CostFunction for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.counts.cost.fetch_add(1, Ordering::Relaxed);
        let clamped = clamp_params(params, self.bounds);
        let value =
            self.objective.eval(&clamped).map_err(|e| argmin::core::Error::msg(e.to_string()))?;
        if !value.is_finite() {
            self.counts.non_finite.store(true, Ordering::Relaxed);
            return match self.on_non_finite {
                NonFinite::Reject => {
                    log::trace!("rejecting trial point {:?}: objective is {}", clamped, value);
                    Ok(f64::INFINITY)
                }
                NonFinite::Fail => Err(argmin::core::Error::msg(format!(
                    "objective is not finite ({}) at {:?}",
                    value, clamped
                ))),
            };
        }
        Ok(value)
    }
}

impl Gradient for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(
        &self,
        params: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        self.counts.grad.fetch_add(1, Ordering::Relaxed);
        let clamped = clamp_params(params, self.bounds);
        let mut g = self
            .objective
            .gradient(&clamped)
            .map_err(|e| argmin::core::Error::msg(e.to_string()))?;
        if let Some(bad) = g.iter().find(|v| !v.is_finite()) {
            return Err(argmin::core::Error::msg(format!(
                "gradient is not finite ({}) at {:?}",
                bad, clamped
            )));
        }

        // Projected gradient: drop components pushing further outside an active bound.
        const EPS: f64 = 1e-12;
        for (i, (&x, &(lo, hi))) in clamped.iter().zip(self.bounds.iter()).enumerate() {
            if x <= lo + EPS && g[i] > 0.0 {
                g[i] = 0.0;
            }
            if x >= hi - EPS && g[i] < 0.0 {
                g[i] = 0.0;
            }
        }

        Ok(g)
    }
}

/// L-BFGS optimizer with box constraints
pub struct LbfgsbOptimizer {
    config: OptimizerConfig,
}

impl LbfgsbOptimizer {
    /// Create new optimizer with given configuration
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Minimize objective function with bounds
    ///
    /// # Arguments
    /// * `objective` - Objective function to minimize
    /// * `init_params` - Initial parameter values
    /// * `bounds` - Parameter bounds as (lower, upper) for each parameter
    ///
    /// # Errors
    /// [`Error::Validation`] for mismatched lengths or an invalid configuration.
    /// [`Error::Computation`] when the objective is not finite at the starting
    /// point, when a gradient is not finite, or when the run fails otherwise.
    /// Errors returned by `objective` are propagated.
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init_params: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        if init_params.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "Parameter and bounds length mismatch: {} != {}",
                init_params.len(),
                bounds.len()
            )));
        }

        let init_clamped = clamp_params(init_params, bounds);
        let counts = Arc::new(FuncCounts::default());

        counts.cost.fetch_add(1, Ordering::Relaxed);
        let f0 = objective.eval(&init_clamped)?;
        if !f0.is_finite() {
            return Err(Error::Computation(format!(
                "objective is not finite ({}) at the starting point {:?}",
                f0, init_clamped
            )));
        }

        log::debug!(
            "L-BFGS start: init={:?}, f0={}, max_iter={}, tol={}, m={}",
            init_clamped,
            f0,
            self.config.max_iter,
            self.config.tol,
            self.config.m
        );

        let problem = ArgminProblem {
            objective,
            bounds,
            counts: counts.clone(),
            on_non_finite: NonFinite::Fail,
        };
        let first = self.run(problem, MoreThuenteLineSearch::new(), init_clamped.clone());

        let state = match first {
            Ok(state) => state,
            Err(e) if counts.non_finite.load(Ordering::Relaxed) => {
                log::warn!(
                    "non-finite objective during the line search ({}); \
                     restarting with a backtracking line search",
                    e
                );
                let condition = ArmijoCondition::new(ARMIJO_C).map_err(invalid_config)?;
                let linesearch = BacktrackingLineSearch::new(condition)
                    .rho(BACKTRACK_RHO)
                    .map_err(invalid_config)?;
                let problem = ArgminProblem {
                    objective,
                    bounds,
                    counts: counts.clone(),
                    on_non_finite: NonFinite::Reject,
                };
                self.run(problem, linesearch, init_clamped)?
            }
            Err(e) => return Err(e),
        };

        let best_params_unclamped = state
            .get_best_param()
            .ok_or_else(|| Error::Computation("No best parameters found".to_string()))?
            .clone();
        let best_params = clamp_params(&best_params_unclamped, bounds);
        let fval = state.get_best_cost();
        let n_iter = state.get_iter();
        let n_fev = counts.cost.load(Ordering::Relaxed);
        let n_gev = counts.grad.load(Ordering::Relaxed);

        let termination = state.get_termination_status();
        let converged = matches!(
            termination,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );
        let message = termination.to_string();

        let result = OptimizationResult {
            parameters: best_params,
            fval,
            n_iter,
            n_fev,
            n_gev,
            converged,
            message,
        };
        log::debug!("L-BFGS done: {}", result);
        Ok(result)
    }
}

impl LbfgsbOptimizer {
    /// Run L-BFGS with `linesearch` from `init` and return the final state.
    fn run<'a, L>(
        &self,
        problem: ArgminProblem<'a>,
        linesearch: L,
        init: Vec<f64>,
    ) -> Result<LbfgsState>
    where
        LBFGS<L, Vec<f64>, Vec<f64>, f64>: Solver<ArgminProblem<'a>, LbfgsState>,
    {
        // argmin's default cost tolerance (~machine epsilon) is too strict for NLL scales.
        let tol_cost =
            if self.config.tol == 0.0 { 0.0 } else { (0.1 * self.config.tol).max(1e-12) };
        let solver: LBFGS<L, Vec<f64>, Vec<f64>, f64> = LBFGS::new(linesearch, self.config.m)
            .with_tolerance_grad(self.config.tol)
            .map_err(invalid_config)?
            .with_tolerance_cost(tol_cost)
            .map_err(invalid_config)?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(init).max_iters(self.config.max_iter))
            .run()
            .map_err(|e| Error::Computation(format!("Optimization failed: {}", e)))?;
        Ok(res.state)
    }
}

fn invalid_config(e: argmin::core::Error) -> Error {
    Error::Validation(format!("Invalid optimizer configuration: {e}"))
}

impl Default for LbfgsbOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // f(x, y) = (x - 2)^2 + (y - 3)^2, minimum at (2, 3)
    struct QuadraticFunction;

    impl ObjectiveFunction for QuadraticFunction {
        fn eval(&self, params: &[f64]) -> Result<f64> {
            let x = params[0];
            let y = params[1];
            Ok((x - 2.0).powi(2) + (y - 3.0).powi(2))
        }

        fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
            let x = params[0];
            let y = params[1];
            Ok(vec![2.0 * (x - 2.0), 2.0 * (y - 3.0)])
        }
    }

    #[test]
    fn test_optimizer_quadratic() {
        let config = OptimizerConfig { max_iter: 100, tol: 1e-6, m: 10 };
        let optimizer = LbfgsbOptimizer::new(config);

        let init = vec![0.0, 0.0];
        let bounds = vec![(-10.0, 10.0), (-10.0, 10.0)];
        let result = optimizer.minimize(&QuadraticFunction, &init, &bounds).unwrap();

        assert!(result.converged, "Optimizer should converge: {}", result.message);
        assert_relative_eq!(result.parameters[0], 2.0, epsilon = 1e-4);
        assert_relative_eq!(result.parameters[1], 3.0, epsilon = 1e-4);
        assert_relative_eq!(result.fval, 0.0, epsilon = 1e-6);
        assert!(result.n_fev > 0 && result.n_gev > 0);
    }

    #[test]
    fn test_optimizer_with_bounds() {
        let optimizer = LbfgsbOptimizer::default();

        // x in [3, 5], y in [1, 2]: constrained optimum at (3, 2)
        let init = vec![4.0, 1.5];
        let bounds = vec![(3.0, 5.0), (1.0, 2.0)];
        let result = optimizer.minimize(&QuadraticFunction, &init, &bounds).unwrap();

        assert_relative_eq!(result.parameters[0], 3.0, epsilon = 1e-4);
        assert_relative_eq!(result.parameters[1], 2.0, epsilon = 1e-4);
        assert!(
            result.converged,
            "Optimizer should converge at constrained optimum, not MaxIter. Status: {}",
            result.message
        );
    }

    #[test]
    fn test_optimizer_unbounded() {
        let optimizer = LbfgsbOptimizer::default();
        let init = vec![-7.0, 11.0];
        let bounds = vec![(f64::NEG_INFINITY, f64::INFINITY); 2];
        let result = optimizer.minimize(&QuadraticFunction, &init, &bounds).unwrap();

        assert!(result.converged);
        assert_relative_eq!(result.parameters[0], 2.0, epsilon = 1e-4);
        assert_relative_eq!(result.parameters[1], 3.0, epsilon = 1e-4);
    }

    // Rosenbrock: (1 - x)^2 + 100 (y - x^2)^2, minimum at (1, 1).
    // No analytical gradient: exercises the central-difference default.
    struct RosenbrockFunction;

    impl ObjectiveFunction for RosenbrockFunction {
        fn eval(&self, params: &[f64]) -> Result<f64> {
            let x = params[0];
            let y = params[1];
            Ok((1.0 - x).powi(2) + 100.0 * (y - x.powi(2)).powi(2))
        }
    }

    #[test]
    fn test_optimizer_rosenbrock() {
        let optimizer = LbfgsbOptimizer::default();
        let init = vec![0.0, 0.0];
        let bounds = vec![(-10.0, 10.0), (-10.0, 10.0)];
        let result = optimizer.minimize(&RosenbrockFunction, &init, &bounds).unwrap();

        assert_relative_eq!(result.parameters[0], 1.0, epsilon = 1e-3);
        assert_relative_eq!(result.parameters[1], 1.0, epsilon = 1e-3);
        assert!(result.fval < 1e-4);
    }

    #[test]
    fn test_default_gradient_matches_analytical() {
        let params = [0.7, -1.2];
        let numerical = RosenbrockFunction.gradient(&params).unwrap();
        let (x, y) = (params[0], params[1]);
        let analytical =
            [-2.0 * (1.0 - x) - 400.0 * x * (y - x * x), 200.0 * (y - x * x)];
        for i in 0..2 {
            assert_relative_eq!(numerical[i], analytical[i], max_relative = 1e-5);
        }
    }

    #[test]
    fn test_optimizer_1d_pinned_at_lower_bound() {
        // (x + 1)^2 on [0, 10]: constrained minimum at x = 0.
        struct Quadratic1D;

        impl ObjectiveFunction for Quadratic1D {
            fn eval(&self, params: &[f64]) -> Result<f64> {
                Ok((params[0] + 1.0).powi(2))
            }

            fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
                Ok(vec![2.0 * (params[0] + 1.0)])
            }
        }

        let config = OptimizerConfig { max_iter: 100, tol: 1e-8, m: 10 };
        let optimizer = LbfgsbOptimizer::new(config);
        let result = optimizer.minimize(&Quadratic1D, &[5.0], &[(0.0, 10.0)]).unwrap();

        assert_relative_eq!(result.parameters[0], 0.0, epsilon = 1e-10);
        assert_relative_eq!(result.fval, 1.0, epsilon = 1e-10);
        assert!(result.converged, "Status: {}", result.message);
        assert!(result.n_iter < 20, "used {} iterations", result.n_iter);
    }

    #[test]
    fn test_non_finite_start_is_computation_error() {
        struct AlwaysNan;

        impl ObjectiveFunction for AlwaysNan {
            fn eval(&self, _params: &[f64]) -> Result<f64> {
                Ok(f64::NAN)
            }

            fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
                Ok(vec![0.0; params.len()])
            }
        }

        let err =
            LbfgsbOptimizer::default().minimize(&AlwaysNan, &[1.0], &[(-5.0, 5.0)]).unwrap_err();
        assert!(matches!(err, Error::Computation(_)), "got {:?}", err);
        assert!(err.to_string().contains("starting point"), "got {}", err);
    }

    #[test]
    fn test_non_finite_trial_point_shrinks_step() {
        // (x - 0.9)^2 inside (-1, 1), NaN outside. The first full step from
        // -0.9 lands at 2.7.
        struct Walled;

        impl ObjectiveFunction for Walled {
            fn eval(&self, params: &[f64]) -> Result<f64> {
                let x = params[0];
                Ok(if x.abs() < 1.0 { (x - 0.9).powi(2) } else { f64::NAN })
            }

            fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
                Ok(vec![2.0 * (params[0] - 0.9)])
            }
        }

        let bounds = [(f64::NEG_INFINITY, f64::INFINITY)];
        let result = LbfgsbOptimizer::default().minimize(&Walled, &[-0.9], &bounds).unwrap();

        assert!(result.converged, "{}", result.message);
        assert_relative_eq!(result.parameters[0], 0.9, epsilon = 1e-6);
        assert_relative_eq!(result.fval, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_non_finite_gradient_is_computation_error() {
        struct NanGradient;

        impl ObjectiveFunction for NanGradient {
            fn eval(&self, params: &[f64]) -> Result<f64> {
                Ok(params[0] * params[0])
            }

            fn gradient(&self, _params: &[f64]) -> Result<Vec<f64>> {
                Ok(vec![f64::NAN])
            }
        }

        let err =
            LbfgsbOptimizer::default().minimize(&NanGradient, &[1.0], &[(-5.0, 5.0)]).unwrap_err();
        assert!(matches!(err, Error::Computation(_)), "got {:?}", err);
        assert!(err.to_string().contains("gradient is not finite"), "got {}", err);
    }

    #[test]
    fn test_objective_error_is_propagated() {
        struct Failing;

        impl ObjectiveFunction for Failing {
            fn eval(&self, _params: &[f64]) -> Result<f64> {
                Err(Error::Validation("boom".to_string()))
            }
        }

        let err =
            LbfgsbOptimizer::default().minimize(&Failing, &[1.0], &[(-5.0, 5.0)]).unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_bounds_length_mismatch() {
        let err = LbfgsbOptimizer::default()
            .minimize(&QuadraticFunction, &[0.0, 0.0], &[(-1.0, 1.0)])
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_display() {
        let r = OptimizationResult {
            parameters: vec![1.0],
            fval: 0.5,
            n_iter: 3,
            n_fev: 4,
            n_gev: 5,
            converged: true,
            message: "ok".to_string(),
        };
        assert_eq!(
            r.to_string(),
            "OptimizationResult(fval=0.500000, n_iter=3, n_fev=4, n_gev=5, converged=true)"
        );
    }
}
