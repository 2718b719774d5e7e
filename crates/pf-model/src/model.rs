//! Posfun model: Gaussian likelihood whose variance `p * (1 - p)` is kept
//! positive by [`posfun`](pf_prob::posfun::posfun).
//!
//! Objective, for parameters `[p, Dummy]`:
//!
//! ```text
//! var  = posfun(p * (1 - p), eps, pen)
//! nll  = pen - sum_i log N(x_i | p, sqrt(var)) - log N(Dummy | 0, 1)
//! ```
//!
//! The same expression is written twice: once generic over [`Scalar`]
//! (`f64` evaluation, `Dual` forward mode) and once recorded on a reverse-mode
//! [`Tape`]. Numerical degeneracies (e.g. `var` underflowing to zero for `p`
//! far outside `[0, 1]`) surface as non-finite values, not errors.

use pf_ad::dual::Dual;
use pf_ad::scalar::Scalar;
use pf_ad::tape::{Tape, Var};
use pf_core::{Error, LogDensityModel, Result};
use pf_prob::normal;
use pf_prob::posfun::{posfun, posfun_on_tape};

use crate::data::{ParameterInit, PosfunData};

/// Parameter names, in parameter-vector order.
pub const PARAMETER_NAMES: [&str; 2] = ["p", "Dummy"];

const P: usize = 0;
const DUMMY: usize = 1;
const N_PARAMS: usize = 2;

/// One evaluation of the objective with its intermediate quantities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation<T = f64> {
    /// Negative log-likelihood including the penalty.
    pub nll: T,
    /// Penalty charged by the transform (zero when `variance_raw >= eps`).
    pub penalty: T,
    /// `p * (1 - p)` before the transform.
    pub variance_raw: T,
    /// Variance after the transform.
    pub variance: T,
}

/// The posfun model: threshold, observations and initial parameter values.
#[derive(Debug, Clone)]
pub struct PosfunModel {
    eps: f64,
    x: Vec<f64>,
    init: ParameterInit,
}

impl PosfunModel {
    /// Create a model, validating `eps` and the observations.
    ///
    /// `x` may be empty: the objective then reduces to the penalty and the `Dummy` prior.
    pub fn new(eps: f64, x: Vec<f64>) -> Result<Self> {
        if !eps.is_finite() || eps <= 0.0 {
            return Err(Error::Validation(format!("eps must be finite and > 0, got {}", eps)));
        }
        if let Some((i, v)) = x.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(Error::Validation(format!("x[{}] must be finite, got {}", i, v)));
        }
        Ok(Self { eps, x, init: ParameterInit::default() })
    }

    /// Build a model from a parsed data document.
    pub fn from_data(data: &PosfunData) -> Result<Self> {
        let init = data.init();
        Ok(Self::new(data.eps, data.x.clone())?.with_init(init.p, init.dummy))
    }

    /// Override the initial parameter values.
    pub fn with_init(mut self, p: f64, dummy: f64) -> Self {
        self.init = ParameterInit { p, dummy };
        self
    }

    /// Threshold of the positive transform.
    pub fn eps(&self) -> f64 {
        self.eps
    }

    /// Observations.
    pub fn observations(&self) -> &[f64] {
        &self.x
    }

    fn validate_params_len(&self, got: usize) -> Result<()> {
        if got != N_PARAMS {
            return Err(Error::Validation(format!(
                "params length mismatch: expected {}, got {}",
                N_PARAMS, got
            )));
        }
        Ok(())
    }

    /// Evaluate the objective and its intermediates for any [`Scalar`].
    pub fn evaluate_generic<T: Scalar>(&self, params: &[T]) -> Result<Evaluation<T>> {
        self.validate_params_len(params.len())?;
        let p = params[P];
        let dummy = params[DUMMY];
        let zero = T::from_f64(0.0);
        let one = T::from_f64(1.0);

        let mut pen = zero;
        let mut nll = zero;

        let variance_raw = p * (one - p);
        let variance = posfun(variance_raw, self.eps, &mut pen);
        nll = nll + pen;

        let sd = variance.sqrt();
        let loglik: T =
            self.x.iter().map(|&xi| normal::logpdf_generic(T::from_f64(xi), p, sd)).sum();
        nll = nll - loglik;

        nll = nll - normal::logpdf_generic(dummy, zero, one);

        Ok(Evaluation { nll, penalty: pen, variance_raw, variance })
    }

    /// Negative log-likelihood for any [`Scalar`].
    pub fn nll_generic<T: Scalar>(&self, params: &[T]) -> Result<T> {
        Ok(self.evaluate_generic(params)?.nll)
    }

    /// Negative log-likelihood at `params`.
    pub fn nll(&self, params: &[f64]) -> Result<f64> {
        self.nll_generic(params)
    }

    /// Objective value together with penalty and variance before/after the transform.
    pub fn evaluate(&self, params: &[f64]) -> Result<Evaluation> {
        self.evaluate_generic(params)
    }

    /// Gradient of the NLL by reverse-mode AD: one recording, one backward sweep.
    pub fn gradient_reverse(&self, params: &[f64]) -> Result<Vec<f64>> {
        self.validate_params_len(params.len())?;
        let mut tape = Tape::with_capacity(48 + 10 * self.x.len());

        let param_vars: Vec<Var> = params.iter().map(|&v| tape.var(v)).collect();
        let nll_var = self.nll_on_tape(&mut tape, &param_vars)?;
        tape.backward(nll_var);

        Ok(param_vars.iter().map(|&v| tape.adjoint(v)).collect())
    }

    /// Gradient of the NLL by forward-mode AD, one [`Dual`] pass per parameter.
    pub fn gradient_forward(&self, params: &[f64]) -> Result<Vec<f64>> {
        self.validate_params_len(params.len())?;
        let mut grad = Vec::with_capacity(params.len());
        for i in 0..params.len() {
            let seeded: Vec<Dual> = params
                .iter()
                .enumerate()
                .map(|(j, &v)| if i == j { Dual::var(v) } else { Dual::constant(v) })
                .collect();
            grad.push(self.nll_generic(&seeded)?.dot);
        }
        Ok(grad)
    }

    /// Record the NLL on a [`Tape`].
    fn nll_on_tape(&self, tape: &mut Tape, params: &[Var]) -> Result<Var> {
        self.validate_params_len(params.len())?;
        let p = params[P];
        let dummy = params[DUMMY];

        let pen = tape.constant(0.0);
        let mut nll = tape.constant(0.0);

        let one_minus_p = tape.f64_sub(1.0, p);
        let variance_raw = tape.mul(p, one_minus_p);
        let (variance, pen) = posfun_on_tape(tape, variance_raw, self.eps, pen);
        nll = tape.add(nll, pen);

        let sd = tape.sqrt(variance);
        let mut loglik = tape.constant(0.0);
        for &xi in &self.x {
            let obs = tape.constant(xi);
            let lp = normal::logpdf_on_tape(tape, obs, p, sd);
            loglik = tape.add(loglik, lp);
        }
        nll = tape.sub(nll, loglik);

        let zero = tape.constant(0.0);
        let one = tape.constant(1.0);
        let prior = normal::logpdf_on_tape(tape, dummy, zero, one);
        Ok(tape.sub(nll, prior))
    }
}

impl LogDensityModel for PosfunModel {
    fn dim(&self) -> usize {
        N_PARAMS
    }

    fn parameter_names(&self) -> Vec<String> {
        PARAMETER_NAMES.iter().map(|s| s.to_string()).collect()
    }

    fn parameter_bounds(&self) -> Vec<(f64, f64)> {
        vec![(f64::NEG_INFINITY, f64::INFINITY); N_PARAMS]
    }

    fn parameter_init(&self) -> Vec<f64> {
        vec![self.init.p, self.init.dummy]
    }

    fn nll(&self, params: &[f64]) -> Result<f64> {
        PosfunModel::nll(self, params)
    }

    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
        PosfunModel::gradient_reverse(self, params)
    }
}
