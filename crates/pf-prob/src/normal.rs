//! Normal distribution utilities.
//!
//! Two flavours of the same density:
//! - [`logpdf_generic`]: generic over [`Scalar`] (`f64` / `Dual`),
//! - [`logpdf_on_tape`]: recorded on a reverse-mode [`Tape`].
//!
//! Neither validates `sigma`: a zero or negative `sigma` yields a non-finite
//! result, following plain floating-point semantics.

use pf_ad::scalar::Scalar;
use pf_ad::tape::{Tape, Var};

/// Natural log of `sqrt(2π)`.
///
/// `ln(sqrt(2π)) = 0.5*ln(2π)` (precomputed to keep this crate const-friendly).
pub const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// Log-PDF of `N(mu, sigma)` at `x` for any [`Scalar`].
///
/// `log p(x) = -0.5 * ((x-mu)/sigma)^2 - ln(sigma) - ln(sqrt(2π))`
#[inline]
pub fn logpdf_generic<S: Scalar>(x: S, mu: S, sigma: S) -> S {
    let z = (x - mu) / sigma;
    S::from_f64(-0.5) * z * z - sigma.ln() - S::from_f64(LN_SQRT_2PI)
}

/// Record the log-PDF of `N(mu, sigma)` at `x` on a tape.
pub fn logpdf_on_tape(tape: &mut Tape, x: Var, mu: Var, sigma: Var) -> Var {
    let diff = tape.sub(x, mu);
    let z = tape.div(diff, sigma);
    let z2 = tape.mul(z, z);
    let quad = tape.mul_f64(z2, -0.5);
    let ln_sigma = tape.ln(sigma);
    let lp = tape.sub(quad, ln_sigma);
    tape.add_f64(lp, -LN_SQRT_2PI)
}
