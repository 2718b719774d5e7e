//! Smooth positive-part transform ("posfun").
//!
//! Keeps a quantity that must stay above a small threshold `eps` (a variance,
//! a rate) in the valid domain without introducing a kink:
//!
//! ```text
//! posfun(x) = x                                          if x >= eps
//!           = eps / (1 + xp + xp^2 + xp^3 + xp^4 + xp^5) otherwise, xp = -(x/eps - 1)
//! pen      += 0.01 * (x - eps)^2                         if x < eps
//! ```
//!
//! The lower branch is strictly positive, increasing in `x`, equals `eps` at
//! the threshold and has slope 1 there, so value and first derivative are
//! continuous. Both branches are always evaluated and combined with
//! conditional-select primitives, so derivatives are correct for forward
//! (`Dual`) and reverse (`Tape`) mode alike.
//!
//! `eps` must be strictly positive; it is not validated here.

use pf_ad::scalar::Scalar;
use pf_ad::tape::{Tape, Var};

/// Weight of the quadratic penalty charged for `x < eps`.
pub const PENALTY_WEIGHT: f64 = 0.01;

/// Smooth positive transform of `x` with threshold `eps`.
///
/// Adds `PENALTY_WEIGHT * (x - eps)^2` to `pen` when `x < eps`, zero otherwise.
pub fn posfun<S: Scalar>(x: S, eps: f64, pen: &mut S) -> S {
    let zero = S::from_f64(0.0);
    let one = S::from_f64(1.0);
    let eps = S::from_f64(eps);

    let violation = S::from_f64(PENALTY_WEIGHT) * (x - eps).powi(2);
    *pen = *pen + x.cond_lt(eps, violation, zero);

    let xp = -(x / eps - one);
    let denom = one + xp + xp.powi(2) + xp.powi(3) + xp.powi(4) + xp.powi(5);
    x.cond_ge(eps, x, eps * (one / denom))
}

/// Record [`posfun`] on a tape.
///
/// Returns `(value, pen + increment)`; both candidate branches are recorded
/// and joined by conditional-expression nodes.
pub fn posfun_on_tape(tape: &mut Tape, x: Var, eps: f64, pen: Var) -> (Var, Var) {
    let eps_c = tape.constant(eps);
    let zero = tape.constant(0.0);

    let diff = tape.sub(x, eps_c);
    let diff2 = tape.powi(diff, 2);
    let violation = tape.mul_f64(diff2, PENALTY_WEIGHT);
    let increment = tape.cond_lt(x, eps_c, violation, zero);
    let pen = tape.add(pen, increment);

    let ratio = tape.div(x, eps_c);
    let shifted = tape.add_f64(ratio, -1.0);
    let xp = tape.neg(shifted);
    let mut denom = tape.add_f64(xp, 1.0);
    for k in 2..=5 {
        let term = tape.powi(xp, k);
        denom = tape.add(denom, term);
    }
    let one = tape.constant(1.0);
    let inv = tape.div(one, denom);
    let smooth = tape.mul(eps_c, inv);

    let value = tape.cond_ge(x, eps_c, x, smooth);
    (value, pen)
}
