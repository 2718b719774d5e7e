//! [`Scalar`] trait: abstraction over `f64` and [`Dual`](crate::dual::Dual)
//! that lets likelihood code be written once, then reused for both plain
//! evaluation **and** forward-mode gradient computation.

use crate::dual::Dual;
use std::iter::Sum;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A scalar type suitable for likelihood computation.
///
/// Implemented for `f64` (plain evaluation) and `Dual` (forward-mode AD).
pub trait Scalar:
    Copy
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Sum
    + PartialOrd
    + Sized
{
    /// Wrap an `f64` constant (derivative = 0 for AD types).
    fn from_f64(v: f64) -> Self;

    /// Natural logarithm.
    fn ln(self) -> Self;

    /// Square root.
    fn sqrt(self) -> Self;

    /// Integer power.
    fn powi(self, n: i32) -> Self;

    /// `self < right ? if_true : if_false`, with both operands pre-evaluated.
    fn cond_lt(self, right: Self, if_true: Self, if_false: Self) -> Self;

    /// `self >= right ? if_true : if_false`, with both operands pre-evaluated.
    fn cond_ge(self, right: Self, if_true: Self, if_false: Self) -> Self;
}

// --- f64 implementation ---

impl Scalar for f64 {
    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn ln(self) -> Self {
        f64::ln(self)
    }

    #[inline]
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }

    #[inline]
    fn cond_lt(self, right: Self, if_true: Self, if_false: Self) -> Self {
        if self < right { if_true } else { if_false }
    }

    #[inline]
    fn cond_ge(self, right: Self, if_true: Self, if_false: Self) -> Self {
        if self >= right { if_true } else { if_false }
    }
}

// --- Dual implementation ---

impl Scalar for Dual {
    #[inline]
    fn from_f64(v: f64) -> Self {
        Dual::constant(v)
    }

    #[inline]
    fn ln(self) -> Self {
        Dual::ln(self)
    }

    #[inline]
    fn sqrt(self) -> Self {
        Dual::sqrt(self)
    }

    #[inline]
    fn powi(self, n: i32) -> Self {
        Dual::powi(self, n)
    }

    #[inline]
    fn cond_lt(self, right: Self, if_true: Self, if_false: Self) -> Self {
        Dual::cond_lt(self, right, if_true, if_false)
    }

    #[inline]
    fn cond_ge(self, right: Self, if_true: Self, if_false: Self) -> Self {
        Dual::cond_ge(self, right, if_true, if_false)
    }
}
