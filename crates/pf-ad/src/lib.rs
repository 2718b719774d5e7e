//! # pf-ad
//!
//! Automatic differentiation (AD) primitives for posfun.
//!
//! Provides:
//! - **Forward-mode AD** via [`dual::Dual`] numbers (one tangent per pass)
//! - **Reverse-mode AD** via a computation [`tape::Tape`] (full gradient per sweep)
//! - [`Scalar`](scalar::Scalar) trait for writing generic code over `f64` and `Dual`
//!
//! Both modes carry CppAD-style conditional expressions (`cond_lt`, `cond_ge`):
//! the two candidate operands are always evaluated, and the comparison only
//! selects which one (value and derivative) flows onward. This keeps
//! derivatives well defined at a switching point without data-dependent
//! control flow in the recorded computation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dual;
pub mod scalar;
pub mod tape;
