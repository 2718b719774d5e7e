//! Probability building blocks for posfun.
//!
//! - [`normal`]: Gaussian log-density for `f64`, generic [`Scalar`](pf_ad::scalar::Scalar)
//!   types, and reverse-mode tapes
//! - [`posfun`]: smooth positive-part transform with a violation penalty

pub mod normal;
pub mod posfun;
