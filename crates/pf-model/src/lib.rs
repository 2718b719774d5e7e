//! # pf-model
//!
//! The posfun example model: observations `x ~ N(p, sqrt(p(1-p)))` with the
//! variance guarded by the smooth positive transform, plus a standard-normal
//! prior on an auxiliary `Dummy` parameter.
//!
//! - [`data`]: JSON data binding (`eps`, `x`, optional initial values)
//! - [`model`]: [`PosfunModel`], its objective and AD gradients

pub mod data;
pub mod model;

pub use data::{ParameterInit, PosfunData};
pub use model::{Evaluation, PARAMETER_NAMES, PosfunModel};
