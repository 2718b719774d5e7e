//! Data binding for the posfun model.
//!
//! ```json
//! { "eps": 0.01, "x": [0.2, 0.9, 0.4], "parameters": { "p": 0.5, "Dummy": 0.0 } }
//! ```
//!
//! `parameters` is optional; missing entries fall back to [`ParameterInit::default`].

use pf_core::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Initial parameter values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterInit {
    /// Mean / Bernoulli-style parameter; the variance is `p * (1 - p)`.
    pub p: f64,
    /// Auxiliary parameter with a standard-normal prior.
    #[serde(rename = "Dummy")]
    pub dummy: f64,
}

impl Default for ParameterInit {
    fn default() -> Self {
        Self { p: 0.5, dummy: 0.0 }
    }
}

/// Input document: threshold, observations and optional initial values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosfunData {
    /// Threshold below which the variance is smoothed and penalized.
    pub eps: f64,
    /// Observations.
    pub x: Vec<f64>,
    /// Initial parameter values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParameterInit>,
}

impl PosfunData {
    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let data = Self::from_json_str(&json)?;
        log::debug!("loaded {} observations from {}", data.x.len(), path.display());
        Ok(data)
    }

    /// Initial values, falling back to defaults.
    pub fn init(&self) -> ParameterInit {
        self.parameters.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_core::Error;

    #[test]
    fn test_parse_with_parameters() {
        let data = PosfunData::from_json_str(
            r#"{"eps": 0.01, "x": [1.0, 2.0], "parameters": {"p": 0.3, "Dummy": -1.5}}"#,
        )
        .unwrap();
        assert_eq!(data.eps, 0.01);
        assert_eq!(data.x, vec![1.0, 2.0]);
        assert_eq!(data.init(), ParameterInit { p: 0.3, dummy: -1.5 });
    }

    #[test]
    fn test_parse_without_parameters_uses_defaults() {
        let data = PosfunData::from_json_str(r#"{"eps": 0.01, "x": [1.0]}"#).unwrap();
        assert!(data.parameters.is_none());
        assert_eq!(data.init(), ParameterInit { p: 0.5, dummy: 0.0 });
    }

    #[test]
    fn test_partial_parameters_fill_defaults() {
        let data =
            PosfunData::from_json_str(r#"{"eps": 0.01, "x": [1.0], "parameters": {"p": 0.2}}"#)
                .unwrap();
        assert_eq!(data.init(), ParameterInit { p: 0.2, dummy: 0.0 });
    }

    #[test]
    fn test_serialize_uses_dummy_key() {
        let data = PosfunData {
            eps: 0.01,
            x: vec![0.5],
            parameters: Some(ParameterInit { p: 0.4, dummy: 0.1 }),
        };
        let v = serde_json::to_value(&data).unwrap();
        assert_eq!(v["parameters"]["Dummy"], serde_json::json!(0.1));
    }

    #[test]
    fn test_invalid_json_is_json_error() {
        let err = PosfunData::from_json_str("{").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = PosfunData::from_path(Path::new("/nonexistent/posfun.json")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
