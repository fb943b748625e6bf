//! Loss layer parameters.
//!
//! Parameters are plain data deserialized with `serde`, usually from the JSON
//! block describing the layer in a network definition:
//!
//! ```json
//! { "temperature": 0.5, "backend": "wgpu" }
//! ```
//!
//! Parameters are untrusted until [`VectorLossParams::validated`] has run them
//! through `briny`'s [`TrustedData`] gate; layers only accept the validated form.

use crate::backend::Backend;
use crate::error::ConfigError;
use briny::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// The temperature used when a definition does not name one.
pub const DEFAULT_TEMPERATURE: f64 = 1.0;

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

/// Parameters of [`SoftmaxWithVectorLossLayer`](crate::layers::SoftmaxWithVectorLossLayer).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VectorLossParams {
    /// Decay rate turning a label value `d` into the soft target `exp(-temperature * d)`.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Backend pinned for this layer; `None` follows the global default.
    #[serde(default)]
    pub backend: Option<Backend>,
}

impl Default for VectorLossParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            backend: None,
        }
    }
}

impl Validate for VectorLossParams {
    fn validate(&self) -> Result<(), ValidationError> {
        if !self.temperature.is_finite() {
            return Err(ValidationError);
        }
        Ok(())
    }
}

impl VectorLossParams {
    /// Parameters with the given temperature and no pinned backend.
    pub fn with_temperature(temperature: f64) -> Self {
        Self {
            temperature,
            ..Self::default()
        }
    }

    /// Checks the parameters, returning them unchanged when usable.
    ///
    /// # Errors
    /// [`ConfigError::NonFiniteTemperature`] if the temperature is NaN or infinite.
    pub fn validated(self) -> Result<Self, ConfigError> {
        TrustedData::new(self)
            .map(TrustedData::into_inner)
            .map_err(|_| ConfigError::NonFiniteTemperature)
    }

    /// Parses and validates parameters from a JSON document.
    ///
    /// # Errors
    /// [`ConfigError::Parse`] on malformed JSON, or a validation error.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let params: Self = serde_json::from_str(json)?;
        params.validated()
    }

    /// Loads and validates parameters from a JSON file.
    ///
    /// # Errors
    /// [`ConfigError::Io`] if the file cannot be opened, otherwise as
    /// [`from_json_str`](Self::from_json_str).
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let reader = BufReader::new(File::open(path)?);
        let params: Self = serde_json::from_reader(reader)?;
        params.validated()
    }
}
