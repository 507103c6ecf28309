//! Error types for the wod_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for wod_core operations
///
/// Only pre-run validation and tooling (config, scenario files, export)
/// produce these. A simulation that passed validation never fails mid-run;
/// numeric trouble inside a run is clamped and reported as a
/// [`Diagnostic`](crate::types::Diagnostic) instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A workout movement has no usable capability entry
    #[error("Invalid capability for '{movement}': {reason}")]
    InvalidCapability { movement: String, reason: String },

    /// A strategy constraint is outside its permitted range
    #[error("Constraint '{field}' = {value} is outside [{min}, {max}]")]
    OutOfRangeConstraint {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Workout definition is structurally unusable
    #[error("Invalid workout: {0}")]
    InvalidWorkout(String),

    /// Calibration table is malformed (e.g. non-monotonic anchors)
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn capability(movement: &str, reason: impl Into<String>) -> Self {
        Error::InvalidCapability {
            movement: movement.to_string(),
            reason: reason.into(),
        }
    }
}
