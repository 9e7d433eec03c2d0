use thiserror::Error;

/// Errors raised while loading or validating `config.json`.
/// A configuration that fails here never reaches the estimator.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Invalid array '{array}': {reason}")]
    InvalidArray { array: String, reason: String },

    #[error("Duplicate array name or topic slug: {0}")]
    DuplicateArray(String),

    #[error("Invalid inverter settings: {0}")]
    InvalidInverter(String),

    #[error("Invalid estimator settings: {0}")]
    InvalidEstimator(String),
}

/// Why a sensor state could not be turned into a number.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReadingError {
    #[error("Sensor {0} does not exist")]
    Missing(String),

    #[error("Sensor {0} is unavailable")]
    Unavailable(String),

    #[error("Sensor {0} is unknown")]
    Unknown(String),

    #[error("Invalid value '{value}' from sensor {sensor}")]
    Invalid { sensor: String, value: String },
}

/// A refresh cycle failed as a whole. The caller keeps its previous result.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Solar radiation input failed: {0}")]
    Radiation(#[from] ReadingError),

    #[error("Estimation worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Numeric failure inside a single array's calculation.
/// Contained at the array boundary: the array reports 0 W for the cycle.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EstimationError {
    #[error("non-finite {stage} value ({value})")]
    NonFinite { stage: &'static str, value: f64 },
}

impl EstimationError {
    /// Pass `value` through if finite, otherwise fail with the stage name.
    pub fn check(stage: &'static str, value: f64) -> Result<f64, Self> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(Self::NonFinite { stage, value })
        }
    }
}
