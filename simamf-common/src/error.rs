//! Error types shared across the simulator crates

use thiserror::Error;

/// Umbrella error for configuration loading and process-level I/O.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network or file I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing errors.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// A value type could not be built from its textual form.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
