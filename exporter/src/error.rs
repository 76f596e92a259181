//! Error types for the exporter

use thiserror::Error;

/// Result type alias for exporter operations
pub type Result<T> = std::result::Result<T, ExporterError>;

/// Main error type for the exporter
#[derive(Error, Debug)]
pub enum ExporterError {
    /// Configuration or credentials could not be resolved
    #[error("configuration error: {0}")]
    Config(String),

    /// List/watch call against the API server failed
    #[error("transport error: {0}")]
    Transport(String),

    /// An object could not be converted into the expected shape
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Metrics error
    #[error("metrics error: {0}")]
    Metrics(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error converting an untyped API object into a typed resource
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A required field is absent
    #[error("missing required field '{field}'")]
    MissingField { field: &'static str },

    /// A field is present but has the wrong shape
    #[error("object '{name}': malformed field '{field}': {message}")]
    Malformed {
        name: String,
        field: &'static str,
        message: String,
    },
}

impl From<kube::Error> for ExporterError {
    fn from(err: kube::Error) -> Self {
        ExporterError::Transport(err.to_string())
    }
}

impl From<kube::config::InferConfigError> for ExporterError {
    fn from(err: kube::config::InferConfigError) -> Self {
        ExporterError::Config(format!("kubernetes config: {err}"))
    }
}

impl ExporterError {
    /// Whether the reflector should re-list after this error
    pub fn requires_relist(&self) -> bool {
        matches!(self, ExporterError::Transport(_))
    }
}
