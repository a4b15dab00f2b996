//! Error types for Mirrorcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MirrorError>;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),
}

impl MirrorError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            MirrorError::Platform(PlatformError::Authentication(_)) => 2,
            MirrorError::Platform(_) => 1,
            MirrorError::Config(_) => 1,
        }
    }

    /// Whether this error is a record validation failure.
    ///
    /// Validation failures skip a single unit; every other error aborts the run.
    pub fn is_validation(&self) -> bool {
        matches!(self, MirrorError::Platform(PlatformError::Validation(_)))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Media upload failed: {0}")]
    Upload(String),
}
