use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Unsupported mode: {0}. Use 'simultaneous' or 'sequential'.")]
    UnsupportedMode(String),

    #[error("Unsupported reposition_mode: {0}. Use 'timer' or 'manual'.")]
    UnsupportedPolicy(String),

    #[error("Unsupported location: {0}")]
    UnsupportedLocation(String),

    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("Acquisition failed: {0}")]
    Acquisition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// True for failures detected while validating a session plan, before any
    /// hardware interaction.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SessionError::Configuration(_)
                | SessionError::UnsupportedMode(_)
                | SessionError::UnsupportedPolicy(_)
                | SessionError::UnsupportedLocation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
