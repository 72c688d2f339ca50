//! Error types for the rover runtime

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested communication mode is unknown or unavailable on this host
    #[error("Unsupported communication mode: {0}")]
    UnsupportedCommMode(String),

    #[error("Transport unavailable on {device}: {reason}")]
    TransportUnavailable { device: String, reason: String },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Parameter store error: {0}")]
    Params(#[from] serde_json::Error),

    #[error("Transport disconnected")]
    Disconnected,
}
