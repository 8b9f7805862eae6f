//! Error types for the detector

use thiserror::Error;

use super::types::SymbolPair;

/// Result type alias using our DetectorError
pub type Result<T> = std::result::Result<T, DetectorError>;

/// Main error type for detector operations
#[derive(Error, Debug)]
pub enum DetectorError {
    /// WebSocket connection errors
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    /// WebSocket send/receive errors
    #[error("WebSocket communication error: {0}")]
    WebSocketCommunication(String),

    /// HTTP request errors
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Authentication errors (stream token acquisition, request signing)
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Invalid API response
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// A stream frame that could not be understood
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The venue has no price for the requested symbol
    #[error("No reference price available for {0}")]
    PriceUnavailable(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No trigger is defined for the pair
    #[error("Trigger not found for pair {0}")]
    TriggerNotFound(SymbolPair),

    /// A trigger is already defined for the pair
    #[error("Trigger already exists for pair {0}")]
    TriggerExists(SymbolPair),

    /// Trigger parameters rejected by validation
    #[error("Invalid trigger: {0}")]
    InvalidTrigger(String),

    /// The decoupling queue cannot be reached or has been closed
    #[error("Queue unavailable: {0}")]
    QueueUnavailable(String),

    /// Alert delivery failed
    #[error("Notification error: {0}")]
    Notification(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Channel receive errors
    #[error("Channel receive error: {0}")]
    ChannelReceive(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DetectorError {
    /// Transport faults that should be retried rather than surfaced
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DetectorError::WebSocketConnection(_)
                | DetectorError::WebSocketCommunication(_)
                | DetectorError::HttpRequest(_)
                | DetectorError::Database(_)
                | DetectorError::QueueUnavailable(_)
                | DetectorError::Notification(_)
                | DetectorError::Timeout(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for DetectorError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        DetectorError::WebSocketCommunication(err.to_string())
    }
}
