//! Crate-wide error taxonomy.
//!
//! A single enum covers every failure kind this crate produces, mirroring
//! the shape of a handful of broad, well-named variants rather than one
//! variant per failure site. Each variant maps deterministically to a gRPC
//! status code via [`FlightTransportError`]'s `From<_> for tonic::Status`
//! impl.

use thiserror::Error;

/// Crate-local result alias.
pub type Result<T> = std::result::Result<T, FlightTransportError>;

/// All failure kinds produced by this crate.
#[derive(Debug, Error)]
pub enum FlightTransportError {
    /// A requested dataset, action, or resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A request was malformed (bad descriptor, ticket, or action body).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An internal failure occurred (adapter, builder, or IO error).
    #[error("internal error: {0}")]
    Internal(String),

    /// The transport is temporarily unavailable; retryable.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A deadline was exceeded; retryable.
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// The client-side circuit breaker is open and is failing fast.
    #[error("circuit breaker open: {0}")]
    CircuitOpen(String),

    /// A configuration value failed validation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Wrapped Arrow error.
    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    /// Wrapped JSON (de)serialization error.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Wrapped transport-level status from a downstream call.
    #[error("transport error: {0}")]
    Transport(Box<tonic::Status>),
}

impl FlightTransportError {
    /// Returns true if a retry handler should consider this error retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FlightTransportError::Unavailable(_) | FlightTransportError::DeadlineExceeded(_)
        )
    }
}

impl From<tonic::Status> for FlightTransportError {
    fn from(status: tonic::Status) -> Self {
        use tonic::Code;
        let message = status.message().to_string();
        match status.code() {
            Code::NotFound => FlightTransportError::NotFound(message),
            Code::InvalidArgument => FlightTransportError::InvalidArgument(message),
            Code::Unavailable => FlightTransportError::Unavailable(message),
            Code::DeadlineExceeded => FlightTransportError::DeadlineExceeded(message),
            _ => FlightTransportError::Transport(Box::new(status)),
        }
    }
}

impl From<FlightTransportError> for tonic::Status {
    fn from(err: FlightTransportError) -> Self {
        match err {
            FlightTransportError::NotFound(msg) => tonic::Status::not_found(msg),
            FlightTransportError::InvalidArgument(msg) => tonic::Status::invalid_argument(msg),
            FlightTransportError::Internal(msg) => tonic::Status::internal(msg),
            FlightTransportError::Unavailable(msg) => tonic::Status::unavailable(msg),
            FlightTransportError::DeadlineExceeded(msg) => tonic::Status::deadline_exceeded(msg),
            FlightTransportError::CircuitOpen(msg) => {
                tonic::Status::unavailable(format!("circuit open: {msg}"))
            }
            FlightTransportError::Configuration(msg) => tonic::Status::invalid_argument(msg),
            FlightTransportError::Arrow(e) => tonic::Status::internal(e.to_string()),
            FlightTransportError::Serialization(e) => tonic::Status::invalid_argument(e.to_string()),
            FlightTransportError::Transport(status) => *status,
        }
    }
}
