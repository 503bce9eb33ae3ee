//! Configuration structs for every externally-tunable component.
//!
//! These are plain, `serde`-derived data structs with `Default` impls
//! matching the documented defaults. Loading them from environment
//! variables is an external collaborator's responsibility; this module
//! only defines the shapes and validates them at construction.

use serde::{Deserialize, Serialize};

use crate::error::{FlightTransportError, Result};

/// Configuration for the Flight server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host, e.g. `"0.0.0.0"`.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Directory scanned for source datasets.
    pub data_directory: String,
    /// Maximum inbound gRPC message size, in bytes.
    pub max_receive_message_length: usize,
    /// Maximum outbound gRPC message size, in bytes.
    pub max_send_message_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8815,
            data_directory: "./data".to_string(),
            max_receive_message_length: 100 * 1024 * 1024,
            max_send_message_length: 100 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Validates this configuration, returning an error describing every
    /// offending field.
    ///
    /// # Errors
    ///
    /// Returns [`FlightTransportError::Configuration`] if the port is zero
    /// or a message size limit is zero.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.port == 0 {
            problems.push("port must be nonzero");
        }
        if self.max_receive_message_length == 0 {
            problems.push("max_receive_message_length must be nonzero");
        }
        if self.max_send_message_length == 0 {
            problems.push("max_send_message_length must be nonzero");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(FlightTransportError::Configuration(problems.join("; ")))
        }
    }
}

/// Configuration for the Flight client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server host to connect to.
    pub host: String,
    /// Server port to connect to.
    pub port: u16,
    /// Maximum inbound gRPC message size, in bytes.
    pub max_receive_message_length: usize,
    /// Maximum outbound gRPC message size, in bytes.
    pub max_send_message_length: usize,
    /// Number of attempts the client's retry handler performs.
    pub retry_attempts: u32,
    /// Base retry delay, in milliseconds.
    pub retry_delay_ms: u64,
    /// Timeout for the initial connection handshake, in milliseconds.
    pub connection_timeout_ms: u64,
    /// Whether to send gRPC keepalive pings.
    pub keep_alive: bool,
    /// Keepalive timeout, in milliseconds.
    pub keep_alive_timeout_ms: u64,
    /// Keepalive ping interval, in milliseconds.
    pub keep_alive_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8815,
            max_receive_message_length: 100 * 1024 * 1024,
            max_send_message_length: 100 * 1024 * 1024,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            connection_timeout_ms: 5_000,
            keep_alive: true,
            keep_alive_timeout_ms: 20_000,
            keep_alive_interval_ms: 10_000,
        }
    }
}

impl ClientConfig {
    /// Returns the `http://host:port` URI this config connects to.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Validates this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FlightTransportError::Configuration`] if `retry_attempts`
    /// is zero or a message size limit is zero.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.retry_attempts == 0 {
            problems.push("retry_attempts must be at least 1");
        }
        if self.max_receive_message_length == 0 {
            problems.push("max_receive_message_length must be nonzero");
        }
        if self.max_send_message_length == 0 {
            problems.push("max_send_message_length must be nonzero");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(FlightTransportError::Configuration(problems.join("; ")))
        }
    }
}

/// Configuration for the CSV source adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvSourceConfig {
    /// Directory scanned for `.csv` files.
    pub data_directory: String,
    /// Number of rows buffered per emitted batch.
    pub batch_size: usize,
    /// Field delimiter byte.
    pub delimiter: u8,
    /// Whether the first row is a header row.
    pub headers: bool,
    /// Whether to skip blank lines.
    pub skip_empty_lines: bool,
}

impl Default for CsvSourceConfig {
    fn default() -> Self {
        Self {
            data_directory: "./data".to_string(),
            batch_size: 10_000,
            delimiter: b',',
            headers: true,
            skip_empty_lines: true,
        }
    }
}

impl CsvSourceConfig {
    /// Validates this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FlightTransportError::Configuration`] if `batch_size` is
    /// zero.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            Err(FlightTransportError::Configuration(
                "batch_size must be nonzero".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Configuration for the retry handler and circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first) before giving up.
    pub max_attempts: u32,
    /// Base delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay between retries, in milliseconds.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each attempt.
    pub backoff_multiplier: f64,
    /// Whether to apply +/-10% jitter to each computed delay.
    pub jitter: bool,
    /// Error codes/messages considered retryable.
    pub retryable_errors: Vec<String>,
    /// Consecutive failures before the circuit breaker opens.
    pub circuit_breaker_threshold: u32,
    /// Duration the breaker stays open before probing again, in
    /// milliseconds.
    pub circuit_breaker_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
            retryable_errors: vec![
                "ECONNRESET".to_string(),
                "ECONNREFUSED".to_string(),
                "ETIMEDOUT".to_string(),
                "ENOTFOUND".to_string(),
                "UNAVAILABLE".to_string(),
                "DEADLINE_EXCEEDED".to_string(),
            ],
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout_ms: 60_000,
        }
    }
}

impl RetryConfig {
    /// Validates this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FlightTransportError::Configuration`] if `max_attempts` is
    /// zero or `backoff_multiplier` is not positive.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.max_attempts == 0 {
            problems.push("max_attempts must be at least 1");
        }
        if self.backoff_multiplier <= 0.0 {
            problems.push("backoff_multiplier must be positive");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(FlightTransportError::Configuration(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 8815);
        assert_eq!(cfg.max_receive_message_length, 100 * 1024 * 1024);
        cfg.validate().unwrap();
    }

    #[test]
    fn server_config_rejects_zero_port() {
        let mut cfg = ServerConfig::default();
        cfg.port = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn client_config_uri() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.uri(), "http://127.0.0.1:8815");
    }

    #[test]
    fn client_config_rejects_zero_retry_attempts() {
        let mut cfg = ClientConfig::default();
        cfg.retry_attempts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn csv_config_defaults() {
        let cfg = CsvSourceConfig::default();
        assert_eq!(cfg.batch_size, 10_000);
        assert_eq!(cfg.delimiter, b',');
        assert!(cfg.headers);
        assert!(cfg.skip_empty_lines);
    }

    #[test]
    fn csv_config_rejects_zero_batch_size() {
        let mut cfg = CsvSourceConfig::default();
        cfg.batch_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn retry_config_defaults() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.circuit_breaker_threshold, 5);
        assert!(cfg.retryable_errors.contains(&"UNAVAILABLE".to_string()));
        cfg.validate().unwrap();
    }

    #[test]
    fn retry_config_rejects_zero_multiplier() {
        let mut cfg = RetryConfig::default();
        cfg.backoff_multiplier = 0.0;
        assert!(cfg.validate().is_err());
    }
}
