//! Retry handler with exponential backoff and jitter, and a
//! consecutive-failure circuit breaker, composed the way a resilient
//! executor wraps a breaker around a retry loop.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{info, warn};

use crate::config::RetryConfig;
use crate::error::{FlightTransportError, Result};

/// Computes the backoff delay for a given attempt number (1-based),
/// applying the configured multiplier, cap, and +/-10% jitter.
///
/// # Example
///
/// ```
/// use tabular_flight::config::RetryConfig;
/// use tabular_flight::reliability::calculate_backoff;
///
/// let cfg = RetryConfig { jitter: false, ..RetryConfig::default() };
/// assert_eq!(calculate_backoff(&cfg, 1).as_millis(), 1_000);
/// assert_eq!(calculate_backoff(&cfg, 2).as_millis(), 2_000);
/// assert_eq!(calculate_backoff(&cfg, 3).as_millis(), 4_000);
/// ```
#[must_use]
pub fn calculate_backoff(cfg: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    #[allow(clippy::cast_precision_loss)]
    let base = cfg.base_delay_ms as f64;
    let raw = base * cfg.backoff_multiplier.powi(exponent as i32);
    let capped = raw.min(cfg.max_delay_ms as f64);

    let jittered = if cfg.jitter {
        let factor = rand::thread_rng().gen_range(0.9..=1.1);
        capped * factor
    } else {
        capped
    };

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    Duration::from_millis(jittered.max(0.0) as u64)
}

/// Returns true if `message` names one of the configured retryable error
/// codes.
#[must_use]
pub fn is_retryable_message(cfg: &RetryConfig, message: &str) -> bool {
    cfg.retryable_errors
        .iter()
        .any(|code| message.contains(code.as_str()))
}

/// Runs `op`, retrying on retryable failures with exponential backoff
/// and jitter, up to `cfg.max_attempts` total attempts.
///
/// # Errors
///
/// Returns the last error if every attempt fails, or the first error
/// immediately if it is not retryable.
pub async fn retry<F, Fut, T>(cfg: &RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retryable = err.is_retryable() || is_retryable_message(cfg, &err.to_string());
                if !retryable || attempt >= cfg.max_attempts {
                    return Err(err);
                }
                let delay = calculate_backoff(cfg, attempt);
                warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls are allowed through normally.
    Closed,
    /// Calls fail fast without being attempted.
    Open,
    /// A single probe call is allowed through to test recovery.
    HalfOpen,
}

/// A consecutive-failure-count circuit breaker.
///
/// Opens after `threshold` consecutive failures; stays open for
/// `timeout`, then allows one probe call through (`HalfOpen`). A
/// successful probe closes the breaker; a failed probe reopens it.
#[derive(Clone)]
pub struct CircuitBreaker {
    threshold: u32,
    timeout: Duration,
    state: Arc<Mutex<CircuitState>>,
    consecutive_failures: Arc<AtomicU32>,
    opened_at: Arc<Mutex<Option<Instant>>>,
    half_open_in_flight: Arc<AtomicU64>,
}

impl CircuitBreaker {
    /// Creates a breaker from retry configuration.
    #[must_use]
    pub fn new(cfg: &RetryConfig) -> Self {
        Self {
            threshold: cfg.circuit_breaker_threshold,
            timeout: Duration::from_millis(cfg.circuit_breaker_timeout_ms),
            state: Arc::new(Mutex::new(CircuitState::Closed)),
            consecutive_failures: Arc::new(AtomicU32::new(0)),
            opened_at: Arc::new(Mutex::new(None)),
            half_open_in_flight: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns the current state, first resolving an `Open` state whose
    /// timeout has elapsed into `HalfOpen`.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut state = self.state.lock().unwrap();
        if *state == CircuitState::Open {
            let elapsed = self
                .opened_at
                .lock()
                .unwrap()
                .map(|t| t.elapsed() >= self.timeout)
                .unwrap_or(false);
            if elapsed {
                *state = CircuitState::HalfOpen;
            }
        }
        *state
    }

    /// Runs `op` through the breaker: fails fast with
    /// [`FlightTransportError::CircuitOpen`] while open, permits exactly
    /// one concurrent probe while half-open, and runs normally while
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns [`FlightTransportError::CircuitOpen`] if the breaker is
    /// open (or a probe is already in flight), or `op`'s own error
    /// otherwise.
    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match self.state() {
            CircuitState::Open => {
                return Err(FlightTransportError::CircuitOpen(
                    "circuit breaker is open".to_string(),
                ));
            }
            CircuitState::HalfOpen => {
                if self
                    .half_open_in_flight
                    .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    return Err(FlightTransportError::CircuitOpen(
                        "circuit breaker is probing".to_string(),
                    ));
                }
            }
            CircuitState::Closed => {}
        }

        let result = op().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }
        self.half_open_in_flight.store(0, Ordering::SeqCst);
        result
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if *state != CircuitState::Closed {
            info!("circuit breaker closing after successful probe");
        }
        *state = CircuitState::Closed;
    }

    fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.threshold {
            let mut state = self.state.lock().unwrap();
            if *state != CircuitState::Open {
                warn!(failures, "circuit breaker opening after consecutive failures");
            }
            *state = CircuitState::Open;
            *self.opened_at.lock().unwrap() = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_cfg() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 50,
            backoff_multiplier: 2.0,
            jitter: false,
            circuit_breaker_threshold: 3,
            circuit_breaker_timeout_ms: 20,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let cfg = RetryConfig {
            jitter: false,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            ..RetryConfig::default()
        };
        assert_eq!(calculate_backoff(&cfg, 1).as_millis(), 100);
        assert_eq!(calculate_backoff(&cfg, 2).as_millis(), 200);
        assert_eq!(calculate_backoff(&cfg, 3).as_millis(), 400);
        assert_eq!(calculate_backoff(&cfg, 10).as_millis(), 1_000);
    }

    #[test]
    fn backoff_jitter_stays_within_ten_percent() {
        let cfg = RetryConfig {
            jitter: true,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            ..RetryConfig::default()
        };
        for _ in 0..20 {
            let d = calculate_backoff(&cfg, 1).as_millis();
            assert!((900..=1_100).contains(&d), "delay {d} out of jitter range");
        }
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let cfg = fast_cfg();
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = retry(&cfg, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(FlightTransportError::Unavailable("transient".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_does_not_retry_non_retryable_errors() {
        let cfg = fast_cfg();
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<()> = retry(&cfg, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(FlightTransportError::InvalidArgument("bad".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn breaker_opens_after_threshold_consecutive_failures() {
        let cfg = fast_cfg();
        let breaker = CircuitBreaker::new(&cfg);

        for _ in 0..cfg.circuit_breaker_threshold {
            let _: Result<()> = breaker
                .call(|| async { Err(FlightTransportError::Unavailable("x".to_string())) })
                .await;
        }

        assert_eq!(breaker.state(), CircuitState::Open);
        let result: Result<()> = breaker.call(|| async { Ok(()) }).await;
        assert!(matches!(result, Err(FlightTransportError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn breaker_half_opens_after_timeout_and_closes_on_success() {
        let cfg = fast_cfg();
        let breaker = CircuitBreaker::new(&cfg);
        for _ in 0..cfg.circuit_breaker_threshold {
            let _: Result<()> = breaker
                .call(|| async { Err(FlightTransportError::Unavailable("x".to_string())) })
                .await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(cfg.circuit_breaker_timeout_ms + 10)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let result: Result<()> = breaker.call(|| async { Ok(()) }).await;
        assert!(result.is_ok());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
