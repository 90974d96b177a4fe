//! # Circuit Breaker Module
//!
//! Circuit breaker shared by the two slow external boundaries: the OCR engine
//! and the remote nutrition API. When an operation fails repeatedly the breaker
//! opens and callers fail fast until the reset timeout elapses.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

use crate::ocr_config::RecoveryConfig;

/// Circuit breaker for an external dependency
///
/// ```text
/// CLOSED ────failures ≥ threshold────► OPEN
///    ▲                                   │
///    └──────────reset timeout────────────┘
/// ```
///
/// - **CLOSED → OPEN**: failure count reaches `circuit_breaker_threshold`
/// - **OPEN → CLOSED**: `circuit_breaker_reset_secs` elapse after the last failure;
///   the next call is a probe and a single failure reopens the breaker
/// - Any success resets the failure count
#[derive(Debug)]
pub struct CircuitBreaker {
    name: &'static str,
    state: Mutex<BreakerState>,
    threshold: u32,
    reset_after: Duration,
}

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use menu_nutrition::ocr_config::RecoveryConfig;
    /// use menu_nutrition::circuit_breaker::CircuitBreaker;
    ///
    /// let breaker = CircuitBreaker::new("ocr", &RecoveryConfig::default());
    /// assert!(!breaker.is_open());
    /// ```
    pub fn new(name: &'static str, config: &RecoveryConfig) -> Self {
        Self {
            name,
            state: Mutex::new(BreakerState::default()),
            threshold: config.circuit_breaker_threshold,
            reset_after: Duration::from_secs(config.circuit_breaker_reset_secs),
        }
    }

    /// Name of the guarded dependency, used as a metrics label
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Check if circuit breaker is open (blocking requests)
    ///
    /// Resets to closed automatically once the reset timeout has elapsed.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock();

        if state.failure_count >= self.threshold {
            if let Some(last_time) = state.last_failure_time {
                if last_time.elapsed() < self.reset_after {
                    return true;
                }
                // Half-open probe: one more failure trips it again
                state.failure_count = self.threshold.saturating_sub(1);
                state.last_failure_time = None;
            }
        }
        false
    }

    /// Record a failure to increment the failure counter
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());
    }

    /// Record a success to reset the failure counter
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        state.failure_count = 0;
        state.last_failure_time = None;
    }

    /// Current consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: u32, reset_secs: u64) -> RecoveryConfig {
        RecoveryConfig {
            circuit_breaker_threshold: threshold,
            circuit_breaker_reset_secs: reset_secs,
            ..Default::default()
        }
    }

    #[test]
    fn test_opens_after_threshold() {
        let breaker = CircuitBreaker::new("test", &config(3, 60));
        breaker.record_failure();
        breaker.record_failure();
        assert!(!breaker.is_open());
        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn test_success_resets() {
        let breaker = CircuitBreaker::new("test", &config(2, 60));
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.is_open());
        breaker.record_success();
        assert!(!breaker.is_open());
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn test_half_open_after_reset_timeout() {
        let breaker = CircuitBreaker::new("test", &config(1, 1));
        breaker.record_failure();
        assert!(breaker.is_open());

        std::thread::sleep(Duration::from_millis(1100));
        assert!(!breaker.is_open());

        // A failing probe reopens immediately
        breaker.record_failure();
        assert!(breaker.is_open());
    }
}
