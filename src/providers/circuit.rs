//! Circuit breaker guarding a single provider operation.
//!
//! CLOSED -> OPEN after `fail_threshold` consecutive failures. OPEN refuses
//! calls until `recovery_interval` has elapsed, then probes via HALF_OPEN.
//! HALF_OPEN closes after `success_threshold` consecutive successes and
//! reopens on any failure.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_at: Option<DateTime<Utc>>,
    fail_threshold: u32,
    success_threshold: u32,
    recovery_interval: Duration,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_thresholds(name, 5, 2, Duration::seconds(300))
    }

    pub fn with_thresholds(
        name: impl Into<String>,
        fail_threshold: u32,
        success_threshold: u32,
        recovery_interval: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_at: None,
            fail_threshold: fail_threshold.max(1),
            success_threshold: success_threshold.max(1),
            recovery_interval,
        }
    }

    /// Whether a call may go out right now. An OPEN circuit flips itself to
    /// HALF_OPEN once the recovery interval has elapsed.
    pub fn should_allow(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed_enough = self
                    .last_failure_at
                    .map(|t| now - t >= self.recovery_interval)
                    .unwrap_or(false);
                if elapsed_enough {
                    self.state = CircuitState::HalfOpen;
                    self.consecutive_successes = 0;
                    info!(circuit = %self.name, "Circuit HALF_OPEN (recovery probe)");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        match self.state {
            CircuitState::HalfOpen => {
                self.consecutive_successes += 1;
                if self.consecutive_successes >= self.success_threshold {
                    self.state = CircuitState::Closed;
                    self.consecutive_successes = 0;
                    info!(circuit = %self.name, "Circuit CLOSED (recovered)");
                }
            }
            CircuitState::Closed => self.consecutive_successes += 1,
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.consecutive_successes = 0;
        self.last_failure_at = Some(now);
        match self.state {
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                warn!(circuit = %self.name, "Circuit reopened from HALF_OPEN");
            }
            CircuitState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.fail_threshold {
                    self.state = CircuitState::Open;
                    warn!(
                        circuit = %self.name,
                        failures = self.consecutive_failures,
                        "Circuit OPEN"
                    );
                }
            }
            CircuitState::Open => self.consecutive_failures += 1,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        CircuitSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
            last_failure_at: self.last_failure_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let mut cb = CircuitBreaker::with_thresholds("x", 3, 2, Duration::seconds(60));
        for _ in 0..2 {
            cb.record_failure(t0());
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        cb.record_failure(t0());
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.should_allow(t0() + Duration::seconds(30)));
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let mut cb = CircuitBreaker::with_thresholds("x", 3, 2, Duration::seconds(60));
        cb.record_failure(t0());
        cb.record_failure(t0());
        cb.record_success();
        cb.record_failure(t0());
        cb.record_failure(t0());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_probe_then_close() {
        let mut cb = CircuitBreaker::with_thresholds("x", 1, 2, Duration::seconds(60));
        cb.record_failure(t0());
        assert_eq!(cb.state(), CircuitState::Open);

        // Recovery interval elapsed: probe allowed, state HALF_OPEN.
        assert!(cb.should_allow(t0() + Duration::seconds(61)));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let mut cb = CircuitBreaker::with_thresholds("x", 1, 2, Duration::seconds(60));
        cb.record_failure(t0());
        assert!(cb.should_allow(t0() + Duration::seconds(90)));
        cb.record_failure(t0() + Duration::seconds(91));
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.should_allow(t0() + Duration::seconds(100)));
    }
}
