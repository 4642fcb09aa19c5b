use std::time::{Duration, Instant};

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 30,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown_duration(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Consecutive-failure breaker guarding one upstream (roster service or
/// notification dispatcher). `upstream` only labels log lines and errors.
pub struct CircuitBreaker {
    upstream: &'static str,
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(upstream: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            upstream,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            config,
        }
    }

    pub fn upstream(&self) -> &'static str {
        self.upstream
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Whether a call may go through. An open breaker lets a single trial call
    /// through once the cooldown has elapsed.
    pub fn can_execute(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled_down = self
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.cooldown_duration());
                if cooled_down {
                    tracing::info!(upstream = self.upstream, "Circuit breaker half-open, probing");
                    self.state = CircuitState::HalfOpen;
                }
                cooled_down
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state != CircuitState::Closed {
            tracing::info!(
                upstream = self.upstream,
                previous_state = ?self.state,
                "Circuit breaker closing after successful call"
            );
        }
        self.reset();
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;

        let should_open = match self.state {
            CircuitState::Closed => self.consecutive_failures >= self.config.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if should_open {
            tracing::warn!(
                upstream = self.upstream,
                failures = self.consecutive_failures,
                "Circuit breaker opening"
            );
            self.state = CircuitState::Open;
            self.opened_at = Some(Instant::now());
        }
    }

    /// Closes the breaker regardless of state; used when a health check
    /// observes the upstream is back.
    pub fn force_close(&mut self) {
        if self.state != CircuitState::Closed {
            tracing::info!(
                upstream = self.upstream,
                previous_state = ?self.state,
                "Circuit breaker force-closed by health check"
            );
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.state = CircuitState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_breaker(threshold: u32, cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "roster service",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                cooldown_secs: cooldown.as_secs(),
            },
        )
    }

    #[test]
    fn opens_only_at_threshold() {
        let mut breaker = make_breaker(3, Duration::from_secs(10));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn zero_cooldown_allows_a_trial_call_immediately() {
        let mut breaker = make_breaker(1, Duration::from_secs(0));
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn failed_trial_call_reopens() {
        let mut breaker = make_breaker(2, Duration::from_secs(0));
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.can_execute());

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn successful_trial_call_closes_and_resets_count() {
        let mut breaker = make_breaker(2, Duration::from_secs(0));
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.can_execute());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn force_close_overrides_long_cooldown() {
        let mut breaker = make_breaker(1, Duration::from_secs(100));
        breaker.record_failure();
        assert!(!breaker.can_execute());

        breaker.force_close();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.opened_at.is_none());
        assert!(breaker.can_execute());
    }
}
