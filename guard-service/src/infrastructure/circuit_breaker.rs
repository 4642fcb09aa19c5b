use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use shared::types::{GuardType, Member};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::domain::notification::{NotificationDispatcher, ReplacementOffer};
use crate::domain::roster::RosterClient;
use crate::error::GuardServiceError;

pub type SharedBreaker = Arc<Mutex<CircuitBreaker>>;

/// Runs `call` unless the breaker is open, and records its outcome.
async fn guarded<T, F>(breaker: &SharedBreaker, call: F) -> Result<T, GuardServiceError>
where
    F: Future<Output = Result<T, GuardServiceError>>,
{
    let upstream = {
        let mut breaker = breaker.lock().await;
        if !breaker.can_execute() {
            tracing::warn!(
                upstream = breaker.upstream(),
                "Circuit breaker is open, fast-failing request"
            );
            return Err(GuardServiceError::CircuitOpen(breaker.upstream()));
        }
        breaker.upstream()
    };

    match call.await {
        Ok(result) => {
            breaker.lock().await.record_success();
            Ok(result)
        }
        Err(e) => {
            let mut breaker = breaker.lock().await;
            breaker.record_failure();
            let state = breaker.state();
            drop(breaker);

            tracing::warn!(
                upstream,
                circuit_state = ?state,
                "Upstream call failed, circuit breaker recorded failure"
            );
            Err(e)
        }
    }
}

/// Decorator around a [`RosterClient`] that checks the circuit breaker before
/// delegating calls and records successes/failures.
pub struct CircuitBreakerRosterClient {
    inner: Arc<dyn RosterClient>,
    breaker: SharedBreaker,
}

impl CircuitBreakerRosterClient {
    /// Returns both the client and a shared handle to the breaker (used by
    /// the health check to force-close it).
    pub fn new(
        inner: Arc<dyn RosterClient>,
        config: CircuitBreakerConfig,
    ) -> (Self, SharedBreaker) {
        let breaker = Arc::new(Mutex::new(CircuitBreaker::new("roster service", config)));
        let client = Self {
            inner,
            breaker: Arc::clone(&breaker),
        };
        (client, breaker)
    }
}

#[async_trait]
impl RosterClient for CircuitBreakerRosterClient {
    async fn get_members(&self, tenant_id: Uuid) -> Result<Vec<Member>, GuardServiceError> {
        guarded(&self.breaker, self.inner.get_members(tenant_id)).await
    }

    async fn get_guard_types(&self, tenant_id: Uuid) -> Result<Vec<GuardType>, GuardServiceError> {
        guarded(&self.breaker, self.inner.get_guard_types(tenant_id)).await
    }
}

/// Same decorator for the notification channel. An open breaker makes
/// offers fail fast; the escalation timer picks them up on the next wave.
pub struct CircuitBreakerDispatcher {
    inner: Arc<dyn NotificationDispatcher>,
    breaker: SharedBreaker,
}

impl CircuitBreakerDispatcher {
    pub fn new(inner: Arc<dyn NotificationDispatcher>, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            breaker: Arc::new(Mutex::new(CircuitBreaker::new("notification service", config))),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for CircuitBreakerDispatcher {
    async fn send_offer(&self, offer: ReplacementOffer) -> Result<(), GuardServiceError> {
        guarded(&self.breaker, self.inner.send_offer(offer)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::circuit_breaker::CircuitState;
    use crate::domain::notification::MockNotificationDispatcher;
    use crate::domain::roster::MockRosterClient;
    use chrono::{NaiveDate, Utc};
    use shared::types::{NotificationMode, Urgency};

    fn make_config(threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            cooldown_secs: 100,
        }
    }

    #[tokio::test]
    async fn delegates_to_inner_when_closed() {
        let mut mock = MockRosterClient::new();
        mock.expect_get_members().returning(|_| Ok(vec![]));

        let (client, _breaker) = CircuitBreakerRosterClient::new(Arc::new(mock), make_config(3));
        let result = client.get_members(Uuid::new_v4()).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn returns_circuit_open_when_open() {
        let mut mock = MockRosterClient::new();
        mock.expect_get_guard_types().returning(|_| {
            Err(GuardServiceError::RosterUnavailable(
                "connection refused".into(),
            ))
        });

        let (client, _breaker) = CircuitBreakerRosterClient::new(Arc::new(mock), make_config(2));

        let _ = client.get_guard_types(Uuid::new_v4()).await;
        let _ = client.get_guard_types(Uuid::new_v4()).await;

        let result = client.get_guard_types(Uuid::new_v4()).await;
        let err = result.unwrap_err();
        assert!(matches!(err, GuardServiceError::CircuitOpen("roster service")));
        assert!(err.is_upstream_outage());
    }

    #[tokio::test]
    async fn both_roster_calls_share_one_breaker() {
        let mut mock = MockRosterClient::new();
        mock.expect_get_members()
            .returning(|_| Err(GuardServiceError::RosterUnavailable("timeout".into())));
        mock.expect_get_guard_types().returning(|_| Ok(vec![]));

        let (client, breaker) = CircuitBreakerRosterClient::new(Arc::new(mock), make_config(2));
        let _ = client.get_members(Uuid::new_v4()).await;
        assert_eq!(breaker.lock().await.state(), CircuitState::Closed);

        let _ = client.get_members(Uuid::new_v4()).await;
        assert_eq!(breaker.lock().await.state(), CircuitState::Open);
        assert!(client.get_guard_types(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn dispatcher_fast_fails_after_threshold() {
        let mut mock = MockNotificationDispatcher::new();
        mock.expect_send_offer()
            .times(1)
            .returning(|_| Err(GuardServiceError::Notification("503".into())));

        let dispatcher = CircuitBreakerDispatcher::new(Arc::new(mock), make_config(1));
        let offer = ReplacementOffer {
            tenant_id: Uuid::nil(),
            request_id: Uuid::new_v4(),
            member_id: Uuid::new_v4(),
            guard_type_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2025, 12, 1).unwrap(),
            shift_starts_at: Utc::now(),
            deadline: Utc::now(),
            urgency: Urgency::Normal,
            mode: NotificationMode::Email,
        };

        assert!(matches!(
            dispatcher.send_offer(offer.clone()).await,
            Err(GuardServiceError::Notification(_))
        ));
        assert!(matches!(
            dispatcher.send_offer(offer).await,
            Err(GuardServiceError::CircuitOpen("notification service"))
        ));
    }
}
