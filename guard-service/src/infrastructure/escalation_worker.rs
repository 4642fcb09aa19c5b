use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::domain::escalation::EscalationEngine;

/// Spawns the durable escalation timer. Every tick reloads due requests from
/// storage, so a restart resumes exactly where the previous process stopped.
pub fn spawn_escalation_worker(
    escalation: EscalationEngine,
    tick: Duration,
    task_tracker: &TaskTracker,
    cancel_token: CancellationToken,
) {
    tracing::info!(tick_secs = tick.as_secs(), "Starting escalation worker");

    task_tracker.spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    tracing::info!("Escalation worker shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match escalation.process_due(Utc::now()).await {
                        Ok(0) => {}
                        Ok(advanced) => tracing::info!(advanced, "Escalation pass done"),
                        Err(e) => tracing::error!("Escalation pass failed: {e}"),
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime, Weekday};
    use shared::types::{GuardType, ReplacementStatus, Urgency};
    use uuid::Uuid;

    use crate::domain::config::ServiceConfig;
    use crate::domain::notification::MockNotificationDispatcher;
    use crate::domain::replacement::{NewReplacementRequest, ReplacementRepository};
    use crate::domain::roster::MockRosterClient;
    use crate::infrastructure::memory::InMemoryStore;

    #[tokio::test(start_paused = true)]
    async fn first_tick_advances_pending_requests() {
        let guard = GuardType {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            name: "Nuit".to_string(),
            start_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            stored_duration_hours: Some(12.0),
            weekdays: vec![Weekday::Sat],
            required_headcount: 1,
            officer_required: false,
            required_competencies: vec![],
            is_external: false,
            external_hourly_rate: None,
            active: true,
        };
        let mut roster = MockRosterClient::new();
        roster.expect_get_members().returning(|_| Ok(vec![]));
        let guards = vec![guard.clone()];
        roster
            .expect_get_guard_types()
            .returning(move |_| Ok(guards.clone()));

        let store = Arc::new(InMemoryStore::new());
        let config = ServiceConfig {
            timezone: "UTC".to_string(),
            ..ServiceConfig::default()
        };
        let engine = EscalationEngine::new(
            Arc::new(roster),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(MockNotificationDispatcher::new()),
            &config,
        );

        let request = ReplacementRepository::create(
            store.as_ref(),
            NewReplacementRequest {
                tenant_id: Uuid::nil(),
                requester_id: None,
                guard_type_id: guard.id,
                date: NaiveDate::from_ymd_opt(2025, 12, 6).unwrap(),
                shift_starts_at: Utc::now() + ChronoDuration::days(10),
                reason: "Sous-effectif".to_string(),
                urgency: Urgency::Normal,
                original_assignment_id: None,
            },
        )
        .await
        .unwrap();

        let tracker = TaskTracker::new();
        let token = CancellationToken::new();
        spawn_escalation_worker(engine, Duration::from_secs(60), &tracker, token.clone());
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        tracker.close();
        tracker.wait().await;

        let stored = ReplacementRepository::find_by_id(store.as_ref(), Uuid::nil(), request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ReplacementStatus::Expired);
        assert!(stored.next_attempt_at.is_none());
    }
}
