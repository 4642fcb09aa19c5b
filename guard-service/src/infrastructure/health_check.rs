use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::domain::circuit_breaker::CircuitState;
use crate::domain::config::HealthCheckSettings;
use crate::domain::escalation::EscalationEngine;
use crate::infrastructure::circuit_breaker::SharedBreaker;

/// Resolved health check configuration with concrete `Duration` values and the full endpoint URL.
pub struct HealthCheckConfig {
    pub interval: Duration,
    pub health_endpoint: String,
    pub timeout: Duration,
}

impl HealthCheckConfig {
    pub fn from_settings(settings: &HealthCheckSettings, roster_service_url: &str) -> Self {
        Self {
            interval: Duration::from_secs(settings.interval_secs.max(1)),
            health_endpoint: format!("{roster_service_url}/headpat"),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

/// Spawns a periodic task that pings the roster service.
///
/// When the roster comes back after an outage, the breaker is force-closed
/// and the replacement requests deferred during the outage are advanced
/// right away instead of waiting for the next escalation tick.
///
/// # Panics
///
/// Panics if the HTTP client cannot be built.
pub fn spawn_health_check(
    config: HealthCheckConfig,
    breaker: SharedBreaker,
    escalation: EscalationEngine,
    task_tracker: &TaskTracker,
    cancel_token: CancellationToken,
) {
    let client = Client::builder()
        .timeout(config.timeout)
        .build()
        .expect("Failed to build health check HTTP client");

    let catching_up = Arc::new(AtomicBool::new(false));

    tracing::info!(
        endpoint = %config.health_endpoint,
        interval_secs = config.interval.as_secs(),
        "Starting roster service health check"
    );

    task_tracker.spawn(async move {
        let mut interval = tokio::time::interval(config.interval);

        loop {
            tokio::select! {
                () = cancel_token.cancelled() => {
                    tracing::info!("Health check task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    check_health(
                        &client,
                        &config.health_endpoint,
                        &breaker,
                        &escalation,
                        &catching_up,
                    ).await;
                }
            }
        }
    });
}

async fn check_health(
    client: &Client,
    endpoint: &str,
    breaker: &SharedBreaker,
    escalation: &EscalationEngine,
    catching_up: &AtomicBool,
) {
    match client.get(endpoint).send().await {
        Ok(res) if res.status().is_success() => {
            tracing::debug!("Roster service health check passed");

            let recovered = {
                let mut b = breaker.lock().await;
                let was_open = b.state() != CircuitState::Closed;
                b.force_close();
                was_open
            };

            if recovered && !catching_up.swap(true, Ordering::SeqCst) {
                tracing::info!("Roster service recovered, advancing due replacements");

                match escalation.process_due(Utc::now()).await {
                    Ok(advanced) => tracing::info!(advanced, "Recovery escalation pass done"),
                    Err(e) => tracing::error!("Recovery escalation pass failed: {e}"),
                }

                catching_up.store(false, Ordering::SeqCst);
            }
        }
        Ok(res) => {
            tracing::warn!(
                status = %res.status(),
                "Roster service health check returned non-success"
            );
            breaker.lock().await.record_failure();
        }
        Err(e) => {
            tracing::warn!(error = %e, "Roster service health check failed");
            breaker.lock().await.record_failure();
        }
    }
}
