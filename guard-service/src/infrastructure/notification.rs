use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::global;
use opentelemetry_http::HeaderInjector;
use reqwest::{Client, header};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::domain::notification::{NotificationDispatcher, ReplacementOffer};
use crate::error::GuardServiceError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Posts offers to the notification service, which fans them out over the
/// channel named by the offer's mode. A single attempt per offer: an offer
/// that never arrives simply expires with its wave.
pub struct HttpNotificationDispatcher {
    client: Client,
    base_url: String,
}

impl HttpNotificationDispatcher {
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (invalid TLS configuration).
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");
        Self { client, base_url }
    }
}

#[async_trait]
impl NotificationDispatcher for HttpNotificationDispatcher {
    #[tracing::instrument(
        skip(self, offer),
        fields(request_id = %offer.request_id, member_id = %offer.member_id)
    )]
    async fn send_offer(&self, offer: ReplacementOffer) -> Result<(), GuardServiceError> {
        let base_url = &self.base_url;
        let url = format!("{base_url}/api/v1/replacement-offers");

        let mut headers = header::HeaderMap::new();
        let cx = tracing::Span::current().context();
        global::get_text_map_propagator(|propagator| {
            propagator.inject_context(&cx, &mut HeaderInjector(&mut headers));
        });

        let res = self
            .client
            .post(&url)
            .headers(headers)
            .json(&offer)
            .send()
            .await
            .map_err(|e| GuardServiceError::Notification(format!("Failed to send offer: {e}")))?;

        if !res.status().is_success() {
            return Err(GuardServiceError::Notification(format!(
                "Notification service returned status {}",
                res.status()
            )));
        }
        tracing::debug!("Offer delivered");
        Ok(())
    }
}

/// Writes offers to the log. Used when no notification service is configured.
pub struct LogNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for LogNotificationDispatcher {
    async fn send_offer(&self, offer: ReplacementOffer) -> Result<(), GuardServiceError> {
        tracing::info!(
            request_id = %offer.request_id,
            member_id = %offer.member_id,
            date = %offer.date,
            deadline = %offer.deadline,
            mode = ?offer.mode,
            urgency = ?offer.urgency,
            "Replacement offer"
        );
        Ok(())
    }
}
