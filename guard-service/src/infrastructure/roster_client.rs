use std::time::Duration;

use async_trait::async_trait;
use opentelemetry::global;
use opentelemetry_http::HeaderInjector;
use reqwest::{Client, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::responses::ApiResponse;
use shared::types::{GuardType, Member};
use tracing_opentelemetry::OpenTelemetrySpanExt;
use uuid::Uuid;

use crate::{domain::roster::RosterClient, error::GuardServiceError};

/// HTTP client for the roster service, with retry logic and OpenTelemetry trace propagation.
pub struct HttpRosterClient {
    client: Client,
    base_url: String,
}

/// Maximum number of retry attempts for transient HTTP failures.
const MAX_RETRIES: u32 = 3;
/// Per-request timeout applied to the underlying HTTP client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

impl HttpRosterClient {
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

    /// GETs `path` and unwraps the `ApiResponse` envelope. Connection-level
    /// failures are retried with exponential backoff; HTTP error statuses are not.
    async fn get_enveloped<T>(&self, path: &str) -> Result<T, GuardServiceError>
    where
        T: Serialize + DeserializeOwned,
    {
        let base_url = &self.base_url;
        let url = format!("{base_url}{path}");
        tracing::debug!(%url, "Requesting roster data");

        let mut last_err = None;

        for attempt in 1..=MAX_RETRIES {
            let mut headers = header::HeaderMap::new();
            let cx = tracing::Span::current().context();
            global::get_text_map_propagator(|propagator| {
                propagator.inject_context(&cx, &mut HeaderInjector(&mut headers));
            });

            match self.client.get(&url).headers(headers).send().await {
                Ok(res) => {
                    tracing::debug!(status = %res.status(), attempt, "Roster service responded");

                    if !res.status().is_success() {
                        return Err(GuardServiceError::Roster(format!(
                            "Roster service returned status {}",
                            res.status()
                        )));
                    }

                    let api_response = res.json::<ApiResponse<T>>().await.map_err(|e| {
                        GuardServiceError::Roster(format!("Failed to deserialize response: {e}"))
                    })?;

                    return api_response
                        .data
                        .ok_or_else(|| GuardServiceError::Roster("No data in response".into()));
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_retries = MAX_RETRIES,
                        error = %e,
                        "Request to roster service failed, retrying"
                    );
                    last_err = Some(e);
                    if attempt < MAX_RETRIES {
                        tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt - 1)))
                            .await;
                    }
                }
            }
        }

        let detail = last_err.map_or_else(|| "no attempt made".to_string(), |e| e.to_string());
        Err(GuardServiceError::RosterUnavailable(format!(
            "Failed to reach roster service after {MAX_RETRIES} attempts: {detail}"
        )))
    }
}

#[async_trait]
impl RosterClient for HttpRosterClient {
    #[tracing::instrument(skip(self))]
    async fn get_members(&self, tenant_id: Uuid) -> Result<Vec<Member>, GuardServiceError> {
        self.get_enveloped(&format!("/api/v1/tenants/{tenant_id}/members"))
            .await
    }

    #[tracing::instrument(skip(self))]
    async fn get_guard_types(&self, tenant_id: Uuid) -> Result<Vec<GuardType>, GuardServiceError> {
        self.get_enveloped(&format!("/api/v1/tenants/{tenant_id}/guard-types"))
            .await
    }
}
