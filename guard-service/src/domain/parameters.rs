use async_trait::async_trait;
use shared::types::AttributionParameters;
use uuid::Uuid;

use crate::error::GuardServiceError;

/// Tenant-scoped attribution settings. A tenant without a row has automatic
/// attribution disabled.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait ParametersRepository: Send + Sync {
    async fn find(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<AttributionParameters>, GuardServiceError>;
    async fn upsert(
        &self,
        tenant_id: Uuid,
        params: AttributionParameters,
    ) -> Result<AttributionParameters, GuardServiceError>;
}

pub fn validate(params: &AttributionParameters) -> Result<(), GuardServiceError> {
    if params.simultaneous_offers == 0 {
        return Err(GuardServiceError::BadRequest(
            "simultaneous_offers must be at least 1".into(),
        ));
    }
    check_delay("wait_delay_hours", params.wait_delay_hours)?;
    if let Some(urgent) = params.urgent_wait_delay_hours {
        check_delay("urgent_wait_delay_hours", urgent)?;
    }
    Ok(())
}

fn check_delay(field: &str, hours: f64) -> Result<(), GuardServiceError> {
    let max = AttributionParameters::MAX_WAIT_DELAY_HOURS;
    if !hours.is_finite() || hours <= 0.0 || hours > max {
        return Err(GuardServiceError::BadRequest(format!(
            "{field} must be a number of hours in (0, {max}]"
        )));
    }
    Ok(())
}
