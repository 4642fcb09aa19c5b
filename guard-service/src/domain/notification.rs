use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use shared::types::{NotificationMode, Urgency};
use uuid::Uuid;

use crate::error::GuardServiceError;

/// One replacement offer addressed to one member.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplacementOffer {
    pub tenant_id: Uuid,
    pub request_id: Uuid,
    pub member_id: Uuid,
    pub guard_type_id: Uuid,
    pub date: NaiveDate,
    pub shift_starts_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub urgency: Urgency,
    pub mode: NotificationMode,
}

/// Delivers offers. Answers come back through the accept/decline routes.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send_offer(&self, offer: ReplacementOffer) -> Result<(), GuardServiceError>;
}
