use std::sync::Arc;

use crate::domain::escalation::EscalationEngine;
use crate::domain::service::GuardService;

pub struct GuardAppState {
    pub guard_service: Arc<GuardService>,
    pub escalation: EscalationEngine,
}

impl GuardAppState {
    pub fn new(guard_service: Arc<GuardService>) -> Self {
        let escalation = guard_service.escalation().clone();
        Self {
            guard_service,
            escalation,
        }
    }
}
