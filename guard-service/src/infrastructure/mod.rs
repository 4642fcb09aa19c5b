pub mod cache;
pub mod circuit_breaker;
pub mod escalation_worker;
pub mod health_check;
pub mod memory;
pub mod notification;
pub mod postgres;
pub mod roster_client;
