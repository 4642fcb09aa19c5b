pub mod assignment;
pub mod attribution;
pub mod availability;
pub mod circuit_breaker;
pub mod config;
pub mod eligibility;
pub mod escalation;
pub mod notification;
pub mod parameters;
pub mod replacement;
pub mod replacement_state;
pub mod roster;
pub mod run_lock;
pub mod service;
