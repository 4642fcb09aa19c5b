use std::path::Path;
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;
use shared::types::AttributionParameters;

use crate::domain::circuit_breaker::CircuitBreakerConfig;

/// Longest range a single attribution run may cover.
pub const DEFAULT_MAX_RUN_DAYS: u32 = 31;

/// Process-wide settings loaded from `guard.toml`. Tenant behaviour lives in
/// [`AttributionParameters`], not here.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub timezone: String,
    pub max_run_days: u32,
    pub escalation: EscalationSettings,
    pub roster_circuit_breaker: CircuitBreakerConfig,
    pub notification_circuit_breaker: CircuitBreakerConfig,
    pub health_check: HealthCheckSettings,
    pub cache: CacheSettings,
    /// Used for replacement handling when a tenant has no parameters row.
    pub default_parameters: AttributionParameters,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Paris".to_string(),
            max_run_days: DEFAULT_MAX_RUN_DAYS,
            escalation: EscalationSettings::default(),
            roster_circuit_breaker: CircuitBreakerConfig::default(),
            notification_circuit_breaker: CircuitBreakerConfig::default(),
            health_check: HealthCheckSettings::default(),
            cache: CacheSettings::default(),
            default_parameters: AttributionParameters::default(),
        }
    }
}

impl ServiceConfig {
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        if !Path::new(path).exists() {
            tracing::info!("Config file not found at {path}, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        tracing::info!(?config, "Loaded guard service config from {path}");
        Ok(config)
    }

    pub fn timezone(&self) -> Tz {
        self.timezone.parse::<Tz>().unwrap_or_else(|_| {
            tracing::warn!(
                timezone = %self.timezone,
                "Invalid timezone, falling back to UTC"
            );
            Tz::UTC
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EscalationSettings {
    pub tick_secs: u64,
    /// Maximum due requests handled per tick.
    pub batch_size: u32,
}

impl Default for EscalationSettings {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            batch_size: 100,
        }
    }
}

impl EscalationSettings {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }
}

/// Serializable health check settings for the roster service check.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthCheckSettings {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for HealthCheckSettings {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub members_ttl_secs: u64,
    pub guard_types_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            members_ttl_secs: 120,
            guard_types_ttl_secs: 600,
        }
    }
}
