//! Configuration for Floodgate.
//!
//! Hosts that prefer files over code can describe quotas and the sweeper
//! in YAML and build a [`PolicyRegistry`] from it:
//!
//! ```yaml
//! limits:
//!   login:  { capacity: 5,  per: minute }
//!   upload: { capacity: 10, per: minute }
//! sweep:
//!   interval_secs: 60
//!   idle_timeout_secs: 600
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FloodgateError, Result};
use crate::ratelimit::{LimitCategory, PolicyRegistry, Quota};

/// Top-level admission configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Quota overrides per category. Categories not listed keep their
    /// built-in defaults.
    #[serde(default)]
    pub limits: HashMap<LimitCategory, QuotaRule>,

    /// Idle-bucket sweeper settings.
    #[serde(default)]
    pub sweep: SweepConfig,
}

/// A quota as written in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaRule {
    /// Operations allowed per time unit (burst size).
    pub capacity: u64,
    /// The time unit over which the capacity refills.
    pub per: TimeUnit,
}

impl QuotaRule {
    /// Validate and convert into a [`Quota`].
    pub fn quota(&self) -> Result<Quota> {
        if self.capacity == 0 {
            return Err(FloodgateError::Config(
                "quota capacity must be positive".to_string(),
            ));
        }
        Ok(Quota::new(self.capacity, self.per.duration()))
    }
}

/// Refill time unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    /// Get the duration of this time unit.
    pub fn duration(&self) -> Duration {
        match self {
            TimeUnit::Second => Duration::from_secs(1),
            TimeUnit::Minute => Duration::from_secs(60),
            TimeUnit::Hour => Duration::from_secs(3600),
            TimeUnit::Day => Duration::from_secs(86400),
        }
    }
}

/// Idle-bucket sweeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// How often the sweeper runs, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,

    /// Buckets idle longer than this are evicted, in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

impl SweepConfig {
    /// Sweep interval as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Idle timeout as a duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_idle_timeout() -> u64 {
    // Ten refill windows of the default per-minute quotas
    600
}

impl AdmissionConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| FloodgateError::Config(e.to_string()))
    }

    /// Build the quota table: built-in defaults overlaid with the
    /// configured limits. Fails on an invalid rule.
    pub fn registry(&self) -> Result<PolicyRegistry> {
        let mut registry = PolicyRegistry::new();
        for (category, rule) in &self.limits {
            registry = registry.with_quota(*category, rule.quota()?);
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
limits:
  login:  { capacity: 3, per: minute }
  upload: { capacity: 100, per: hour }
sweep:
  interval_secs: 30
  idle_timeout_secs: 300
"#;
        let config = AdmissionConfig::from_yaml(yaml).unwrap();

        let registry = config.registry().unwrap();
        let login = registry.quota_for(LimitCategory::Login).unwrap();
        assert_eq!(login.capacity, 3);
        assert_eq!(login.period, Duration::from_secs(60));

        let upload = registry.quota_for(LimitCategory::Upload).unwrap();
        assert_eq!(upload.capacity, 100);
        assert_eq!(upload.period, Duration::from_secs(3600));

        assert_eq!(config.sweep.interval(), Duration::from_secs(30));
        assert_eq!(config.sweep.idle_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_empty_config_keeps_defaults() {
        let config = AdmissionConfig::from_yaml("{}").unwrap();

        let registry = config.registry().unwrap();
        assert_eq!(registry.quota_for(LimitCategory::Login).unwrap().capacity, 5);
        assert_eq!(
            registry.quota_for(LimitCategory::Upload).unwrap().capacity,
            10
        );

        assert_eq!(config.sweep.interval_secs, 60);
        assert_eq!(config.sweep.idle_timeout_secs, 600);
    }

    #[test]
    fn test_partial_override_keeps_other_defaults() {
        let yaml = r#"
limits:
  login: { capacity: 2, per: second }
"#;
        let config = AdmissionConfig::from_yaml(yaml).unwrap();
        let registry = config.registry().unwrap();

        assert_eq!(registry.quota_for(LimitCategory::Login).unwrap().capacity, 2);
        assert_eq!(
            registry.quota_for(LimitCategory::Upload).unwrap().capacity,
            10
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let yaml = r#"
limits:
  login: { capacity: 0, per: minute }
"#;
        let config = AdmissionConfig::from_yaml(yaml).unwrap();
        let err = config.registry().unwrap_err();
        assert!(matches!(err, FloodgateError::Config(_)));
    }

    #[test]
    fn test_malformed_yaml_rejected() {
        let err = AdmissionConfig::from_yaml("limits: [not, a, map]").unwrap_err();
        assert!(matches!(err, FloodgateError::Config(_)));
    }

    #[test]
    fn test_time_unit_durations() {
        assert_eq!(TimeUnit::Second.duration(), Duration::from_secs(1));
        assert_eq!(TimeUnit::Minute.duration(), Duration::from_secs(60));
        assert_eq!(TimeUnit::Hour.duration(), Duration::from_secs(3600));
        assert_eq!(TimeUnit::Day.duration(), Duration::from_secs(86400));
    }
}
