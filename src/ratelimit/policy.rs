//! Limit categories and their quotas.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FloodgateError, Result};

/// A protected operation class.
///
/// Each category carries exactly one quota; callers are throttled per
/// (category, identity) pair, never across categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitCategory {
    /// Authentication attempts.
    Login,
    /// Bulk health-data uploads.
    Upload,
}

impl LimitCategory {
    /// Upper-case name used in limiter keys and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitCategory::Login => "LOGIN",
            LimitCategory::Upload => "UPLOAD",
        }
    }
}

impl std::fmt::Display for LimitCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable rate quota: up to `capacity` operations per `period`,
/// with the full capacity refilling greedily over the period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    /// Maximum operations in one refill period (burst size).
    pub capacity: u64,
    /// Refill period.
    pub period: Duration,
}

impl Quota {
    /// Create a quota. Capacity and period must be positive; a zero
    /// value is a programming error, not a runtime condition.
    pub fn new(capacity: u64, period: Duration) -> Self {
        assert!(capacity > 0, "quota capacity must be positive");
        assert!(!period.is_zero(), "quota period must be positive");
        Self { capacity, period }
    }

    /// `capacity` operations per minute.
    pub fn per_minute(capacity: u64) -> Self {
        Self::new(capacity, Duration::from_secs(60))
    }

    /// `capacity` operations per second.
    pub fn per_second(capacity: u64) -> Self {
        Self::new(capacity, Duration::from_secs(1))
    }
}

/// Fixed category → quota table, populated at startup.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    quotas: HashMap<LimitCategory, Quota>,
}

impl PolicyRegistry {
    /// Registry with the built-in default quotas: 5 logins and
    /// 10 uploads per minute.
    pub fn new() -> Self {
        Self::empty()
            .with_quota(LimitCategory::Login, Quota::per_minute(5))
            .with_quota(LimitCategory::Upload, Quota::per_minute(10))
    }

    /// Registry with no quotas registered.
    pub fn empty() -> Self {
        Self {
            quotas: HashMap::new(),
        }
    }

    /// Register (or replace) the quota for a category.
    pub fn with_quota(mut self, category: LimitCategory, quota: Quota) -> Self {
        self.quotas.insert(category, quota);
        self
    }

    /// Look up the quota for a category.
    ///
    /// A missing category means the host wired a protected operation to a
    /// category it never configured; the error is fatal, not retryable.
    pub fn quota_for(&self, category: LimitCategory) -> Result<Quota> {
        self.quotas
            .get(&category)
            .copied()
            .ok_or(FloodgateError::UnknownCategory(category))
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_quotas() {
        let registry = PolicyRegistry::new();

        let login = registry.quota_for(LimitCategory::Login).unwrap();
        assert_eq!(login.capacity, 5);
        assert_eq!(login.period, Duration::from_secs(60));

        let upload = registry.quota_for(LimitCategory::Upload).unwrap();
        assert_eq!(upload.capacity, 10);
        assert_eq!(upload.period, Duration::from_secs(60));
    }

    #[test]
    fn test_unknown_category_is_an_error() {
        let registry = PolicyRegistry::empty();

        let err = registry.quota_for(LimitCategory::Login).unwrap_err();
        assert!(matches!(
            err,
            crate::error::FloodgateError::UnknownCategory(LimitCategory::Login)
        ));
    }

    #[test]
    fn test_with_quota_replaces() {
        let registry = PolicyRegistry::new().with_quota(LimitCategory::Login, Quota::per_second(2));

        let login = registry.quota_for(LimitCategory::Login).unwrap();
        assert_eq!(login.capacity, 2);
        assert_eq!(login.period, Duration::from_secs(1));
    }

    #[test]
    #[should_panic(expected = "capacity must be positive")]
    fn test_zero_capacity_rejected() {
        let _ = Quota::new(0, Duration::from_secs(1));
    }

    #[test]
    fn test_category_display() {
        assert_eq!(LimitCategory::Login.to_string(), "LOGIN");
        assert_eq!(LimitCategory::Upload.to_string(), "UPLOAD");
    }
}
