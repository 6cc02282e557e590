//! Admission gate: the public entry point of the limiter.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::error::Result;

use super::key::LimiterKey;
use super::policy::{LimitCategory, PolicyRegistry};
use super::resolver::{IdentityKind, RequestContext};
use super::store::BucketStore;

/// Outcome of an admission check.
#[derive(Debug, Clone)]
pub struct Decision {
    /// Whether the operation may proceed.
    pub allowed: bool,
    /// Tokens left in the bucket after this check.
    pub remaining: f64,
    /// How long the caller should wait before retrying. Zero when
    /// allowed; the category's full refill period when denied.
    pub retry_after: Duration,
}

/// Structured denial signal.
///
/// The only externally observable effect of this subsystem: hosts map it
/// to their own error surface (typically HTTP 429 with a `Retry-After`
/// header of [`retry_after_secs`] seconds).
///
/// [`retry_after_secs`]: Rejection::retry_after_secs
#[derive(Debug, Clone, Error)]
#[error("rate limit exceeded for {category}, retry after {}s", .retry_after.as_secs())]
pub struct Rejection {
    /// The category whose quota was exhausted.
    pub category: LimitCategory,
    /// The category's refill period.
    pub retry_after: Duration,
}

impl Rejection {
    /// Retry-after in whole seconds, clamped to at least 1 (for HTTP
    /// headers, where 0 would invite an immediate retry).
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after.as_secs().max(1)
    }
}

/// The admission gate.
///
/// Holds the quota table and the bucket store; every protected operation
/// funnels through [`check`] (or one of its wrappers) before running.
/// Construct one at process start and share it; the store can be injected
/// to share bucket state between gates or to isolate it in tests.
///
/// [`check`]: Gate::check
#[derive(Debug)]
pub struct Gate {
    /// Category → quota table, fixed after construction.
    policies: PolicyRegistry,
    /// Bucket state, shared via `Arc`.
    store: Arc<BucketStore>,
}

impl Gate {
    /// Create a gate with its own private bucket store.
    pub fn new(policies: PolicyRegistry) -> Self {
        Self::with_store(policies, Arc::new(BucketStore::new()))
    }

    /// Create a gate over an explicitly constructed store.
    pub fn with_store(policies: PolicyRegistry, store: Arc<BucketStore>) -> Self {
        Self { policies, store }
    }

    /// The underlying bucket store.
    pub fn store(&self) -> &Arc<BucketStore> {
        &self.store
    }

    /// Decide whether one `category` operation from the caller described
    /// by `ctx` may proceed, consuming one token if so.
    ///
    /// `key_by` selects how the caller's identity is derived; the host
    /// fixes it per protected operation, not per request. Fails only on
    /// an unregistered category.
    pub fn check(
        &self,
        category: LimitCategory,
        key_by: IdentityKind,
        ctx: &RequestContext,
    ) -> Result<Decision> {
        let quota = self.policies.quota_for(category)?;
        let identity = key_by.resolve(ctx);
        let key = LimiterKey::new(category, key_by, identity);

        trace!(key = %key, "Checking admission");

        let bucket = self.store.get_or_create(&key, quota);
        if bucket.try_consume(1) {
            let remaining = bucket.available_tokens();
            debug!(key = %key, remaining, "Admission granted");
            Ok(Decision {
                allowed: true,
                remaining,
                retry_after: Duration::ZERO,
            })
        } else {
            warn!(key = %key, retry_after = ?quota.period, "Rate limit exceeded");
            Ok(Decision {
                allowed: false,
                remaining: bucket.available_tokens(),
                retry_after: quota.period,
            })
        }
    }

    /// Like [`check`], but converts a denial into a [`Rejection`] error,
    /// for hosts that propagate failures with `?`.
    ///
    /// [`check`]: Gate::check
    pub fn admit(
        &self,
        category: LimitCategory,
        key_by: IdentityKind,
        ctx: &RequestContext,
    ) -> Result<()> {
        let decision = self.check(category, key_by, ctx)?;
        if decision.allowed {
            Ok(())
        } else {
            Err(Rejection {
                category,
                retry_after: decision.retry_after,
            }
            .into())
        }
    }

    /// Run `op` only if the caller is admitted.
    ///
    /// The check happens before the protected body, every time,
    /// unconditionally; a denied caller's `op` is never polled.
    pub async fn guard<F, T>(
        &self,
        category: LimitCategory,
        key_by: IdentityKind,
        ctx: &RequestContext,
        op: F,
    ) -> Result<T>
    where
        F: Future<Output = T>,
    {
        self.admit(category, key_by, ctx)?;
        Ok(op.await)
    }

    /// Tokens currently available to this caller, without consuming any.
    /// Diagnostic only.
    pub fn available(
        &self,
        category: LimitCategory,
        key_by: IdentityKind,
        ctx: &RequestContext,
    ) -> Result<f64> {
        let quota = self.policies.quota_for(category)?;
        let identity = key_by.resolve(ctx);
        let key = LimiterKey::new(category, key_by, identity);
        Ok(self.store.get_or_create(&key, quota).available_tokens())
    }
}
