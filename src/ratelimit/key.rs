//! Limiter key construction.

use super::policy::LimitCategory;
use super::resolver::IdentityKind;

/// Composite key addressing exactly one bucket.
///
/// Two requests share a bucket iff category, identity kind, and identity
/// string are all equal; identities never collide across categories.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimiterKey {
    /// The protected operation class.
    pub category: LimitCategory,
    /// The strategy that produced the identity.
    pub kind: IdentityKind,
    /// The resolved identity string.
    pub identity: String,
}

impl LimiterKey {
    /// Create a key from its three components.
    pub fn new(category: LimitCategory, kind: IdentityKind, identity: impl Into<String>) -> Self {
        Self {
            category,
            kind,
            identity: identity.into(),
        }
    }
}

impl std::fmt::Display for LimiterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.category, self.kind, self.identity)
    }
}
