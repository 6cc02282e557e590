//! Identity resolution for limiter keys.
//!
//! Every strategy is total: when its primary signal is missing it falls
//! back to the client IP (or a fixed sentinel), so an unauthenticated
//! caller cannot dodge a limit by omitting credentials.

use std::hash::{Hash, Hasher};

/// Sentinel identity for the `Role` strategy when no role is present.
const ANONYMOUS_ROLE: &str = "ANONYMOUS";

/// Sentinel when neither a forwarded-for header nor a peer address is known.
const UNKNOWN_PEER: &str = "unknown";

/// How the throttling identity is derived from the request.
///
/// A strategy tag, never an identity value itself. The host picks one
/// per protected operation, statically at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    /// Client IP: first forwarded-for entry, else the peer address.
    Ip,
    /// Authenticated principal name; anonymous callers fall back to IP.
    Principal,
    /// Fingerprint of the bearer credential; absent falls back to IP.
    TokenFingerprint,
    /// First role of the authenticated identity, else `ANONYMOUS`.
    Role,
}

impl IdentityKind {
    /// Upper-case name used in limiter keys and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKind::Ip => "IP",
            IdentityKind::Principal => "PRINCIPAL",
            IdentityKind::TokenFingerprint => "TOKEN_FINGERPRINT",
            IdentityKind::Role => "ROLE",
        }
    }

    /// Derive the identity string for this strategy.
    ///
    /// Never blocks and never fails; every branch bottoms out in a
    /// usable string.
    pub fn resolve(&self, ctx: &RequestContext) -> String {
        match self {
            IdentityKind::Ip => client_ip(ctx),
            IdentityKind::Principal => match ctx.principal() {
                Some(name) => name.to_string(),
                None => client_ip(ctx),
            },
            IdentityKind::TokenFingerprint => match ctx.bearer_token() {
                Some(token) => fingerprint(token),
                None => client_ip(ctx),
            },
            IdentityKind::Role => match ctx.roles().first() {
                Some(role) => role.clone(),
                None => ANONYMOUS_ROLE.to_string(),
            },
        }
    }
}

impl std::fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the request, filled in by the host.
///
/// An absent `principal` means the caller is anonymous.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    forwarded_for: Option<String>,
    peer_addr: Option<String>,
    principal: Option<String>,
    roles: Vec<String>,
    bearer_token: Option<String>,
}

impl RequestContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the raw forwarded-for header value (may hold a comma list).
    pub fn with_forwarded_for(mut self, value: impl Into<String>) -> Self {
        self.forwarded_for = Some(value.into());
        self
    }

    /// Set the transport peer address.
    pub fn with_peer_addr(mut self, addr: impl Into<String>) -> Self {
        self.peer_addr = Some(addr.into());
        self
    }

    /// Set the authenticated principal's stable name.
    pub fn with_principal(mut self, name: impl Into<String>) -> Self {
        self.principal = Some(name.into());
        self
    }

    /// Append a role/authority of the authenticated identity.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Set the raw bearer credential.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Raw forwarded-for header value, if the request carried one.
    pub fn forwarded_for(&self) -> Option<&str> {
        self.forwarded_for.as_deref()
    }

    /// Transport peer address, if known.
    pub fn peer_addr(&self) -> Option<&str> {
        self.peer_addr.as_deref()
    }

    /// Authenticated principal name; `None` for anonymous callers.
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    /// Roles of the authenticated identity, in grant order.
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Raw bearer credential, if the request carried one.
    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }
}

/// First forwarded-for entry (trimmed) when present and non-empty,
/// else the peer address, else `"unknown"`.
fn client_ip(ctx: &RequestContext) -> String {
    if let Some(forwarded) = ctx.forwarded_for() {
        let first = forwarded.split(',').next().unwrap_or("").trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }
    ctx.peer_addr().unwrap_or(UNKNOWN_PEER).to_string()
}

/// Non-reversible 64-bit digest of the credential, rendered as decimal.
///
/// Not collision-resistant; good enough to avoid keying buckets on the
/// raw secret, unsuitable for anything beyond coarse throttling.
fn fingerprint(token: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    token.hash(&mut hasher);
    hasher.finish().to_string()
}
