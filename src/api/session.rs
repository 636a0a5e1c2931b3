//! Signed-in user lookup.

use axum::http::{HeaderMap, HeaderName};

/// Resolves the signed-in user for a request.
pub trait SessionProvider: Send + Sync {
    /// Email of the signed-in user, or `None` for anonymous requests.
    fn current_user(&self, headers: &HeaderMap) -> Option<String>;
}

/// Trusts a header set by the authenticating proxy in front of the service.
pub struct TrustedHeaderSession {
    header: HeaderName,
}

impl TrustedHeaderSession {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }
}

impl SessionProvider for TrustedHeaderSession {
    fn current_user(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|email| !email.is_empty())
            .map(str::to_string)
    }
}
