//! Route classification and the gate's invocation boundary

use common::paths::{FORGOT_PASSWORD, HOME, LOGIN, SIGNUP};

/// Authorization level a path requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Reachable without a session
    Public,
    /// Login and signup: public, but signed-in users are sent to the dashboard
    AuthPage,
    /// Requires the admin role
    AdminOnly,
    /// Requires any valid session
    Protected,
}

impl RouteClass {
    /// Whether a request without a session may proceed
    pub fn allows_anonymous(self) -> bool {
        matches!(self, RouteClass::Public | RouteClass::AuthPage)
    }
}

/// Path pattern of a table row
#[derive(Debug, Clone, Copy)]
pub enum Pattern {
    Exact(&'static str),
    /// Matches the prefix itself and anything below it
    Prefix(&'static str),
}

impl Pattern {
    pub fn matches(self, path: &str) -> bool {
        match self {
            Pattern::Exact(exact) => path == exact,
            Pattern::Prefix(prefix) => match path.strip_prefix(prefix) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            },
        }
    }
}

/// Classification table, first match wins
pub const ROUTE_TABLE: &[(Pattern, RouteClass)] = &[
    (Pattern::Exact(LOGIN), RouteClass::AuthPage),
    (Pattern::Exact(SIGNUP), RouteClass::AuthPage),
    (Pattern::Exact(HOME), RouteClass::Public),
    (Pattern::Exact(FORGOT_PASSWORD), RouteClass::Public),
    (Pattern::Prefix("/auth"), RouteClass::Public),
    (Pattern::Prefix("/admin"), RouteClass::AdminOnly),
    (Pattern::Prefix("/dashboard/admin"), RouteClass::AdminOnly),
];

/// Paths that never reach the gate
pub const EXCLUDED: &[Pattern] = &[
    Pattern::Prefix("/api"),
    Pattern::Prefix("/_next/static"),
    Pattern::Prefix("/_next/image"),
    Pattern::Exact("/favicon.ico"),
    Pattern::Exact("/manifest.json"),
    Pattern::Exact("/sw.js"),
    Pattern::Prefix("/icons"),
    Pattern::Prefix("/.well-known"),
    Pattern::Prefix("/public"),
];

fn normalize(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => HOME,
        trimmed => trimmed,
    }
}

/// Classify a request path
pub fn classify(path: &str) -> RouteClass {
    let path = normalize(path);
    ROUTE_TABLE
        .iter()
        .find(|(pattern, _)| pattern.matches(path))
        .map(|(_, class)| *class)
        .unwrap_or(RouteClass::Protected)
}

/// Whether a path is outside the gate's invocation boundary
pub fn is_excluded(path: &str) -> bool {
    let path = normalize(path);
    EXCLUDED.iter().any(|pattern| pattern.matches(path))
}
