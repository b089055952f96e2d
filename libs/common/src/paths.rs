//! Well-known navigation paths and auth cookie names

/// Neutral landing page, always reachable without a session
pub const HOME: &str = "/";
/// Login page
pub const LOGIN: &str = "/login";
/// Signup page
pub const SIGNUP: &str = "/signup";
/// Password recovery page
pub const FORGOT_PASSWORD: &str = "/forgot-password";
/// Dashboard shell, also used as the offline fallback page
pub const DASHBOARD: &str = "/dashboard";

/// Query parameter carrying the path a login redirect originated from
pub const REDIRECTED_FROM: &str = "redirectedFrom";

/// Names of the three auth cookies written by the auth provider for a project.
///
/// The first holds the whole session when it fits in one cookie, the other
/// two hold its chunks when it does not.
pub fn auth_cookie_names(project_ref: &str) -> [String; 3] {
    let base = auth_cookie_base(project_ref);
    [base.clone(), format!("{}.0", base), format!("{}.1", base)]
}

/// Base auth cookie name, `sb-<project-ref>-auth-token`
pub fn auth_cookie_base(project_ref: &str) -> String {
    format!("sb-{}-auth-token", project_ref)
}
