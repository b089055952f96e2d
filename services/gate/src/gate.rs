//! Request gate decision
//!
//! One evaluation per navigation: resolve the session, classify the path and
//! either let the request through or redirect it. Cookie writes made along
//! the way are returned as a single batch.

use axum::http::{HeaderMap, Uri};
use axum_extra::extract::cookie::CookieJar;
use tracing::{error, info, warn};
use url::form_urlencoded;

use crate::{
    auth::SessionResolver,
    cookies::CookieMutations,
    routes::{RouteClass, classify},
};
use common::{
    paths::{DASHBOARD, HOME, LOGIN, REDIRECTED_FROM},
    session::Session,
};

/// Outcome of one gate evaluation
#[derive(Debug, Clone)]
pub enum GateDecision {
    /// Let the request through, with its session when one was resolved
    Pass { session: Option<Session> },
    /// Send the caller elsewhere
    Redirect { location: String },
}

impl GateDecision {
    fn redirect(location: impl Into<String>) -> Self {
        GateDecision::Redirect {
            location: location.into(),
        }
    }
}

/// Decision plus the cookie writes to mirror onto request and response
#[derive(Debug)]
pub struct GateEvaluation {
    pub decision: GateDecision,
    pub mutations: CookieMutations,
}

/// Login location remembering where the caller was going
pub fn login_redirect(path: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair(REDIRECTED_FROM, path)
        .finish();
    format!("{}?{}", LOGIN, query)
}

/// Decoded `redirectedFrom` query parameter of a request
pub fn redirected_from(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == REDIRECTED_FROM)
        .map(|(_, value)| value.into_owned())
}

/// Request gate
#[derive(Clone)]
pub struct Gate {
    resolver: SessionResolver,
    secure_cookies: bool,
}

impl Gate {
    pub fn new(resolver: SessionResolver, secure_cookies: bool) -> Self {
        Self {
            resolver,
            secure_cookies,
        }
    }

    /// Evaluate one request
    ///
    /// Never fails: every error ends in a login redirect.
    pub async fn evaluate(&self, uri: &Uri, headers: &HeaderMap) -> GateEvaluation {
        let mut mutations = CookieMutations::new(self.secure_cookies);
        let decision = self.decide(uri, headers, &mut mutations).await;
        GateEvaluation {
            decision,
            mutations,
        }
    }

    async fn decide(
        &self,
        uri: &Uri,
        headers: &HeaderMap,
        mutations: &mut CookieMutations,
    ) -> GateDecision {
        let path = uri.path();
        let class = classify(path);
        let jar = CookieJar::from_headers(headers);

        let session = match self.resolver.resolve(&jar, mutations).await {
            Ok(session) => session,
            Err(e) => {
                error!("Session verification failed on {}: {}", path, e);
                mutations.clear(self.resolver.cookies().names());
                return GateDecision::redirect(LOGIN);
            }
        };

        match session {
            None if class.allows_anonymous() => GateDecision::Pass { session: None },
            None => {
                if redirected_from(uri).as_deref() == Some(path) {
                    warn!("Redirect loop detected on {}, clearing auth cookies", path);
                    mutations.clear(self.resolver.cookies().names());
                    GateDecision::redirect(HOME)
                } else {
                    info!("No session for {}, redirecting to login", path);
                    GateDecision::redirect(login_redirect(path))
                }
            }
            Some(_) if class == RouteClass::AuthPage => GateDecision::redirect(DASHBOARD),
            Some(session) if class == RouteClass::AdminOnly && !session.is_admin() => {
                warn!(
                    "User {} with role {} denied admin path {}",
                    session.user_id, session.role, path
                );
                GateDecision::redirect(DASHBOARD)
            }
            Some(session) => GateDecision::Pass {
                session: Some(session),
            },
        }
    }
}
