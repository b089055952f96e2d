//! Gate middleware wrapping every page navigation

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;

use crate::{
    gate::{Gate, GateDecision, GateEvaluation},
    routes::is_excluded,
};

/// Run the gate in front of the inner service
///
/// Excluded paths are forwarded untouched. Otherwise the cookie batch of the
/// evaluation is mirrored onto the inbound request before it reaches the inner
/// service, and onto the outbound response, exactly once each.
pub async fn gate_middleware(
    State(gate): State<Arc<Gate>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if is_excluded(req.uri().path()) {
        return next.run(req).await;
    }

    let GateEvaluation {
        decision,
        mutations,
    } = gate.evaluate(req.uri(), req.headers()).await;

    let mut response = match decision {
        GateDecision::Pass { session } => {
            mutations.apply_to_request(req.headers_mut());
            if let Some(session) = session {
                req.extensions_mut().insert(session);
            }
            next.run(req).await
        }
        GateDecision::Redirect { location } => Redirect::temporary(&location).into_response(),
    };

    mutations.apply_to_response(response.headers_mut());
    response
}
