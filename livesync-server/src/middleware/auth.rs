use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument, warn};

use crate::{
    app_state::AppState,
    http::error::{ApiError, AppResult},
    middleware::request_context::RequestContext,
};

/// Rejects requests without the configured bearer token. A server without a
/// configured token accepts everyone.
#[instrument(skip_all, fields(path = %req.uri().path()))]
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<Body>,
    next: Next,
) -> AppResult<Response> {
    let Some(expected) = state.config.auth.bearer_token.as_deref() else {
        return Ok(next.run(req).await);
    };

    match extract_bearer(req.headers()) {
        Some(token) if token == expected => {
            debug!("bearer token accepted");
        }
        Some(_) => {
            warn!("rejected request with invalid bearer token");
            metrics::counter!("livesync_auth_rejections_total", "reason" => "invalid").increment(1);
            return Err(ApiError::unauthorized("invalid bearer token"));
        }
        None => {
            warn!("rejected request without bearer token");
            metrics::counter!("livesync_auth_rejections_total", "reason" => "missing").increment(1);
            return Err(ApiError::unauthorized("missing bearer token"));
        }
    }

    if let Some(context) = req.extensions_mut().get_mut::<RequestContext>() {
        context.authenticated = true;
    } else {
        req.extensions_mut().insert(RequestContext {
            request_id: String::new(),
            authenticated: true,
        });
    }

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|token| !token.is_empty())
}
