use super::service::RateLimiter;
use super::types::{ChainPolicy, LimitDecision, RateLimitExceeded, WindowState};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::debug;

/// Message carried by the default rejection
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded.";

/// Default rejection handler: flags the request and answers 429
pub fn default_on_rate_limited(request: &mut Request, state: &WindowState) -> Response {
    request.extensions_mut().insert(RateLimitExceeded {
        message: RATE_LIMIT_MESSAGE.to_string(),
        state: *state,
    });

    let body = serde_json::json!({
        "error": RATE_LIMIT_MESSAGE,
        "status": 429,
    });

    (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
}

/// Axum middleware function for rate limiting
///
/// Use with `axum::middleware::from_fn_with_state(limiter, rate_limit_middleware)`.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let decision = limiter.limit(&parts).await;
    let mut request = Request::from_parts(parts, body);

    match decision {
        LimitDecision::Bypass(_) | LimitDecision::FailOpen => next.run(request).await,
        LimitDecision::Allowed { headers, .. } => {
            let mut response = next.run(request).await;
            if let Some(headers) = headers {
                headers.apply(response.headers_mut());
            }
            response
        }
        LimitDecision::Rejected {
            key,
            state,
            headers,
        } => {
            let options = limiter.options();
            let mut response = match &options.on_rate_limited {
                Some(handler) => handler(&mut request, &state),
                None => default_on_rate_limited(&mut request, &state),
            };

            if let Some(headers) = headers {
                headers.apply(response.headers_mut());
            }

            if options.chain_policy == ChainPolicy::AlwaysAdvance {
                debug!("Advancing chain after rejection for key {}", key);
                // The rejection was produced first and is what the caller receives
                let _ = next.run(request).await;
            }

            response
        }
    }
}
