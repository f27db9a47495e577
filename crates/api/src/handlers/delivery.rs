//! Delivery of redirect decisions for requests no route claims.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use waypost_core::resolution::{Decision, InboundRequest};

use crate::state::AppState;

/// Router fallback: resolve the request against the stored rules.
///
/// Only `GET` and `HEAD` are redirected. A passthrough becomes the normal
/// JSON 404. Forwarding headers pick the client IP only when the server is
/// configured to trust its proxy.
pub async fn deliver(State(state): State<AppState>, request: Request) -> Response {
    if request.method() != Method::GET && request.method() != Method::HEAD {
        return not_found();
    }

    let url = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client_ip = client_ip(request.headers(), peer, state.config.trust_proxy_headers);

    let decision = state
        .engine()
        .resolve(&InboundRequest::new(url, client_ip))
        .await;
    decision_response(decision)
}

/// Map a decision to the HTTP response the client receives.
pub fn decision_response(decision: Decision) -> Response {
    match decision {
        Decision::Redirect {
            location,
            status,
            redirect_id,
        } => {
            let (Ok(status), Ok(location)) = (
                StatusCode::from_u16(status),
                HeaderValue::from_str(&location),
            ) else {
                tracing::warn!(redirect_id, %location, status, "Unusable redirect response");
                return not_found();
            };
            (status, [(LOCATION, location)]).into_response()
        }
        Decision::Terminal {
            status,
            redirect_id,
        } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::GONE);
            let code = match status {
                StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS => "UNAVAILABLE_FOR_LEGAL_REASONS",
                _ => "GONE",
            };
            tracing::debug!(redirect_id, status = status.as_u16(), "Terminal response");
            (
                status,
                Json(json!({
                    "error": status.canonical_reason().unwrap_or("Gone"),
                    "code": code,
                })),
            )
                .into_response()
        }
        Decision::Passthrough => not_found(),
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Not found",
            "code": "NOT_FOUND",
        })),
    )
        .into_response()
}

fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trust_proxy_headers: bool) -> Option<IpAddr> {
    if trust_proxy_headers {
        forwarded_ip(headers).or(peer)
    } else {
        peer
    }
}

/// Client address from `X-Forwarded-For` (first hop) or `X-Real-IP`.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .and_then(|ip| ip.trim().parse().ok())
        })
}
