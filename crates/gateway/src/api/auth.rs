//! Request-entry gates.
//!
//! Order on the budgeted routes is admission first, then credentials:
//! [`admit_handshake`] / [`admit_execute`] run as route layers and refuse
//! excess traffic by client address before any signature is checked; the
//! [`Caller`] extractor then verifies the bearer credential.
//!
//! The client address is the socket peer. With
//! `server.trust_proxy_headers` set, `X-Forwarded-For` (first hop) and then
//! `X-Real-IP` take precedence.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use cr_domain::error::Error;

use crate::api::error::ApiError;
use crate::audit::{AuditAction, AuditEntry};
use crate::credentials::Claims;
use crate::runtime::admission::{Decision, Endpoint};
use crate::runtime::broker::RequestMeta;
use crate::state::AppState;

// ── Client address ────────────────────────────────────────────────────

pub fn client_ip(headers: &HeaderMap, extensions: &Extensions, trust_proxy: bool) -> String {
    if trust_proxy {
        if let Some(ip) = forwarded_ip(headers) {
            return ip;
        }
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".into())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    };
    header("x-forwarded-for").or_else(|| header("x-real-ip"))
}

pub(crate) fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

// ── Admission middleware ──────────────────────────────────────────────

async fn admit(state: AppState, endpoint: Endpoint, req: Request<Body>, next: Next) -> Response {
    let ip = client_ip(
        req.headers(),
        req.extensions(),
        state.config.server.trust_proxy_headers,
    );

    match state.admission.check(&ip, endpoint) {
        Decision::Allowed { .. } => next.run(req).await,
        Decision::Refused { retry_after } => {
            state.audit.record(
                AuditEntry::new(AuditAction::RateLimited, &ip, false)
                    .detail(endpoint.as_str())
                    .request(&request_id(req.headers()), &ip),
            );
            ApiError::from(Error::RateLimited {
                endpoint: endpoint.as_str().into(),
                retry_after_secs: retry_after.as_secs(),
            })
            .into_response()
        }
    }
}

pub async fn admit_handshake(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    admit(state, Endpoint::Handshake, req, next).await
}

pub async fn admit_execute(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    admit(state, Endpoint::Execute, req, next).await
}

// ── Extractors ────────────────────────────────────────────────────────

/// Verified bearer credential of the caller.
pub struct Caller(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("missing bearer credential"))?;
        let claims = state.tokens.verify(token)?;
        Ok(Caller(claims))
    }
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Request ID (from `X-Request-Id` or freshly generated) and client address.
pub struct Meta(pub RequestMeta);

#[async_trait]
impl FromRequestParts<AppState> for Meta {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Meta(RequestMeta {
            request_id: request_id(&parts.headers),
            client_ip: client_ip(
                &parts.headers,
                &parts.extensions,
                state.config.server.trust_proxy_headers,
            ),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_static(v));
        }
        h
    }

    fn peer() -> Extensions {
        let mut ext = Extensions::new();
        ext.insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 5555))));
        ext
    }

    #[test]
    fn forwarded_for_wins_behind_trusted_proxy() {
        let h = headers(&[
            ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(client_ip(&h, &peer(), true), "203.0.113.7");
    }

    #[test]
    fn real_ip_then_peer_behind_trusted_proxy() {
        let h = headers(&[("x-real-ip", "198.51.100.2")]);
        assert_eq!(client_ip(&h, &peer(), true), "198.51.100.2");
        assert_eq!(client_ip(&HeaderMap::new(), &peer(), true), "192.0.2.1");
        assert_eq!(
            client_ip(&HeaderMap::new(), &Extensions::new(), true),
            "unknown"
        );
    }

    #[test]
    fn proxy_headers_ignored_by_default() {
        let h = headers(&[
            ("x-forwarded-for", "203.0.113.7"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(client_ip(&h, &peer(), false), "192.0.2.1");
        assert_eq!(client_ip(&h, &Extensions::new(), false), "unknown");
    }

    #[test]
    fn bearer_requires_prefix() {
        assert_eq!(bearer(&headers(&[("authorization", "Bearer abc")])), Some("abc"));
        assert_eq!(bearer(&headers(&[("authorization", "Basic abc")])), None);
        assert_eq!(bearer(&headers(&[("authorization", "Bearer ")])), None);
        assert_eq!(bearer(&HeaderMap::new()), None);
    }
}
