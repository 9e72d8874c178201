// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Homeserver token authentication.
//!
//! If an `Authorization` header is present it is the only credential
//! considered (`Bearer ` prefix optional). Otherwise the `access_token`
//! query parameter is used. Comparison is constant-time. An empty configured
//! token rejects everything.

use axum::{
    extract::{Query, Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use bastion_core::BastionError;
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::handlers::error_response;
use crate::server::GatewayState;
use crate::tracker;

#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

/// Extract the credential the request presents, if any.
pub(crate) fn presented_token(request: &Request) -> Option<String> {
    if let Some(header) = request.headers().get(AUTHORIZATION) {
        let value = header.to_str().ok()?;
        return Some(value.strip_prefix("Bearer ").unwrap_or(value).to_string());
    }
    Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(q)| q.access_token)
}

pub(crate) fn token_matches(expected: &str, presented: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

/// Rejects requests that do not carry the configured homeserver token.
pub async fn auth_middleware(
    State(state): State<GatewayState>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = presented_token(&request)
        .is_some_and(|token| token_matches(&state.settings.hs_token, &token));

    if !authorized {
        state.tracker.record(tracker::AUTH_FAILED);
        tracing::warn!(path = %request.uri().path(), "rejected request with invalid homeserver token");
        return error_response(&BastionError::AuthenticationFailure);
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(uri: &str, auth: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn bearer_header_is_stripped() {
        let req = request("/transactions/1", Some("Bearer hs-secret"));
        assert_eq!(presented_token(&req).as_deref(), Some("hs-secret"));
    }

    #[test]
    fn query_parameter_is_used_without_header() {
        let req = request("/transactions/1?access_token=hs-secret", None);
        assert_eq!(presented_token(&req).as_deref(), Some("hs-secret"));
    }

    #[test]
    fn header_wins_over_query() {
        let req = request("/transactions/1?access_token=hs-secret", Some("Bearer wrong"));
        assert_eq!(presented_token(&req).as_deref(), Some("wrong"));
    }

    #[test]
    fn no_credential_is_none() {
        assert!(presented_token(&request("/users/@a:b", None)).is_none());
    }

    #[test]
    fn comparison_rejects_prefixes_and_empty_secret() {
        assert!(token_matches("hs-secret", "hs-secret"));
        assert!(!token_matches("hs-secret", "hs-secre"));
        assert!(!token_matches("hs-secret", "hs-secret-and-more"));
        assert!(!token_matches("", ""));
    }
}
