// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the application-service endpoints.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bastion_core::{BastionError, Event, Transaction, UserProfile};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc::error::TrySendError;

use crate::server::{GatewayState, OverflowMode};
use crate::tracker;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Status code a gateway rejection is answered with.
pub fn status_for(err: &BastionError) -> StatusCode {
    match err {
        BastionError::AuthenticationFailure => StatusCode::UNAUTHORIZED,
        BastionError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        BastionError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        BastionError::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Render a [`BastionError`] as an [`ErrorResponse`]. Server errors do not
/// leak their details.
pub fn error_response(err: &BastionError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        return error(status, "internal error");
    }
    error(status, &err.to_string())
}

/// PUT /transactions/{txn_id}
///
/// Authentication already ran as middleware. Order from here: rate limit,
/// decode, echo filter, hand-off.
pub async fn put_transaction(
    State(state): State<GatewayState>,
    Path(txn_id): Path<String>,
    body: Bytes,
) -> Response {
    if !state.limiter.try_acquire() {
        state.tracker.record(tracker::RATE_LIMITED);
        tracing::warn!(txn_id = %txn_id, limit = state.limiter.limit(), "transaction rate limited");
        return error_response(&BastionError::RateLimited {
            limit: state.limiter.limit(),
        });
    }

    let txn: Transaction = match serde_json::from_slice(&body) {
        Ok(txn) => txn,
        Err(e) => {
            state.tracker.record(tracker::PARSE_ERROR);
            tracing::warn!(txn_id = %txn_id, error = %e, "malformed transaction body");
            return error_response(&BastionError::MalformedPayload(e.to_string()));
        }
    };
    state.tracker.record(tracker::TRANSACTION);

    let total = txn.events.len();
    let accepted: Vec<Event> = txn
        .events
        .into_iter()
        .filter(|event| !is_self_originated(&state, &event.sender))
        .collect();
    let dropped = total - accepted.len();
    state
        .tracker
        .record_n(tracker::EVENT_DROPPED_GHOST, dropped as u64);

    if state.settings.on_overflow == OverflowMode::Reject && !accepted.is_empty() {
        // All-or-nothing: reserve every slot before sending any event.
        let permits = match state.events.try_reserve_many(accepted.len()) {
            Ok(permits) => permits,
            Err(e) => {
                state.tracker.record(tracker::OVERFLOW_REJECTED);
                tracing::warn!(
                    txn_id = %txn_id,
                    events = accepted.len(),
                    available = state.events.capacity(),
                    error = %e,
                    "event stream full, asking homeserver to retry"
                );
                return error(StatusCode::SERVICE_UNAVAILABLE, "event stream full");
            }
        };
        for (permit, event) in permits.zip(accepted) {
            state.tracker.record(tracker::EVENT_RECEIVED);
            permit.send(event);
        }
    } else {
        for event in accepted {
            state.tracker.record(tracker::EVENT_RECEIVED);
            match state.events.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) | Err(TrySendError::Closed(event)) => {
                    tracing::warn!(event_id = %event.event_id, "event stream full, buffering");
                    state.tracker.record(tracker::EVENT_OVERFLOW);
                    if let Some(evicted) = state.overflow.push(event) {
                        tracing::warn!(event_id = %evicted.event_id, "overflow buffer full, dropped oldest event");
                    }
                }
            }
        }
    }

    tracing::debug!(txn_id = %txn_id, total, dropped, "transaction processed");
    Json(json!({ "status": "ok" })).into_response()
}

/// Events sent by our own ghosts or the bridge bot come back as echoes.
fn is_self_originated(state: &GatewayState, sender: &str) -> bool {
    sender == &*state.bridge_user_id || state.ghosts.contains(sender)
}

/// GET /users/{user_id}
pub async fn get_user(
    State(state): State<GatewayState>,
    Path(user_id): Path<String>,
) -> Response {
    match &state.user_query {
        Some(handler) => match handler.query_user(&user_id).await {
            Ok(profile) => Json(profile).into_response(),
            Err(e) => {
                tracing::debug!(user_id = %user_id, error = %e, "user query miss");
                error(StatusCode::NOT_FOUND, "user not found")
            }
        },
        None => Json(UserProfile::default()).into_response(),
    }
}

/// GET /rooms/{alias}
pub async fn get_room(State(state): State<GatewayState>, Path(alias): Path<String>) -> Response {
    let Some(handler) = &state.room_query else {
        return error(StatusCode::NOT_FOUND, "room not found");
    };
    match handler.query_room(&alias).await {
        Ok(room_id) => Json(json!({ "room_id": room_id })).into_response(),
        Err(e) => {
            tracing::debug!(alias = %alias, error = %e, "room query miss");
            error(StatusCode::NOT_FOUND, "room not found")
        }
    }
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Response {
    Json(json!({ "status": "healthy", "id": state.settings.id })).into_response()
}
