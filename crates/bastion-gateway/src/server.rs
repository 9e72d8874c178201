// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router, shared handler state, and gateway settings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    middleware as axum_middleware,
    routing::{get, put},
    Router,
};
use bastion_core::{BastionError, Event, UserProfile};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::ghost::GhostRegistry;
use crate::handlers;
use crate::overflow::OverflowBuffer;
use crate::rate_limit::RateLimiter;
use crate::tracker::ComponentTracker;

/// What to do with accepted events when the stream is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowMode {
    /// Divert to the drop-oldest buffer and still acknowledge.
    #[default]
    Buffer,
    /// Answer 503 before enqueueing anything so the homeserver retries.
    Reject,
}

/// Gateway settings.
///
/// Mirrors `[appservice]` from `bastion-config` so this crate does not
/// depend on the config crate.
#[derive(Clone)]
pub struct AppServiceSettings {
    pub id: String,
    pub homeserver_url: String,
    pub server_name: String,
    pub as_token: String,
    pub hs_token: String,
    pub sender_localpart: String,
    pub listen_address: String,
    pub listen_port: u16,
    pub max_transactions_per_second: u32,
    pub event_channel_capacity: usize,
    pub overflow_capacity: usize,
    pub on_overflow: OverflowMode,
    pub shutdown_timeout: Duration,
}

impl std::fmt::Debug for AppServiceSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServiceSettings")
            .field("id", &self.id)
            .field("homeserver_url", &self.homeserver_url)
            .field("server_name", &self.server_name)
            .field("as_token", &"[redacted]")
            .field("hs_token", &"[redacted]")
            .field("sender_localpart", &self.sender_localpart)
            .field("listen_address", &self.listen_address)
            .field("listen_port", &self.listen_port)
            .field("max_transactions_per_second", &self.max_transactions_per_second)
            .field("event_channel_capacity", &self.event_channel_capacity)
            .field("overflow_capacity", &self.overflow_capacity)
            .field("on_overflow", &self.on_overflow)
            .finish()
    }
}

impl Default for AppServiceSettings {
    fn default() -> Self {
        Self {
            id: "bastion".to_string(),
            homeserver_url: String::new(),
            server_name: String::new(),
            as_token: String::new(),
            hs_token: String::new(),
            sender_localpart: "_bridge".to_string(),
            listen_address: "0.0.0.0".to_string(),
            listen_port: 9999,
            max_transactions_per_second: 100,
            event_channel_capacity: 1000,
            overflow_capacity: 100,
            on_overflow: OverflowMode::Buffer,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl AppServiceSettings {
    pub fn bridge_user_id(&self) -> String {
        format!("@{}:{}", self.sender_localpart, self.server_name)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_address, self.listen_port)
    }
}

/// Resolves `GET /users/{user_id}` probes.
#[async_trait]
pub trait UserQueryHandler: Send + Sync {
    /// `Err` means the user does not exist.
    async fn query_user(&self, user_id: &str) -> Result<UserProfile, BastionError>;
}

/// Resolves `GET /rooms/{alias}` to a room ID.
#[async_trait]
pub trait RoomQueryHandler: Send + Sync {
    async fn query_room(&self, alias: &str) -> Result<String, BastionError>;
}

/// Shared state for axum request handlers.
///
/// Each piece of mutable state carries its own lock so unrelated requests
/// do not serialize on each other.
#[derive(Clone)]
pub struct GatewayState {
    pub settings: Arc<AppServiceSettings>,
    pub events: mpsc::Sender<Event>,
    pub ghosts: Arc<GhostRegistry>,
    pub limiter: Arc<RateLimiter>,
    pub overflow: Arc<OverflowBuffer>,
    pub tracker: Arc<ComponentTracker>,
    pub bridge_user_id: Arc<str>,
    pub user_query: Option<Arc<dyn UserQueryHandler>>,
    pub room_query: Option<Arc<dyn RoomQueryHandler>>,
}

/// Build the application-service router.
///
/// - `PUT /transactions/{txn_id}` (auth)
/// - `GET /users/{user_id}` (auth)
/// - `GET /rooms/{alias}` (auth)
/// - `GET /health` (no auth)
pub fn build_router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let protocol_routes = Router::new()
        .route("/transactions/{txn_id}", put(handlers::put_transaction))
        .route("/users/{user_id}", get(handlers::get_user))
        .route("/rooms/{alias}", get(handlers::get_room))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protocol_routes)
        .layer(TraceLayer::new_for_http())
}
