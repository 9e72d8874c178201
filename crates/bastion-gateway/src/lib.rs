// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Protocol gateway: the homeserver's application-service push endpoint.
//!
//! [`AppService`] runs an axum server as a background task. Handlers
//! authenticate and rate-limit each transaction, drop echoes of our own
//! ghosts, and push the remaining events onto a bounded stream read through
//! [`AppService::next_event`]. When the stream is full, events go to a small
//! drop-oldest overflow buffer instead of blocking the handler.

pub mod auth;
pub mod ghost;
pub mod handlers;
pub mod overflow;
pub mod rate_limit;
pub mod server;
pub mod tracker;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use axum::Router;
use bastion_core::{BastionError, CommunicationPolicy, Event, UserProfile};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub use ghost::{sanitize_external_id, GhostRegistry, GhostUser};
pub use server::{
    AppServiceSettings, GatewayState, OverflowMode, RoomQueryHandler, UserQueryHandler,
};

use crate::overflow::OverflowBuffer;
use crate::rate_limit::RateLimiter;
use crate::tracker::ComponentTracker;

/// Transport name checked against the communication policy before binding.
const TCP_TRANSPORT: &str = "tcp";

/// Runtime statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayStats {
    pub id: String,
    pub homeserver: String,
    pub ghost_users: usize,
    pub event_buffer: usize,
    pub events_processed: u64,
    pub auth_failures: u64,
    pub rate_limited: u64,
    pub parse_errors: u64,
}

struct RunningServer {
    cancel: CancellationToken,
    handle: JoinHandle<std::io::Result<()>>,
}

pub struct AppService {
    settings: Arc<AppServiceSettings>,
    ghosts: Arc<GhostRegistry>,
    limiter: Arc<RateLimiter>,
    overflow: Arc<OverflowBuffer>,
    tracker: Arc<ComponentTracker>,
    user_query: Option<Arc<dyn UserQueryHandler>>,
    room_query: Option<Arc<dyn RoomQueryHandler>>,
    policy: Option<Arc<dyn CommunicationPolicy>>,
    events_tx: StdMutex<Option<mpsc::Sender<Event>>>,
    events_rx: Mutex<mpsc::Receiver<Event>>,
    server: Mutex<Option<RunningServer>>,
}

impl AppService {
    /// Create a gateway. Fails if the homeserver URL or either token is empty.
    pub fn new(settings: AppServiceSettings) -> Result<Self, BastionError> {
        if settings.homeserver_url.is_empty() {
            return Err(BastionError::Config("homeserver_url is required".into()));
        }
        if settings.as_token.is_empty() || settings.hs_token.is_empty() {
            return Err(BastionError::Config(
                "as_token and hs_token are required".into(),
            ));
        }

        let (events_tx, events_rx) = mpsc::channel(settings.event_channel_capacity.max(1));
        Ok(Self {
            ghosts: Arc::new(GhostRegistry::new(settings.server_name.clone())),
            limiter: Arc::new(RateLimiter::per_second(
                settings.max_transactions_per_second,
            )),
            overflow: Arc::new(OverflowBuffer::new(settings.overflow_capacity)),
            tracker: Arc::new(ComponentTracker::new("appservice")),
            settings: Arc::new(settings),
            user_query: None,
            room_query: None,
            policy: None,
            events_tx: StdMutex::new(Some(events_tx)),
            events_rx: Mutex::new(events_rx),
            server: Mutex::new(None),
        })
    }

    /// Refuse to bind TCP unless `policy` allows it.
    pub fn with_policy(mut self, policy: Arc<dyn CommunicationPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_user_query(mut self, handler: Arc<dyn UserQueryHandler>) -> Self {
        self.user_query = Some(handler);
        self
    }

    pub fn with_room_query(mut self, handler: Arc<dyn RoomQueryHandler>) -> Self {
        self.room_query = Some(handler);
        self
    }

    pub fn settings(&self) -> &AppServiceSettings {
        &self.settings
    }

    fn state(&self) -> GatewayState {
        // After stop() the stream is closed; a sender whose receiver is gone
        // makes handlers divert to the overflow buffer.
        let events = self
            .events_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| mpsc::channel(1).0);
        GatewayState {
            settings: Arc::clone(&self.settings),
            events,
            ghosts: Arc::clone(&self.ghosts),
            limiter: Arc::clone(&self.limiter),
            overflow: Arc::clone(&self.overflow),
            tracker: Arc::clone(&self.tracker),
            bridge_user_id: self.settings.bridge_user_id().into(),
            user_query: self.user_query.clone(),
            room_query: self.room_query.clone(),
        }
    }

    /// The router, for serving on a custom listener or driving in tests.
    pub fn router(&self) -> Router {
        server::build_router(self.state())
    }

    /// Bind the listen address and serve in the background.
    ///
    /// A bind failure is returned as [`BastionError::Bind`]; it is the only
    /// fatal error this component produces.
    pub async fn start(&self) -> Result<SocketAddr, BastionError> {
        let mut server = self.server.lock().await;
        if server.is_some() {
            return Err(BastionError::Internal("appservice already started".into()));
        }
        if let Some(policy) = &self.policy {
            if !policy.is_communication_allowed(TCP_TRANSPORT) {
                return Err(BastionError::TransportDenied(TCP_TRANSPORT.into()));
            }
        }

        let addr = self.settings.listen_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| BastionError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let span = tracing::info_span!("appservice", component = "appservice", id = %self.settings.id);
        let serve = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await });
        let handle = tokio::spawn(async move { serve.await }.instrument(span));

        tracing::info!(
            address = %local_addr,
            homeserver = %self.settings.homeserver_url,
            "appservice listening"
        );
        *server = Some(RunningServer { cancel, handle });
        Ok(local_addr)
    }

    /// Stop serving and close the event stream.
    ///
    /// In-flight requests get up to `shutdown_timeout` to finish. The stream
    /// is closed only after the server task has exited, so no handler can
    /// still be sending into it.
    pub async fn stop(&self) -> Result<(), BastionError> {
        tracing::info!("stopping appservice");
        let running = self.server.lock().await.take();
        let mut result = Ok(());

        if let Some(RunningServer { cancel, mut handle }) = running {
            cancel.cancel();
            match tokio::time::timeout(self.settings.shutdown_timeout, &mut handle).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => {
                    tracing::error!(error = %e, "appservice server error");
                    result = Err(BastionError::Io(e));
                }
                Ok(Err(e)) => {
                    result = Err(BastionError::Internal(format!("server task failed: {e}")));
                }
                Err(_) => {
                    tracing::warn!(
                        timeout = ?self.settings.shutdown_timeout,
                        "graceful shutdown timed out, aborting server task"
                    );
                    handle.abort();
                    let _ = handle.await;
                    result = Err(BastionError::Timeout {
                        duration: self.settings.shutdown_timeout,
                    });
                }
            }
        }

        self.events_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        result
    }

    /// Next event from the stream; `None` once stopped and drained.
    pub async fn next_event(&self) -> Option<Event> {
        self.events_rx.lock().await.recv().await
    }

    pub fn ghosts(&self) -> &GhostRegistry {
        &self.ghosts
    }

    pub fn register_ghost_user(
        &self,
        platform: &str,
        external_id: &str,
        profile: UserProfile,
    ) -> Result<GhostUser, BastionError> {
        self.ghosts.register(platform, external_id, profile)
    }

    pub fn get_ghost_user(&self, user_id: &str) -> Option<GhostUser> {
        self.ghosts.get(user_id)
    }

    pub fn get_ghost_user_by_external(
        &self,
        platform: &str,
        external_id: &str,
    ) -> Option<GhostUser> {
        self.ghosts.get_by_external(platform, external_id)
    }

    pub fn generate_ghost_user_id(&self, platform: &str, external_id: &str) -> String {
        self.ghosts.user_id_for(platform, external_id)
    }

    /// The bridge bot's own user ID.
    pub fn bridge_user_id(&self) -> String {
        self.settings.bridge_user_id()
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            id: self.settings.id.clone(),
            homeserver: self.settings.homeserver_url.clone(),
            ghost_users: self.ghosts.len(),
            event_buffer: self.overflow.len(),
            events_processed: self.tracker.count(tracker::EVENT_RECEIVED),
            auth_failures: self.tracker.count(tracker::AUTH_FAILED),
            rate_limited: self.tracker.count(tracker::RATE_LIMITED),
            parse_errors: self.tracker.count(tracker::PARSE_ERROR),
        }
    }

    pub fn tracker(&self) -> &ComponentTracker {
        &self.tracker
    }

    /// Copy of the overflow buffer, oldest first.
    pub fn recent_overflow(&self) -> Vec<Event> {
        self.overflow.snapshot()
    }

    /// Take everything out of the overflow buffer, oldest first.
    pub fn drain_overflow(&self) -> Vec<Event> {
        self.overflow.drain()
    }
}
