// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Bastion bridge.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// The primary error type used across the gateway, plugin manager, and lockdown machine.
#[derive(Debug, Error)]
pub enum BastionError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The presented homeserver token did not match the configured secret.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// More transactions arrived in the current window than the configured limit.
    #[error("rate limited: more than {limit} transactions per second")]
    RateLimited { limit: u32 },

    /// An inbound payload could not be decoded.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A ghost user with this identity is already registered.
    #[error("ghost user {0} already registered")]
    GhostUserExists(String),

    /// A plugin record already exists for the given name or library path.
    #[error("plugin already loaded: {0}")]
    PluginAlreadyLoaded(String),

    /// No plugin record exists under the given name.
    #[error("plugin not found: {0}")]
    PluginNotFound(String),

    /// The plugin was built against a different plugin API version.
    #[error("plugin API version mismatch: plugin={plugin}, bridge={bridge}")]
    PluginVersionMismatch { plugin: String, bridge: String },

    /// The plugin library (or executable) does not exist on disk.
    #[error("plugin library not found: {}", path.display())]
    PluginLibraryMissing { path: PathBuf },

    /// The plugin does not export the well-known entry point or it has the wrong shape.
    #[error("plugin {} does not satisfy the plugin contract: {reason}", path.display())]
    PluginSymbolInvalid { path: PathBuf, reason: String },

    /// A metadata descriptor could not be read or is missing required fields.
    #[error("invalid plugin metadata {}: {message}", path.display())]
    InvalidMetadata { path: PathBuf, message: String },

    /// An operation was attempted in a state that does not permit it.
    #[error("plugin {name} cannot {operation}: current state={state}")]
    PluginStatePrecondition {
        name: String,
        operation: &'static str,
        state: String,
    },

    /// The plugin does not implement the adapter extension.
    #[error("plugin is not an adapter plugin: {0}")]
    NotAdapterPlugin(String),

    /// A plugin lifecycle hook reported a failure.
    #[error("plugin {name} failed to {operation}: {message}")]
    Plugin {
        name: String,
        operation: &'static str,
        message: String,
    },

    /// The lockdown graph has no edge between the two modes.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// One or more prerequisites are unmet; every unmet item is listed.
    #[error("not ready: {}", .0.join(", "))]
    AggregatedValidationFailure(Vec<String>),

    /// Ownership has already been claimed by an administrator.
    #[error("administrator already established")]
    AdminAlreadyEstablished,

    /// The operation requires an established administrator.
    #[error("no administrator established")]
    AdminNotEstablished,

    /// The current security posture does not permit this transport.
    #[error("communication over {0} is not permitted in the current lockdown mode")]
    TransportDenied(String),

    /// A classified failure crossing the adapter boundary.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// The listener could not be bound. This is the only fatal startup error.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Filesystem or process I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Classification of failures reported by platform adapters.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    RateLimited,
    AuthFailed,
    InvalidTarget,
    #[strum(serialize = "network_error")]
    #[serde(rename = "network_error")]
    Network,
    Timeout,
    CircuitOpen,
    #[strum(serialize = "validation_error")]
    #[serde(rename = "validation_error")]
    Validation,
    #[strum(serialize = "platform_error")]
    #[serde(rename = "platform_error")]
    Platform,
}

impl ErrorCode {
    /// Whether failures of this class are worth retrying by default.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimited | ErrorCode::Network | ErrorCode::Timeout | ErrorCode::CircuitOpen
        )
    }

    /// Suggested backoff before retrying, `None` for non-retryable classes.
    pub fn default_retry_after(self) -> Option<Duration> {
        match self {
            ErrorCode::RateLimited => Some(Duration::from_secs(30)),
            ErrorCode::CircuitOpen => Some(Duration::from_secs(60)),
            ErrorCode::Network => Some(Duration::from_secs(5)),
            ErrorCode::Timeout => Some(Duration::from_secs(10)),
            _ => None,
        }
    }
}

/// A failure crossing the adapter boundary, tagged retryable or permanent.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct AdapterError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
    #[serde(default)]
    pub retry_after: Option<Duration>,
    pub permanent: bool,
}

impl AdapterError {
    /// Create an error; `permanent` is always the inverse of `retryable`.
    pub fn new(code: ErrorCode, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code,
            message: message.into(),
            retryable,
            retry_after: if retryable { code.default_retry_after() } else { None },
            permanent: !retryable,
        }
    }

    /// Create an error using the code's default retry classification.
    pub fn classified(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message, code.is_retryable())
    }

    /// Override the suggested backoff.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn adapter_error_permanent_is_inverse_of_retryable() {
        let err = AdapterError::new(ErrorCode::InvalidTarget, "no such channel", false);
        assert!(err.permanent);
        assert!(!err.retryable);
        assert!(err.retry_after.is_none());

        let err = AdapterError::new(ErrorCode::RateLimited, "slow down", true);
        assert!(!err.permanent);
        assert_eq!(err.retry_after, Some(Duration::from_secs(30)));
    }

    #[test]
    fn adapter_error_display_includes_code() {
        let err = AdapterError::classified(ErrorCode::Network, "connection reset");
        assert_eq!(err.to_string(), "[network_error] connection reset");
        assert!(err.retryable);
    }

    #[test]
    fn error_code_wire_names() {
        let json = serde_json::to_string(&ErrorCode::Validation).unwrap();
        assert_eq!(json, "\"validation_error\"");
        assert_eq!(
            ErrorCode::from_str("circuit_open").unwrap(),
            ErrorCode::CircuitOpen
        );
    }

    #[test]
    fn aggregated_validation_lists_every_item() {
        let err = BastionError::AggregatedValidationFailure(vec![
            "admin not established".into(),
            "hardening not complete".into(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("admin not established"));
        assert!(msg.contains("hardening not complete"));
    }

    #[test]
    fn adapter_error_converts_into_bastion_error() {
        let err: BastionError = AdapterError::classified(ErrorCode::Timeout, "slow").into();
        assert!(matches!(err, BastionError::Adapter(ref e) if e.code == ErrorCode::Timeout));
    }
}
