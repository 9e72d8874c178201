// SPDX-FileCopyrightText: 2026 Bastion Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ghost users: homeserver identities standing in for external platform users.
//!
//! IDs are derived, never assigned, so `(platform, external_id)` always maps
//! to the same `@platform_sanitized:server` string. The registry keeps an
//! index on both keys and refuses to overwrite an existing entry.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use bastion_core::{BastionError, UserProfile};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GhostUser {
    pub user_id: String,
    pub platform: String,
    pub external_id: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Map every character outside `[A-Za-z0-9_-]` to `_`.
pub fn sanitize_external_id(external_id: &str) -> String {
    external_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// `@{platform}_{sanitized external id}:{server_name}`.
pub fn ghost_user_id(platform: &str, external_id: &str, server_name: &str) -> String {
    format!(
        "@{platform}_{}:{server_name}",
        sanitize_external_id(external_id)
    )
}

#[derive(Debug, Default)]
struct Index {
    by_user_id: HashMap<String, GhostUser>,
    by_external: HashMap<(String, String), String>,
}

#[derive(Debug)]
pub struct GhostRegistry {
    server_name: String,
    index: RwLock<Index>,
}

impl GhostRegistry {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            index: RwLock::new(Index::default()),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn user_id_for(&self, platform: &str, external_id: &str) -> String {
        ghost_user_id(platform, external_id, &self.server_name)
    }

    /// Register a ghost for `(platform, external_id)`.
    ///
    /// Fails with [`BastionError::GhostUserExists`] if either the derived
    /// user ID or the external pair is already present.
    pub fn register(
        &self,
        platform: &str,
        external_id: &str,
        profile: UserProfile,
    ) -> Result<GhostUser, BastionError> {
        if platform.is_empty() || external_id.is_empty() {
            return Err(BastionError::Internal(
                "ghost users need a platform and an external id".into(),
            ));
        }
        let user_id = self.user_id_for(platform, external_id);
        let external_key = (platform.to_string(), external_id.to_string());

        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        if index.by_user_id.contains_key(&user_id) || index.by_external.contains_key(&external_key)
        {
            return Err(BastionError::GhostUserExists(user_id));
        }

        let now = Utc::now();
        let ghost = GhostUser {
            user_id: user_id.clone(),
            platform: platform.to_string(),
            external_id: external_id.to_string(),
            display_name: profile.display_name,
            avatar_url: profile.avatar_url,
            created_at: now,
            last_active: now,
        };
        index.by_external.insert(external_key, user_id.clone());
        index.by_user_id.insert(user_id, ghost.clone());

        info!(user_id = %ghost.user_id, platform, external_id, "ghost user registered");
        Ok(ghost)
    }

    /// Look up by homeserver ID, refreshing `last_active`.
    pub fn get(&self, user_id: &str) -> Option<GhostUser> {
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        let ghost = index.by_user_id.get_mut(user_id)?;
        ghost.last_active = Utc::now();
        Some(ghost.clone())
    }

    /// Look up by platform identity, refreshing `last_active`.
    pub fn get_by_external(&self, platform: &str, external_id: &str) -> Option<GhostUser> {
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        let user_id = index
            .by_external
            .get(&(platform.to_string(), external_id.to_string()))?
            .clone();
        let ghost = index.by_user_id.get_mut(&user_id)?;
        ghost.last_active = Utc::now();
        Some(ghost.clone())
    }

    /// Membership test used by the echo filter; does not touch `last_active`.
    pub fn contains(&self, user_id: &str) -> bool {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_user_id
            .contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_user_id
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
