//! services/api/src/adapters/identity.rs
//!
//! A file-backed implementation of the `IdentityProvider` port. Sign-in and
//! sign-out happen on the external provider's side; this adapter only maps
//! already-issued opaque tokens to user profiles, which is all the data
//! service ever needs.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;
use studydesk_core::ports::{IdentityProvider, StoreError, StoreResult, UserProfile};

#[derive(Deserialize)]
struct TokenEntry {
    user_id: Uuid,
    display_name: String,
    email: String,
}

/// Resolves bearer tokens from a static token-to-profile map.
#[derive(Default)]
pub struct StaticIdentity {
    tokens: HashMap<String, UserProfile>,
}

impl StaticIdentity {
    /// Loads the token map from a JSON file of `{ "<token>": { "user_id",
    /// "display_name", "email" } }` entries. A missing file yields an empty
    /// map: the public sharing routes still work, authed routes all 401.
    pub fn from_file(path: &Path) -> Result<Self, ApiError> {
        if !path.exists() {
            warn!("identity token file {} not found; no tokens loaded", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let entries: HashMap<String, TokenEntry> = serde_json::from_str(&raw)
            .map_err(|e| ApiError::Internal(format!("malformed identity token file: {e}")))?;
        let tokens = entries
            .into_iter()
            .map(|(token, entry)| {
                (
                    token,
                    UserProfile {
                        id: entry.user_id,
                        display_name: entry.display_name,
                        email: entry.email,
                    },
                )
            })
            .collect();
        Ok(Self { tokens })
    }

    /// Builds a provider that knows a single token. Development and test
    /// convenience.
    pub fn with_token(token: &str, profile: UserProfile) -> Self {
        let mut tokens = HashMap::new();
        tokens.insert(token.to_string(), profile);
        Self { tokens }
    }

    /// Every distinct user the token map resolves to. The startup due-scan
    /// spawner uses this as the roster; two tokens for the same user yield
    /// one entry.
    pub fn user_ids(&self) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self.tokens.values().map(|profile| profile.id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn verify(&self, token: &str) -> StoreResult<UserProfile> {
        self.tokens.get(token).cloned().ok_or(StoreError::Unauthorized)
    }
}
