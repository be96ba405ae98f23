//! User profile directory
//!
//! Profiles are keyed by the identity provider's subject id (`external_uid`).
//! A profile is provisioned automatically the first time a verified identity
//! makes an authenticated request; the role chosen at that moment sticks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use civic_common::text::clamp_opt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::identity::VerifiedIdentity;
use crate::persistence::{encode_records, load_records, save_json, BlobStore, DirtyFlag, Flush, USERS_KEY};

pub const MAX_NAME_CHARS: usize = 100;
pub const MIN_NAME_CHARS: usize = 2;
pub const MAX_EMAIL_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    #[default]
    #[serde(other)]
    Citizen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub external_uid: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

/// Body of `POST /api/user/profile`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Accepted for client compatibility and ignored
    #[serde(default)]
    pub role: Option<String>,
}

fn fallback_name(identity: &VerifiedIdentity) -> String {
    identity
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .or_else(|| {
            identity
                .email
                .as_deref()
                .and_then(|e| e.split('@').next())
                .filter(|local| !local.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "User".to_string())
}

pub struct UserStore {
    users: RwLock<HashMap<String, User>>,
    blob: Arc<dyn BlobStore>,
    dirty: DirtyFlag,
    unreadable: Vec<serde_json::Value>,
}

impl UserStore {
    /// Load persisted profiles (empty on first boot)
    pub async fn load(blob: Arc<dyn BlobStore>) -> Result<Self> {
        let decoded = load_records::<User>(blob.as_ref(), USERS_KEY).await?;
        info!(
            records = decoded.records.len(),
            unreadable = decoded.skipped.len(),
            "Loaded user profiles"
        );
        let users = decoded
            .records
            .into_iter()
            .map(|user| (user.external_uid.clone(), user))
            .collect();
        Ok(Self {
            users: RwLock::new(users),
            blob,
            dirty: DirtyFlag::new(),
            unreadable: decoded.skipped,
        })
    }

    pub fn dirty_flag(&self) -> DirtyFlag {
        self.dirty.clone()
    }

    pub async fn get_by_uid(&self, external_uid: &str) -> Option<User> {
        self.users.read().await.get(external_uid).cloned()
    }

    /// Existing profile for the identity, or a freshly provisioned one
    pub async fn get_or_provision(&self, identity: &VerifiedIdentity) -> User {
        if let Some(user) = self.get_by_uid(&identity.uid).await {
            return user;
        }

        let mut users = self.users.write().await;
        if let Some(user) = users.get(&identity.uid) {
            return user.clone();
        }

        let now = Utc::now();
        let user = User {
            id: format!("user_{}", Uuid::new_v4().simple()),
            external_uid: identity.uid.clone(),
            name: clamp_opt(Some(&fallback_name(identity)), MAX_NAME_CHARS),
            email: clamp_opt(identity.email.as_deref(), MAX_EMAIL_CHARS).to_lowercase(),
            role: identity.role_hint,
            created_at: now,
            last_login: now,
        };
        info!(user_id = %user.id, role = ?user.role, "Provisioned user profile");
        users.insert(identity.uid.clone(), user.clone());
        drop(users);

        self.dirty.mark();
        user
    }

    /// Create or update the caller's profile.
    ///
    /// The role is never changed here; it comes from provisioning.
    pub async fn upsert_profile(&self, identity: &VerifiedIdentity, input: ProfileInput) -> Result<User> {
        let name = clamp_opt(
            input.name.as_deref().or(identity.name.as_deref()),
            MAX_NAME_CHARS,
        );
        if name.chars().count() < MIN_NAME_CHARS {
            return Err(Error::Validation(format!(
                "Name must be at least {} characters",
                MIN_NAME_CHARS
            )));
        }

        let email = clamp_opt(
            input.email.as_deref().or(identity.email.as_deref()),
            MAX_EMAIL_CHARS,
        )
        .to_lowercase();
        if !email.contains('@') {
            return Err(Error::Validation("Valid email required".to_string()));
        }

        if let Some(role) = input.role.as_deref() {
            debug!(uid = %identity.uid, role, "Ignoring role in profile update");
        }

        let provisioned = self.get_or_provision(identity).await;

        let mut users = self.users.write().await;
        let user = users
            .entry(identity.uid.clone())
            .or_insert(provisioned);
        user.name = name;
        user.email = email;
        user.last_login = Utc::now();
        let updated = user.clone();
        drop(users);

        info!(user_id = %updated.id, "Profile updated");
        self.dirty.mark();
        Ok(updated)
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl Flush for UserStore {
    fn collection(&self) -> &'static str {
        USERS_KEY
    }

    async fn flush(&self) -> civic_common::Result<()> {
        let mut snapshot: Vec<User> = self.users.read().await.values().cloned().collect();
        snapshot.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        let values = encode_records(&snapshot, &self.unreadable)?;
        save_json(self.blob.as_ref(), USERS_KEY, &values).await
    }
}
