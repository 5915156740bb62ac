//! Credential resolution: which API key a request uses for a platform.
//!
//! A user's own active key always wins over the system-wide key for the
//! platform. No key at all is not an error here; the caller decides what an
//! unconfigured platform means for its operation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::platform::Platform;

/// A user's stored key, ready to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub id: i64,
    pub api_key: String,
}

/// Per-user credential persistence.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The newest active credential for this user and platform.
    async fn find_active(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> anyhow::Result<Option<StoredCredential>>;

    /// Record that a credential was just used.
    async fn mark_used(&self, id: i64) -> anyhow::Result<()>;
}

/// Where a resolved credential comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeySource {
    User,
    System,
    None,
}

/// Diagnostic view of credential resolution for one user and platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeySourceReport {
    pub source: KeySource,
    pub has_user_key: bool,
    pub has_system_key: bool,
}

/// Chooses between a user's stored key and the system key.
#[derive(Clone, Default)]
pub struct KeyResolver {
    store: Option<Arc<dyn CredentialStore>>,
    system_keys: HashMap<Platform, String>,
}

impl KeyResolver {
    /// # Arguments
    ///
    /// * `store` - Per-user key storage; `None` means only system keys exist
    /// * `system_keys` - Process-wide keys; blank values are ignored
    pub fn new(
        store: Option<Arc<dyn CredentialStore>>,
        system_keys: HashMap<Platform, String>,
    ) -> Self {
        let system_keys = system_keys
            .into_iter()
            .filter(|(_, key)| !key.trim().is_empty())
            .collect();

        Self { store, system_keys }
    }

    pub fn has_system_key(&self, platform: Platform) -> bool {
        self.system_keys.contains_key(&platform)
    }

    /// Look up the user's key. Store failures count as "no user key".
    async fn user_credential(
        &self,
        user_id: Option<&str>,
        platform: Platform,
    ) -> Option<StoredCredential> {
        let user_id = user_id.filter(|id| !id.is_empty())?;
        let store = self.store.as_ref()?;

        match store.find_active(user_id, platform).await {
            Ok(found) => found,
            Err(e) => {
                warn!(%platform, error = %e, "Credential lookup failed, falling back to system key");
                None
            }
        }
    }

    /// Resolve the credential to use, marking a user key as used.
    pub async fn resolve(&self, user_id: Option<&str>, platform: Platform) -> Option<String> {
        if let Some(credential) = self.user_credential(user_id, platform).await {
            if let Some(store) = self.store.as_ref() {
                if let Err(e) = store.mark_used(credential.id).await {
                    warn!(%platform, error = %e, "Failed to record credential use");
                }
            }
            debug!(%platform, source = "user", "Credential resolved");
            return Some(credential.api_key);
        }

        let key = self.system_keys.get(&platform).cloned();
        if key.is_some() {
            debug!(%platform, source = "system", "Credential resolved");
        }
        key
    }

    /// Report where [`KeyResolver::resolve`] would take its key from,
    /// without side effects.
    pub async fn source(&self, user_id: Option<&str>, platform: Platform) -> KeySourceReport {
        let has_user_key = self.user_credential(user_id, platform).await.is_some();
        let has_system_key = self.has_system_key(platform);

        let source = if has_user_key {
            KeySource::User
        } else if has_system_key {
            KeySource::System
        } else {
            KeySource::None
        };

        KeySourceReport {
            source,
            has_user_key,
            has_system_key,
        }
    }
}
