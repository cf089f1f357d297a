//! Provider API key storage.
//!
//! Keys are saved per provider name (`gemini`, `mistral`) and handed to the
//! engine that needs them. Logs mention the provider, never the key.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};

use crate::db::key_repo::{self, ProviderKeyRow};
use crate::db::{format_timestamp, Database};
use crate::error::{JobError, Result};
use crate::secrets::KeyCipher;

/// Storage for provider API keys.
pub trait CredentialStore: Send + Sync {
    fn save_provider_key(&self, provider: &str, key: &SecretString) -> Result<()>;

    fn get_provider_key(&self, provider: &str) -> Result<Option<SecretString>>;

    /// Returns whether a key was removed.
    fn delete_provider_key(&self, provider: &str) -> Result<bool>;

    /// Providers with a stored key, alphabetically.
    fn providers(&self) -> Result<Vec<String>>;
}

/// Normalizes a provider name, rejecting blanks.
fn normalize_provider(provider: &str) -> Result<String> {
    let name = provider.trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err(JobError::validation("provider name must not be empty").into());
    }
    Ok(name)
}

fn require_key(key: &SecretString) -> Result<()> {
    if key.expose_secret().trim().is_empty() {
        return Err(JobError::validation("API key must not be empty").into());
    }
    Ok(())
}

/// Keys encrypted with [`KeyCipher`] in the `provider_keys` table.
pub struct SqliteCredentialStore {
    db: Database,
    cipher: KeyCipher,
}

impl SqliteCredentialStore {
    pub fn new(db: Database, cipher: KeyCipher) -> Self {
        Self { db, cipher }
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn save_provider_key(&self, provider: &str, key: &SecretString) -> Result<()> {
        let provider = normalize_provider(provider)?;
        require_key(key)?;

        let now = format_timestamp(Utc::now());
        key_repo::upsert(
            &self.db,
            &ProviderKeyRow {
                provider: provider.clone(),
                encrypted_key: self.cipher.seal(key)?,
                created_at: now.clone(),
                updated_at: now,
            },
        )?;
        log::info!("Saved API key for provider '{}'", provider);
        Ok(())
    }

    fn get_provider_key(&self, provider: &str) -> Result<Option<SecretString>> {
        let provider = normalize_provider(provider)?;
        match key_repo::find(&self.db, &provider)? {
            Some(row) => Ok(Some(self.cipher.open(&row.encrypted_key)?)),
            None => Ok(None),
        }
    }

    fn delete_provider_key(&self, provider: &str) -> Result<bool> {
        let provider = normalize_provider(provider)?;
        let removed = key_repo::delete(&self.db, &provider)?;
        if removed {
            log::info!("Removed API key for provider '{}'", provider);
        }
        Ok(removed)
    }

    fn providers(&self) -> Result<Vec<String>> {
        Ok(key_repo::list_providers(&self.db)?)
    }
}

/// Keys kept in process memory only.
#[derive(Default)]
pub struct MemoryCredentialStore {
    keys: RwLock<HashMap<String, SecretString>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn save_provider_key(&self, provider: &str, key: &SecretString) -> Result<()> {
        let provider = normalize_provider(provider)?;
        require_key(key)?;
        let mut keys = self.keys.write().unwrap_or_else(|poisoned| {
            log::warn!("Credential lock was poisoned, recovering");
            poisoned.into_inner()
        });
        keys.insert(provider, key.clone());
        Ok(())
    }

    fn get_provider_key(&self, provider: &str) -> Result<Option<SecretString>> {
        let provider = normalize_provider(provider)?;
        let keys = self.keys.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(keys.get(&provider).cloned())
    }

    fn delete_provider_key(&self, provider: &str) -> Result<bool> {
        let provider = normalize_provider(provider)?;
        let mut keys = self.keys.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(keys.remove(&provider).is_some())
    }

    fn providers(&self) -> Result<Vec<String>> {
        let keys = self.keys.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<String> = keys.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
