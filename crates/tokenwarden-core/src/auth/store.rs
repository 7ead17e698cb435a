use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, warn};

use super::Credential;

/// Storage key holding the credential value
pub const TOKEN_KEY: &str = "access_token";

/// Storage key holding the issuance time in epoch milliseconds
pub const ISSUE_TIME_KEY: &str = "token_issue_time";

/// Session-scoped string key/value storage.
///
/// Contents live only as long as the process; nothing is written to disk.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }
}

/// The current credential and its issuance time.
///
/// Both entries are written together and cleared together. Only the
/// lifecycle coordinator holds a `CredentialStore`; everyone else reads
/// through the coordinator.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn SessionStorage>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    /// Store with a fresh in-memory backing
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySessionStorage::new()))
    }

    pub fn put(&self, credential: &Credential) {
        self.storage.set(TOKEN_KEY, credential.value.clone());
        self.storage.set(
            ISSUE_TIME_KEY,
            credential.issued_at.timestamp_millis().to_string(),
        );
        debug!(issued_at = %credential.issued_at, "Credential stored");
    }

    pub fn clear(&self) {
        self.storage.remove(TOKEN_KEY);
        self.storage.remove(ISSUE_TIME_KEY);
        debug!("Credential store cleared");
    }

    pub fn token(&self) -> Option<String> {
        self.storage.get(TOKEN_KEY)
    }

    /// Issuance time, or `None` if missing or unparsable.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.storage.get(ISSUE_TIME_KEY)?;
        let parsed = raw
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single());
        if parsed.is_none() {
            warn!("Stored issuance time is corrupted");
        }
        parsed
    }

    /// The stored credential, if both the value and a readable issuance
    /// time are present.
    pub fn current(&self) -> Option<Credential> {
        let value = self.token()?;
        let issued_at = self.issued_at()?;
        Some(Credential { value, issued_at })
    }
}
