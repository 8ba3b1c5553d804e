//! Credential storage behind the OS keychain.
//!
//! Provider API keys never live in config files or the database; profiles
//! carry a [`SecretRef`] and the key material stays in the platform
//! keychain. [`SecretStore`] is the seam: production uses
//! [`KeyringSecretStore`], tests use [`MemorySecretStore`].
//!
//! All operations are blocking; async callers hop through
//! `tokio::task::spawn_blocking`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tracing::warn;

const SERVICE: &str = "net.tidings.credentials";

/// Stable name of one secret inside the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretRef(String);

impl SecretRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Conventional reference for a provider profile's API key.
    pub fn provider_api_key(provider_profile_id: &str) -> Self {
        Self(format!("provider/{provider_profile_id}/api-key"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretStoreError {
    #[error("keychain access failed for {reference}: {message}")]
    Keychain {
        reference: SecretRef,
        message: String,
    },
}

/// Contract of the credential store: save, read, delete.
///
/// `read` returns `Ok(None)` when no secret exists under the reference;
/// reads are never cached.
pub trait SecretStore: Send + Sync {
    fn save(&self, reference: &SecretRef, secret: &str) -> Result<(), SecretStoreError>;
    fn read(&self, reference: &SecretRef) -> Result<Option<String>, SecretStoreError>;
    fn delete(&self, reference: &SecretRef) -> Result<(), SecretStoreError>;
}

/// OS-keychain-backed store; one keychain item per reference.
#[derive(Debug, Clone)]
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE.to_string(),
        }
    }

    /// Store under a custom service name; used to isolate test runs.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, reference: &SecretRef) -> Result<keyring::Entry, SecretStoreError> {
        keyring::Entry::new(&self.service, reference.as_str()).map_err(|err| {
            SecretStoreError::Keychain {
                reference: reference.clone(),
                message: err.to_string(),
            }
        })
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringSecretStore {
    fn save(&self, reference: &SecretRef, secret: &str) -> Result<(), SecretStoreError> {
        self.entry(reference)?
            .set_password(secret)
            .map_err(|err| SecretStoreError::Keychain {
                reference: reference.clone(),
                message: err.to_string(),
            })
    }

    fn read(&self, reference: &SecretRef) -> Result<Option<String>, SecretStoreError> {
        match self.entry(reference)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => {
                warn!("keychain read failed for {reference}: {err}");
                Err(SecretStoreError::Keychain {
                    reference: reference.clone(),
                    message: err.to_string(),
                })
            }
        }
    }

    fn delete(&self, reference: &SecretRef) -> Result<(), SecretStoreError> {
        match self.entry(reference)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(SecretStoreError::Keychain {
                reference: reference.clone(),
                message: err.to_string(),
            }),
        }
    }
}

/// In-memory store for tests and headless environments.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<SecretRef, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn save(&self, reference: &SecretRef, secret: &str) -> Result<(), SecretStoreError> {
        if let Ok(mut secrets) = self.secrets.lock() {
            secrets.insert(reference.clone(), secret.to_string());
        }
        Ok(())
    }

    fn read(&self, reference: &SecretRef) -> Result<Option<String>, SecretStoreError> {
        Ok(self
            .secrets
            .lock()
            .ok()
            .and_then(|secrets| secrets.get(reference).cloned()))
    }

    fn delete(&self, reference: &SecretRef) -> Result<(), SecretStoreError> {
        if let Ok(mut secrets) = self.secrets.lock() {
            secrets.remove(reference);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn memory_store_round_trips() {
        let store = MemorySecretStore::new();
        let reference = SecretRef::provider_api_key("prov-1");

        assert_eq!(store.read(&reference).ok(), Some(None));
        store.save(&reference, "sk-123").ok();
        assert_eq!(store.read(&reference).ok(), Some(Some("sk-123".to_string())));
        store.delete(&reference).ok();
        assert_eq!(store.read(&reference).ok(), Some(None));
    }

    #[test]
    fn provider_reference_naming_is_stable() {
        assert_eq!(
            SecretRef::provider_api_key("abc").as_str(),
            "provider/abc/api-key"
        );
    }
}
