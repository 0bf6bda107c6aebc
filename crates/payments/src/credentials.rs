//! Rotatable provider credentials.

use std::sync::{Arc, PoisonError, RwLock};

use crate::error::ConfigurationError;
use crate::signing::secret_digest;

#[derive(Clone, Default)]
struct Credentials {
    api_key: Option<String>,
    secret: Option<String>,
}

/// Shared cell holding the provider API key and secret.
///
/// Every clone sees the same values, so a rotation is picked up by the very
/// next request without restarting anything.
#[derive(Clone, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<Credentials>>,
}

impl CredentialStore {
    pub fn new(api_key: Option<String>, secret: Option<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Credentials {
                api_key: non_blank(api_key),
                secret: non_blank(secret),
            })),
        }
    }

    /// Reads `PAYMENT_PROVIDER_API_KEY` and `PAYMENT_PROVIDER_SECRET`.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("PAYMENT_PROVIDER_API_KEY").ok(),
            std::env::var("PAYMENT_PROVIDER_SECRET").ok(),
        )
    }

    pub fn rotate_secret(&self, secret: impl Into<String>) {
        self.write().secret = non_blank(Some(secret.into()));
        tracing::info!("payment provider secret rotated");
    }

    /// The API key and the bearer digest for one request.
    pub fn request_headers(&self) -> Result<(String, String), ConfigurationError> {
        let credentials = self.read();
        match (&credentials.api_key, &credentials.secret) {
            (Some(api_key), Some(secret)) => Ok((api_key.clone(), secret_digest(secret))),
            _ => Err(ConfigurationError::MissingCredentials),
        }
    }

    /// The digest that keys webhook signatures.
    pub fn webhook_digest(&self) -> Result<String, ConfigurationError> {
        self.read()
            .secret
            .as_deref()
            .map(secret_digest)
            .ok_or(ConfigurationError::MissingWebhookSecret)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Credentials> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Credentials> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let credentials = self.read();
        f.debug_struct("CredentialStore")
            .field("api_key", &credentials.api_key.as_ref().map(|_| "<redacted>"))
            .field("secret", &credentials.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
