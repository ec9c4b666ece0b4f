//! Credential Store — durable persistence of the backend token pair.
//!
//! Exactly two keys are kept: the access token attached to every
//! authenticated call and the refresh token used to renew it. Nothing here
//! enforces expiry.

pub mod crypto;
pub mod file;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;

pub use file::FileStore;
pub use memory::MemoryStore;

pub const ACCESS_TOKEN_KEY: &str = "backend_access_token";
pub const REFRESH_TOKEN_KEY: &str = "backend_refresh_token";

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Overwrite both tokens unconditionally.
    async fn set(&self, access_token: &str, refresh_token: &str) -> anyhow::Result<()>;

    /// The stored access token, if any.
    async fn get(&self) -> anyhow::Result<Option<String>>;

    async fn refresh_token(&self) -> anyhow::Result<Option<String>>;

    /// Remove both tokens. Clearing an empty store is not an error.
    async fn clear(&self) -> anyhow::Result<()>;
}

/// Open the file-backed store described by the configuration.
pub fn open(cfg: &Config) -> anyhow::Result<Arc<dyn CredentialStore>> {
    let crypto = match cfg.store_key.as_deref() {
        Some(key) => Some(crypto::StoreCrypto::new(key)?),
        None => None,
    };
    Ok(Arc::new(FileStore::new(cfg.credentials_path.clone(), crypto)))
}
