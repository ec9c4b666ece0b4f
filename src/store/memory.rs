use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CredentialStore;

/// Process-local store. Tokens vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    tokens: RwLock<Option<(String, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access_token: &str, refresh_token: &str) -> Self {
        Self {
            tokens: RwLock::new(Some((access_token.to_string(), refresh_token.to_string()))),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn set(&self, access_token: &str, refresh_token: &str) -> anyhow::Result<()> {
        *self.tokens.write().await = Some((access_token.to_string(), refresh_token.to_string()));
        Ok(())
    }

    async fn get(&self) -> anyhow::Result<Option<String>> {
        Ok(self.tokens.read().await.as_ref().map(|(access, _)| access.clone()))
    }

    async fn refresh_token(&self) -> anyhow::Result<Option<String>> {
        Ok(self.tokens.read().await.as_ref().map(|(_, refresh)| refresh.clone()))
    }

    async fn clear(&self) -> anyhow::Result<()> {
        *self.tokens.write().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = MemoryStore::with_tokens("bt-1", "rt-1");
        store.set("bt-2", "rt-2").await.unwrap();
        assert_eq!(store.get().await.unwrap().as_deref(), Some("bt-2"));
        assert_eq!(store.refresh_token().await.unwrap().as_deref(), Some("rt-2"));
    }

    #[tokio::test]
    async fn test_clear_twice_leaves_store_empty() {
        let store = MemoryStore::with_tokens("bt-1", "rt-1");
        store.clear().await.unwrap();
        assert!(store.get().await.unwrap().is_none());
        store.clear().await.unwrap();
        assert!(store.get().await.unwrap().is_none());
        assert!(store.refresh_token().await.unwrap().is_none());
    }
}
