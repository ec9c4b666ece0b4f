use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::crypto::{SealedValue, StoreCrypto};
use super::CredentialStore;

/// On-disk layout: a flat JSON object keyed like the browser's local storage.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(rename = "backend_access_token", default, skip_serializing_if = "Option::is_none")]
    access_token: Option<StoredValue>,
    #[serde(rename = "backend_refresh_token", default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<StoredValue>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Plain(String),
    Sealed(SealedValue),
}

/// Durable credential store backed by a single JSON file.
///
/// Values are plaintext unless a [`StoreCrypto`] is supplied, in which case
/// each token is sealed individually. Writes replace the file atomically
/// (temp file + rename) and are serialized by `write_lock`.
pub struct FileStore {
    path: PathBuf,
    crypto: Option<StoreCrypto>,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, crypto: Option<StoreCrypto>) -> Self {
        Self {
            path: path.into(),
            crypto,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> anyhow::Result<CredentialFile> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CredentialFile::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()));
            }
        };
        if raw.trim().is_empty() {
            return Ok(CredentialFile::default());
        }
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", self.path.display()))
    }

    async fn persist(&self, file: &CredentialFile) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let tmp = self.path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(file)?;
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }

    fn encode(&self, token: &str) -> anyhow::Result<StoredValue> {
        match &self.crypto {
            Some(crypto) => Ok(StoredValue::Sealed(crypto.seal(token)?)),
            None => Ok(StoredValue::Plain(token.to_string())),
        }
    }

    fn decode(&self, value: &StoredValue) -> anyhow::Result<String> {
        match (value, &self.crypto) {
            (StoredValue::Plain(token), None) => Ok(token.clone()),
            (StoredValue::Plain(token), Some(_)) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "plaintext token found in sealed store; it will be sealed on next write"
                );
                Ok(token.clone())
            }
            (StoredValue::Sealed(sealed), Some(crypto)) => crypto.open(sealed),
            (StoredValue::Sealed(_), None) => anyhow::bail!(
                "{} holds sealed tokens but PORTAL_STORE_KEY is not set",
                self.path.display()
            ),
        }
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn set(&self, access_token: &str, refresh_token: &str) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let file = CredentialFile {
            access_token: Some(self.encode(access_token)?),
            refresh_token: Some(self.encode(refresh_token)?),
        };
        self.persist(&file).await?;
        tracing::debug!(path = %self.path.display(), sealed = self.crypto.is_some(), "stored backend credentials");
        Ok(())
    }

    async fn get(&self) -> anyhow::Result<Option<String>> {
        let file = self.load().await?;
        file.access_token.as_ref().map(|v| self.decode(v)).transpose()
    }

    async fn refresh_token(&self) -> anyhow::Result<Option<String>> {
        let file = self.load().await?;
        file.refresh_token.as_ref().map(|v| self.decode(v)).transpose()
    }

    async fn clear(&self) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "cleared backend credentials");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", self.path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("creds.json"), None);
        assert!(store.get().await.unwrap().is_none());
        assert!(store.refresh_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_plaintext_layout_uses_storage_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("creds.json");
        let store = FileStore::new(&path, None);
        store.set("bt-1", "rt-1").await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["backend_access_token"], "bt-1");
        assert_eq!(raw["backend_refresh_token"], "rt-1");
    }

    #[tokio::test]
    async fn test_sealed_store_never_writes_plaintext() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        let store = FileStore::new(&path, Some(StoreCrypto::new(KEY).unwrap()));
        store.set("bt-secret", "rt-secret").await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("bt-secret"));
        assert!(!raw.contains("rt-secret"));
        assert_eq!(store.get().await.unwrap().as_deref(), Some("bt-secret"));
        assert_eq!(store.refresh_token().await.unwrap().as_deref(), Some("rt-secret"));
    }

    #[tokio::test]
    async fn test_sealed_file_without_key_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        FileStore::new(&path, Some(StoreCrypto::new(KEY).unwrap()))
            .set("bt-1", "rt-1")
            .await
            .unwrap();

        let unkeyed = FileStore::new(&path, None);
        assert!(unkeyed.get().await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        FileStore::new(&path, None).set("bt-1", "rt-1").await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
