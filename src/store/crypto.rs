use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::Context;
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// A token sealed with envelope encryption, base64 fields as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedValue {
    pub encrypted_dek: String,
    pub dek_nonce: String,
    pub encrypted_secret: String,
    pub secret_nonce: String,
}

/// AES-256-GCM envelope encryption for tokens at rest.
///
/// Each value gets a fresh data key (DEK); the DEK is wrapped with the
/// configured key (KEK). Keys are wiped from memory on drop.
pub struct StoreCrypto {
    kek: Zeroizing<[u8; 32]>,
}

impl StoreCrypto {
    pub fn new(key_hex: &str) -> anyhow::Result<Self> {
        let kek = parse_store_key(key_hex)?;
        Ok(Self { kek })
    }

    pub fn seal(&self, plaintext: &str) -> anyhow::Result<SealedValue> {
        let mut dek = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut dek[..]);

        let secret_cipher = Aes256Gcm::new_from_slice(&dek[..])
            .map_err(|e| anyhow::anyhow!("invalid key length: {:?}", e))?;
        let secret_nonce = generate_nonce();
        let encrypted_secret = secret_cipher
            .encrypt(Nonce::from_slice(&secret_nonce), plaintext.as_bytes())
            .map_err(|e| anyhow::anyhow!("token encryption failed: {}", e))?;

        let kek_cipher = Aes256Gcm::new_from_slice(&self.kek[..])
            .map_err(|e| anyhow::anyhow!("invalid key length: {:?}", e))?;
        let dek_nonce = generate_nonce();
        let encrypted_dek = kek_cipher
            .encrypt(Nonce::from_slice(&dek_nonce), &dek[..])
            .map_err(|e| anyhow::anyhow!("DEK encryption failed: {}", e))?;

        Ok(SealedValue {
            encrypted_dek: B64.encode(encrypted_dek),
            dek_nonce: B64.encode(dek_nonce),
            encrypted_secret: B64.encode(encrypted_secret),
            secret_nonce: B64.encode(secret_nonce),
        })
    }

    pub fn open(&self, sealed: &SealedValue) -> anyhow::Result<String> {
        let encrypted_dek = B64.decode(&sealed.encrypted_dek).context("bad encrypted_dek")?;
        let dek_nonce = decode_nonce(&sealed.dek_nonce)?;
        let encrypted_secret = B64
            .decode(&sealed.encrypted_secret)
            .context("bad encrypted_secret")?;
        let secret_nonce = decode_nonce(&sealed.secret_nonce)?;

        let kek_cipher = Aes256Gcm::new_from_slice(&self.kek[..])
            .map_err(|e| anyhow::anyhow!("invalid key length: {:?}", e))?;
        let dek_bytes = Zeroizing::new(
            kek_cipher
                .decrypt(Nonce::from_slice(&dek_nonce), encrypted_dek.as_slice())
                .map_err(|e| anyhow::anyhow!("DEK decryption failed: {}", e))?,
        );
        if dek_bytes.len() != 32 {
            anyhow::bail!("DEK has wrong length: {}", dek_bytes.len());
        }

        let secret_cipher = Aes256Gcm::new_from_slice(&dek_bytes[..])
            .map_err(|e| anyhow::anyhow!("invalid key length: {:?}", e))?;
        let plaintext = secret_cipher
            .decrypt(Nonce::from_slice(&secret_nonce), encrypted_secret.as_slice())
            .map_err(|e| anyhow::anyhow!("token decryption failed: {}", e))?;

        Ok(String::from_utf8(plaintext)?)
    }
}

fn generate_nonce() -> [u8; 12] {
    let mut nonce = [0u8; 12];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn decode_nonce(encoded: &str) -> anyhow::Result<Vec<u8>> {
    let nonce = B64.decode(encoded).context("bad nonce encoding")?;
    if nonce.len() != 12 {
        anyhow::bail!("nonce must be 12 bytes, got {}", nonce.len());
    }
    Ok(nonce)
}

pub fn parse_store_key(hex: &str) -> anyhow::Result<Zeroizing<[u8; 32]>> {
    if hex.len() != 64 {
        anyhow::bail!(
            "PORTAL_STORE_KEY must be 64 hex chars (32 bytes), got {} chars",
            hex.len()
        );
    }
    let bytes = Zeroizing::new(hex::decode(hex)?);
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&bytes[..]);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn test_seal_then_open() {
        let crypto = StoreCrypto::new(KEY).unwrap();
        let sealed = crypto.seal("bt-1").unwrap();
        assert!(!sealed.encrypted_secret.contains("bt-1"));
        assert_eq!(crypto.open(&sealed).unwrap(), "bt-1");
    }

    #[test]
    fn test_same_plaintext_seals_differently() {
        let crypto = StoreCrypto::new(KEY).unwrap();
        let a = crypto.seal("bt-1").unwrap();
        let b = crypto.seal("bt-1").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_cannot_open() {
        let sealed = StoreCrypto::new(KEY).unwrap().seal("bt-1").unwrap();
        let other = StoreCrypto::new(&"ff".repeat(32)).unwrap();
        assert!(other.open(&sealed).is_err());
    }

    #[test]
    fn test_rejects_short_key() {
        assert!(StoreCrypto::new("abcd").is_err());
    }
}
