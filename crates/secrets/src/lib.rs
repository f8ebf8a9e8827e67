use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{Context, Result, anyhow};
use argon2::Argon2;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use core_types::SecretRef;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

const FILE_NAME: &str = "api_keys.json";
const NONCE_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("api keys are sealed but no password was provided")]
    MissingPassword,
    #[error("api keys could not be unsealed, wrong password or corrupt file")]
    WrongPassword,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
enum KeyFile {
    Plain {
        keys: BTreeMap<String, String>,
    },
    Sealed {
        salt: String,
        nonce: String,
        ciphertext: String,
    },
}

#[derive(Debug, Clone)]
pub struct SecretStore {
    path: PathBuf,
    password: Option<String>,
}

impl SecretStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(FILE_NAME),
            password: None,
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn is_sealed(&self) -> bool {
        self.password.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, secret: &SecretRef) -> Result<Option<String>> {
        Ok(self.load()?.remove(&slot(secret)))
    }

    pub fn put(&self, secret: &SecretRef, value: impl Into<String>) -> Result<()> {
        let mut keys = self.load()?;
        keys.insert(slot(secret), value.into());
        self.store(&keys)
    }

    /// Returns whether a key was actually stored under `secret`.
    pub fn remove(&self, secret: &SecretRef) -> Result<bool> {
        let mut keys = self.load()?;
        let existed = keys.remove(&slot(secret)).is_some();
        if existed {
            self.store(&keys)?;
        }
        Ok(existed)
    }

    pub fn resolve_api_key(&self, secret: &SecretRef, from_env: Option<String>) -> Option<String> {
        if let Some(key) = from_env.filter(|k| !k.trim().is_empty()) {
            debug!(slot = %slot(secret), "api key taken from environment");
            return Some(key);
        }
        match self.get(secret) {
            Ok(key) => key.filter(|k| !k.trim().is_empty()),
            Err(err) => {
                warn!(slot = %slot(secret), "failed to read api key: {err:#}");
                None
            }
        }
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let file: KeyFile = serde_json::from_str(&raw).context("failed to parse api key file")?;

        match file {
            KeyFile::Plain { keys } => Ok(keys),
            KeyFile::Sealed {
                salt,
                nonce,
                ciphertext,
            } => {
                let password = self.password.as_deref().ok_or(SecretError::MissingPassword)?;
                open(password, &salt, &nonce, &ciphertext)
            }
        }
    }

    fn store(&self, keys: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let file = match self.password.as_deref() {
            Some(password) => seal(password, keys)?,
            None => KeyFile::Plain { keys: keys.clone() },
        };
        let text = serde_json::to_string_pretty(&file)?;
        fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        info!(sealed = self.is_sealed(), "api keys saved");
        Ok(())
    }
}

fn slot(secret: &SecretRef) -> String {
    format!("{}.{}", secret.namespace, secret.key)
}

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| anyhow!("failed to derive encryption key: {e}"))?;
    Ok(key)
}

fn seal(password: &str, keys: &BTreeMap<String, String>) -> Result<KeyFile> {
    let plaintext = serde_json::to_vec(keys)?;
    let mut salt = [0u8; 16];
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new_from_slice(&derive_key(password, &salt)?)
        .map_err(|e| anyhow!("failed to build cipher: {e}"))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_ref())
        .map_err(|e| anyhow!("failed to seal api keys: {e}"))?;

    Ok(KeyFile::Sealed {
        salt: BASE64.encode(salt),
        nonce: BASE64.encode(nonce),
        ciphertext: BASE64.encode(ciphertext),
    })
}

fn open(
    password: &str,
    salt: &str,
    nonce: &str,
    ciphertext: &str,
) -> Result<BTreeMap<String, String>> {
    let salt = BASE64.decode(salt).context("bad salt encoding")?;
    let nonce = BASE64.decode(nonce).context("bad nonce encoding")?;
    let ciphertext = BASE64.decode(ciphertext).context("bad ciphertext encoding")?;
    if nonce.len() != NONCE_LEN {
        return Err(SecretError::WrongPassword.into());
    }

    let cipher = Aes256Gcm::new_from_slice(&derive_key(password, &salt)?)
        .map_err(|e| anyhow!("failed to build cipher: {e}"))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|_| SecretError::WrongPassword)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn open_ai() -> SecretRef {
        SecretRef::new("provider", "open_ai_api_key")
    }

    #[test]
    fn plain_keys_survive_reopen() {
        let dir = tempdir().expect("tempdir");
        SecretStore::new(dir.path())
            .put(&open_ai(), "sk-1")
            .expect("write");

        let value = SecretStore::new(dir.path()).get(&open_ai()).expect("read");
        assert_eq!(value.as_deref(), Some("sk-1"));
    }

    #[test]
    fn sealed_file_hides_plaintext() {
        let dir = tempdir().expect("tempdir");
        let store = SecretStore::new(dir.path()).with_password(Some("p@ss".into()));
        store.put(&open_ai(), "sk-secret").expect("write");

        let raw = fs::read_to_string(store.path()).expect("raw");
        assert!(raw.contains("\"sealed\""));
        assert!(!raw.contains("sk-secret"));

        let reopened = SecretStore::new(dir.path()).with_password(Some("p@ss".into()));
        assert_eq!(
            reopened.get(&open_ai()).expect("read").as_deref(),
            Some("sk-secret")
        );
    }

    #[test]
    fn sealed_file_needs_the_right_password() {
        let dir = tempdir().expect("tempdir");
        SecretStore::new(dir.path())
            .with_password(Some("good".into()))
            .put(&open_ai(), "sk-3")
            .expect("write");

        let wrong = SecretStore::new(dir.path()).with_password(Some("bad".into()));
        let err = wrong.get(&open_ai()).expect_err("must fail");
        assert_eq!(
            err.downcast_ref::<SecretError>(),
            Some(&SecretError::WrongPassword)
        );

        let missing = SecretStore::new(dir.path());
        let err = missing.get(&open_ai()).expect_err("must fail");
        assert_eq!(
            err.downcast_ref::<SecretError>(),
            Some(&SecretError::MissingPassword)
        );
    }

    #[test]
    fn remove_reports_whether_key_existed() {
        let dir = tempdir().expect("tempdir");
        let store = SecretStore::new(dir.path());
        store.put(&open_ai(), "sk-4").expect("write");

        assert!(store.remove(&open_ai()).expect("remove"));
        assert!(!store.remove(&open_ai()).expect("remove again"));
        assert_eq!(store.get(&open_ai()).expect("read"), None);
    }

    #[test]
    fn environment_key_wins_over_store() {
        let dir = tempdir().expect("tempdir");
        let store = SecretStore::new(dir.path());
        store.put(&open_ai(), "sk-stored").expect("write");

        assert_eq!(
            store.resolve_api_key(&open_ai(), Some("sk-env".into())),
            Some("sk-env".into())
        );
        assert_eq!(
            store.resolve_api_key(&open_ai(), Some("  ".into())),
            Some("sk-stored".into())
        );
    }

    #[test]
    fn unreadable_store_resolves_to_no_key() {
        let dir = tempdir().expect("tempdir");
        let store = SecretStore::new(dir.path());
        fs::write(store.path(), "garbage").expect("write");
        assert_eq!(store.resolve_api_key(&open_ai(), None), None);
    }
}
