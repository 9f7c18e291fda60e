//! Encrypted file backend.
//!
//! AES-256-GCM with a key derived by SHA-256 from a caller-supplied secret.
//! On disk: base64 of `nonce (12 bytes) || ciphertext`, mode 0600 on unix.

use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::credentials::Credentials;
use crate::error::{ClientError, ClientResult};
use crate::store::CredentialStore;

const NONCE_LEN: usize = 12;
const KEY_CONTEXT: &[u8] = b"warden-client-credentials-v1";

pub struct FileCredentialStore {
    path: PathBuf,
    key: [u8; 32],
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>, secret: &[u8]) -> Self {
        Self {
            path: path.into(),
            key: derive_key(secret),
        }
    }

    /// `<config dir>/warden/credentials.enc`.
    pub fn default_path() -> ClientResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("warden").join("credentials.enc"))
            .ok_or_else(|| {
                ClientError::CredentialStorage("no configuration directory on this platform".into())
            })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cipher(&self) -> ClientResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| ClientError::CredentialStorage(format!("Cipher init failed: {e}")))
    }

    fn encrypt(&self, data: &[u8]) -> ClientResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher()?
            .encrypt(Nonce::from_slice(&nonce_bytes), data)
            .map_err(|e| ClientError::CredentialStorage(format!("Encryption failed: {e}")))?;

        let mut out = nonce_bytes.to_vec();
        out.extend(ciphertext);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> ClientResult<Vec<u8>> {
        if data.len() <= NONCE_LEN {
            return Err(ClientError::CredentialStorage(
                "Invalid encrypted data".to_string(),
            ));
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        self.cipher()?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| ClientError::CredentialStorage(format!("Decryption failed: {e}")))
    }
}

fn derive_key(secret: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(KEY_CONTEXT);
    hasher.update(secret);
    hasher.finalize().into()
}

impl CredentialStore for FileCredentialStore {
    fn store(&self, credentials: &Credentials) -> ClientResult<()> {
        let json = serde_json::to_vec(credentials)?;
        let encoded = BASE64.encode(self.encrypt(&json)?);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, encoded)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    fn load(&self) -> ClientResult<Option<Credentials>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let encoded = std::fs::read_to_string(&self.path)?;
        let encrypted = BASE64
            .decode(encoded.trim())
            .map_err(|e| ClientError::CredentialStorage(format!("Invalid credential file: {e}")))?;
        let decrypted = self.decrypt(&encrypted)?;
        Ok(Some(serde_json::from_slice(&decrypted)?))
    }

    fn delete(&self) -> ClientResult<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }
}
