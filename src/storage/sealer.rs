use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::StorageError;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

/// Encrypts individual store values with AES-256-GCM.
///
/// Sealed values are `base64(nonce || ciphertext)`, with a fresh random
/// nonce for every call to [`Sealer::seal`].
#[derive(Clone)]
pub struct Sealer {
    key: [u8; KEY_SIZE],
}

impl std::fmt::Debug for Sealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sealer").finish_non_exhaustive()
    }
}

impl Sealer {
    pub fn new(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    pub fn from_base64_key(key: &str) -> Result<Self, StorageError> {
        let key_bytes = BASE64
            .decode(key)
            .map_err(|e| StorageError::Crypto(format!("Invalid encryption key: {}", e)))?;

        if key_bytes.len() != KEY_SIZE {
            return Err(StorageError::Crypto("Invalid encryption key length".to_string()));
        }

        let mut encryption_key = [0u8; KEY_SIZE];
        encryption_key.copy_from_slice(&key_bytes);

        Ok(Self { key: encryption_key })
    }

    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&digest);
        Self { key }
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, StorageError> {
        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| StorageError::Crypto(format!("Encryption error: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let encrypted = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| StorageError::Crypto(format!("Encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + encrypted.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&encrypted);
        Ok(BASE64.encode(sealed))
    }

    pub fn open(&self, sealed: &str) -> Result<String, StorageError> {
        let raw = BASE64
            .decode(sealed)
            .map_err(|e| StorageError::Crypto(format!("Invalid sealed value: {}", e)))?;

        if raw.len() <= NONCE_SIZE {
            return Err(StorageError::Crypto("Sealed value is truncated".to_string()));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);

        let cipher = Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| StorageError::Crypto(format!("Decryption error: {}", e)))?;

        let decrypted = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| StorageError::Crypto(format!("Decryption failed: {}", e)))?;

        String::from_utf8(decrypted)
            .map_err(|e| StorageError::Crypto(format!("Invalid UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_test_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    #[test]
    fn test_seal_and_open() {
        let sealer = Sealer::new(generate_test_key());

        let token = "eyJhbGciOiJIUzI1NiJ9.payload.sig";
        let sealed = sealer.seal(token).unwrap();

        assert_ne!(sealed, token);
        assert_eq!(sealer.open(&sealed).unwrap(), token);
    }

    #[test]
    fn test_nonce_differs_per_value() {
        let sealer = Sealer::from_passphrase("hunter2");
        let a = sealer.seal("same").unwrap();
        let b = sealer.seal("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = Sealer::new(generate_test_key()).seal("client-token").unwrap();
        let other = Sealer::new(generate_test_key());
        assert!(matches!(other.open(&sealed), Err(StorageError::Crypto(_))));
    }

    #[test]
    fn test_base64_key_length_checked() {
        let short = BASE64.encode([0u8; 16]);
        assert!(Sealer::from_base64_key(&short).is_err());

        let good = BASE64.encode(generate_test_key());
        assert!(Sealer::from_base64_key(&good).is_ok());
    }

    #[test]
    fn test_passphrase_is_deterministic() {
        let sealed = Sealer::from_passphrase("room-secret").seal("abc").unwrap();
        let reopened = Sealer::from_passphrase("room-secret").open(&sealed).unwrap();
        assert_eq!(reopened, "abc");
    }
}
