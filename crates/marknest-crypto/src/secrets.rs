//! Column encryption for values stored at rest.
//!
//! `SecretBox` derives a symmetric key from the installation master key via
//! HKDF-SHA256 and seals each value with ChaCha20-Poly1305 under a fresh
//! random nonce. The sealed form is hex text so it fits a `TEXT` column.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// HKDF info string for column key derivation.
const HKDF_INFO: &[u8] = b"marknest-column-secrets-v1";

/// HKDF salt for domain separation (recommended by RFC 5869).
const HKDF_SALT: &[u8] = b"marknest-secrets-hkdf-salt-v1";

/// Master key size in bytes.
pub const KEY_SIZE: usize = 32;

/// Nonce size for ChaCha20-Poly1305.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size.
const TAG_SIZE: usize = 16;

/// The encrypt/decrypt contract consumed by the store.
///
/// Implementations must be safe for concurrent use and must map the empty
/// string to the empty string in both directions without touching the
/// underlying transform.
pub trait Secrets: Send + Sync {
    /// Encrypt a plaintext value into its persisted form.
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError>;

    /// Decrypt a persisted value back into plaintext.
    fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError>;
}

/// ChaCha20-Poly1305 implementation of [`Secrets`].
pub struct SecretBox {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBox").finish_non_exhaustive()
    }
}

/// Derive the column key from the master key via HKDF-SHA256.
///
/// The caller is responsible for zeroizing the returned bytes.
fn hkdf_derive(master_key: &[u8; KEY_SIZE]) -> Result<[u8; 32], CryptoError> {
    let hk = Hkdf::<Sha256>::new(Some(HKDF_SALT), master_key);
    let mut key = [0u8; 32];
    hk.expand(HKDF_INFO, &mut key)
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
    Ok(key)
}

impl SecretBox {
    /// Create a box from a raw 32-byte master key.
    pub fn new(master_key: &[u8; KEY_SIZE]) -> Result<Self, CryptoError> {
        let mut key_bytes = hkdf_derive(master_key)?;

        let key = Key::from_slice(&key_bytes);
        let cipher = ChaCha20Poly1305::new(key);
        key_bytes.zeroize();

        Ok(Self { cipher })
    }

    /// Create a box from a hex-encoded master key (64 hex characters).
    pub fn from_hex(master_key_hex: &str) -> Result<Self, CryptoError> {
        let mut bytes = hex::decode(master_key_hex.trim())
            .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        let Ok(mut key) = <[u8; KEY_SIZE]>::try_from(bytes.as_slice()) else {
            let actual = bytes.len();
            bytes.zeroize();
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual,
            });
        };
        bytes.zeroize();

        let result = Self::new(&key);
        key.zeroize();
        result
    }

    /// Create a box with a freshly generated random master key.
    ///
    /// Values sealed by this box cannot be opened after it is dropped.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        let result = Self::new(&key);
        key.zeroize();
        result
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::CiphertextTooShort {
                expected: NONCE_SIZE + TAG_SIZE,
                actual: sealed.len(),
            });
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }
}

impl Secrets for SecretBox {
    fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        self.seal(plaintext.as_bytes()).map(hex::encode)
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }
        let sealed =
            hex::decode(ciphertext).map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
        let plaintext = self.open(&sealed)?;
        String::from_utf8(plaintext).map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }
}

/// Generate `len` cryptographically random bytes, hex-encoded.
pub fn generate_secret(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    let encoded = hex::encode(&bytes);
    bytes.zeroize();
    encoded
}
