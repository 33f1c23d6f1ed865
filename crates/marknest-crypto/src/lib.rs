//! Marknest Secrets Library
//!
//! Provides the encryption collaborator used by the store to protect
//! sensitive columns (git access tokens) at rest.
//!
//! ## Crypto primitives
//!
//! - **Key**: 32-byte master key → HKDF-SHA256 → column key
//! - **Encryption**: ChaCha20-Poly1305 AEAD, random 12-byte nonce per value
//! - **Encoding**: hex(`nonce || ciphertext || tag`)

pub mod error;
pub mod secrets;

pub use error::CryptoError;
pub use secrets::{KEY_SIZE, NONCE_SIZE, SecretBox, Secrets, generate_secret};
