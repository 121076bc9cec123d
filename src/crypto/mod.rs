//! Cryptographic primitives for per-field vault encryption.
//!
//! Provides key derivation, the AEAD layer, and the `salt:ciphertext`
//! envelope that is stored in place of every sensitive field.

pub mod aead;
pub mod envelope;
pub mod field;
pub mod kdf;

pub use aead::{decrypt, encrypt, generate_salt, secure_random};
pub use envelope::CipherEnvelope;
pub use field::FieldCipher;
pub use kdf::{DerivedKey, KdfParams, derive_key};

/// Length of the per-field salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the nonce (24 bytes for XChaCha20-Poly1305).
pub const NONCE_LEN: usize = 24;
/// Length of the Poly1305 authentication tag (16 bytes).
pub const TAG_LEN: usize = 16;
/// Length of the encryption key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
