//! Wire format of an encrypted field.
//!
//! ```text
//! base64(SALT (16)) ":" base64(NONCE (24) | CIPHERTEXT | TAG (16))
//! ```
//!
//! Both components use the standard padded base64 alphabet, which never
//! contains `:`, so the separator is unambiguous.

use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use super::{NONCE_LEN, SALT_LEN, TAG_LEN};
use crate::error::CipherError;

/// Separator between the salt and the ciphertext.
pub const SEPARATOR: char = ':';

/// A parsed `salt:ciphertext` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherEnvelope {
    salt: [u8; SALT_LEN],
    ciphertext: Vec<u8>,
}

impl CipherEnvelope {
    pub fn new(salt: [u8; SALT_LEN], ciphertext: Vec<u8>) -> Self {
        Self { salt, ciphertext }
    }

    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// Returns `nonce || ciphertext || tag`.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Serializes the envelope into its stored string form.
    pub fn encode(&self) -> String {
        format!(
            "{}{SEPARATOR}{}",
            BASE64.encode(self.salt),
            BASE64.encode(&self.ciphertext)
        )
    }

    /// Parses a stored envelope string.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::MalformedEnvelope`] if:
    /// - the separator is missing or appears more than once
    /// - either component is not valid base64
    /// - the salt is not 16 bytes
    /// - the ciphertext cannot hold a nonce and a tag
    pub fn parse(value: &str) -> Result<Self, CipherError> {
        let (salt_b64, ciphertext_b64) = value
            .split_once(SEPARATOR)
            .ok_or(CipherError::MalformedEnvelope("missing separator"))?;

        if ciphertext_b64.contains(SEPARATOR) {
            return Err(CipherError::MalformedEnvelope("unexpected separator"));
        }

        let salt: [u8; SALT_LEN] = BASE64
            .decode(salt_b64)
            .map_err(|_| CipherError::MalformedEnvelope("salt is not base64"))?
            .try_into()
            .map_err(|_| CipherError::MalformedEnvelope("invalid salt length"))?;

        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .map_err(|_| CipherError::MalformedEnvelope("ciphertext is not base64"))?;

        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::MalformedEnvelope("ciphertext too short"));
        }

        Ok(Self { salt, ciphertext })
    }
}

impl fmt::Display for CipherEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for CipherEnvelope {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
