//! Applies [`FieldCipher`] across the sensitive fields of a vault item.

use tracing::debug;

use crate::crypto::FieldCipher;
use crate::error::{CipherError, RecordError};
use crate::record::{VaultFields, VaultRecord, WireRecord, non_empty};
use crate::session::MasterSecret;

/// Converts between [`VaultRecord`] and [`WireRecord`].
///
/// Absent optional fields are encrypted as the empty string so every stored
/// field is an envelope. On the way back an envelope holding `""` (or a
/// bare empty string from older clients) decodes to `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct VaultItemCodec {
    cipher: FieldCipher,
}

impl VaultItemCodec {
    pub fn new(cipher: FieldCipher) -> Self {
        Self { cipher }
    }

    pub fn cipher(&self) -> &FieldCipher {
        &self.cipher
    }

    pub fn to_wire(
        &self,
        record: &VaultRecord,
        secret: &MasterSecret,
    ) -> Result<WireRecord, CipherError> {
        let fields = &record.fields;
        Ok(WireRecord {
            id: record.id.clone(),
            owner_id: record.owner_id.clone(),
            title: self.cipher.seal(&fields.title, secret)?,
            username: self.cipher.seal(&fields.username, secret)?,
            secret: self.cipher.seal(&fields.secret, secret)?,
            url: self.seal_optional(fields.url.as_deref(), secret)?,
            notes: self.seal_optional(fields.notes.as_deref(), secret)?,
            category: record.category.clone(),
            is_favorite: record.is_favorite,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// Decrypts every sensitive field or none of them.
    pub fn from_wire(
        &self,
        wire: &WireRecord,
        secret: &MasterSecret,
    ) -> Result<VaultRecord, RecordError> {
        let fields = self
            .open_fields(wire, secret)
            .map_err(|source| {
                debug!(id = %wire.id, error = %source, "item could not be decrypted");
                RecordError::Unreadable {
                    id: wire.id.clone(),
                    source,
                }
            })?;

        Ok(VaultRecord {
            id: wire.id.clone(),
            owner_id: wire.owner_id.clone(),
            fields,
            category: wire.category.clone(),
            is_favorite: wire.is_favorite,
            created_at: wire.created_at,
            updated_at: wire.updated_at,
        })
    }

    /// Re-encrypts the fields that differ between `before` and `after`.
    ///
    /// Unchanged fields keep their existing envelopes; changed ones get a
    /// fresh salt.
    pub fn reencrypt_changed(
        &self,
        previous: &WireRecord,
        before: &VaultFields,
        after: &VaultFields,
        secret: &MasterSecret,
    ) -> Result<WireRecord, CipherError> {
        let mut next = previous.clone();

        if before.title != after.title {
            next.title = self.cipher.seal(&after.title, secret)?;
        }
        if before.username != after.username {
            next.username = self.cipher.seal(&after.username, secret)?;
        }
        if before.secret != after.secret {
            next.secret = self.cipher.seal(&after.secret, secret)?;
        }
        if before.url != after.url {
            next.url = self.seal_optional(after.url.as_deref(), secret)?;
        }
        if before.notes != after.notes {
            next.notes = self.seal_optional(after.notes.as_deref(), secret)?;
        }

        Ok(next)
    }

    fn open_fields(
        &self,
        wire: &WireRecord,
        secret: &MasterSecret,
    ) -> Result<VaultFields, CipherError> {
        let fields = VaultFields {
            title: self.open(&wire.title, secret)?,
            username: self.open(&wire.username, secret)?,
            secret: self.open(&wire.secret, secret)?,
            url: self.open_optional(&wire.url, secret)?,
            notes: self.open_optional(&wire.notes, secret)?,
        };
        Ok(fields)
    }

    fn open(&self, stored: &str, secret: &MasterSecret) -> Result<String, CipherError> {
        let plaintext = self.cipher.open(stored, secret)?;
        Ok(plaintext.as_str().to_owned())
    }

    fn seal_optional(
        &self,
        value: Option<&str>,
        secret: &MasterSecret,
    ) -> Result<String, CipherError> {
        self.cipher.seal(value.unwrap_or_default(), secret)
    }

    fn open_optional(
        &self,
        stored: &str,
        secret: &MasterSecret,
    ) -> Result<Option<String>, CipherError> {
        if stored.is_empty() {
            return Ok(None);
        }
        Ok(non_empty(self.open(stored, secret)?))
    }
}
