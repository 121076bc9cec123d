//! Vault items in their decrypted and stored forms.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

pub const DEFAULT_CATEGORY: &str = "General";

/// The sensitive part of an item. Wiped on drop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultFields {
    pub title: String,
    pub username: String,
    pub secret: String,
    pub url: Option<String>,
    pub notes: Option<String>,
}

impl VaultFields {
    pub fn new(
        title: impl Into<String>,
        username: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            username: username.into(),
            secret: secret.into(),
            url: None,
            notes: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = non_empty(url.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = non_empty(notes.into());
        self
    }

    /// Collapses empty optional fields to `None`.
    pub(crate) fn normalized(mut self) -> Self {
        self.url = self.url.take().and_then(non_empty);
        self.notes = self.notes.take().and_then(non_empty);
        self
    }
}

impl Drop for VaultFields {
    fn drop(&mut self) {
        self.title.zeroize();
        self.username.zeroize();
        self.secret.zeroize();
        self.url.zeroize();
        self.notes.zeroize();
    }
}

pub(crate) fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

/// A decrypted vault item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultRecord {
    pub id: String,
    pub owner_id: String,
    pub fields: VaultFields,
    pub category: String,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A vault item as handed to the record store.
///
/// Sensitive fields hold `salt:ciphertext` envelopes. `category` and
/// `is_favorite` stay in plaintext for server-side filtering.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WireRecord {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub username: String,
    pub secret: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

/// Input for a new item.
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub fields: VaultFields,
    pub category: Option<String>,
    pub is_favorite: bool,
}

impl NewItem {
    pub fn new(fields: VaultFields) -> Self {
        Self {
            fields,
            category: None,
            is_favorite: false,
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = non_empty(category.into());
        self
    }

    pub fn favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }
}

/// A partial edit. `None` leaves the value unchanged; `Some("")` clears an
/// optional field.
#[derive(Debug, Clone, Default)]
pub struct ItemUpdate {
    pub title: Option<String>,
    pub username: Option<String>,
    pub secret: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub category: Option<String>,
    pub is_favorite: Option<bool>,
}

impl ItemUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.username.is_none()
            && self.secret.is_none()
            && self.url.is_none()
            && self.notes.is_none()
            && self.category.is_none()
            && self.is_favorite.is_none()
    }

    /// Applies the sensitive part of the edit to `fields`.
    pub(crate) fn apply_to(&self, fields: &VaultFields) -> VaultFields {
        VaultFields {
            title: self.title.clone().unwrap_or_else(|| fields.title.clone()),
            username: self
                .username
                .clone()
                .unwrap_or_else(|| fields.username.clone()),
            secret: self.secret.clone().unwrap_or_else(|| fields.secret.clone()),
            url: match &self.url {
                Some(url) => non_empty(url.clone()),
                None => fields.url.clone(),
            },
            notes: match &self.notes {
                Some(notes) => non_empty(notes.clone()),
                None => fields.notes.clone(),
            },
        }
    }
}
