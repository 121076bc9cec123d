pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gate;
pub mod generator;
pub mod record;
pub mod session;
pub mod storage;
pub mod store;
pub mod throttle;
pub mod totp;

pub use crate::codec::VaultItemCodec;
pub use crate::config::{Config, default_storage};
pub use crate::crypto::{CipherEnvelope, FieldCipher};
pub use crate::error::{CipherError, LoginError, RecordError, TotpError, TwoFactorError};
pub use crate::gate::{GateState, SecondFactorGate, TwoFactorEnrollment, Verdict};
pub use crate::record::{ItemUpdate, NewItem, VaultFields, VaultRecord, WireRecord};
pub use crate::session::{MasterSecret, Session};
pub use crate::storage::Storage;
pub use crate::totp::{ProvisioningUri, TotpEngine, TotpSecret};

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use generator::StrengthLabel;
use getrandom::fill;
use record::DEFAULT_CATEGORY;
use store::Store;
use tracing::{debug, info, warn};

/// Plaintext stored in every account's password check envelope.
const PASSWORD_CHECK: &str = "secuvault-password-check";

/// An unlocked vault for one owner.
///
/// Holds the loaded record store and the session whose master secret
/// encrypts and decrypts every field. Mutations are written back to
/// storage immediately.
pub struct SecuVault {
    store: Store,
    storage: Storage,
    session: Session,
    codec: VaultItemCodec,
    totp: TotpEngine,
    config: Config,
}

/// Filters for [`SecuVault::list`].
///
/// `category` and `favorites_only` match plaintext metadata before any
/// decryption; `search` is applied to decrypted titles and usernames.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub category: Option<String>,
    pub favorites_only: bool,
    pub search: Option<String>,
}

/// Readable items plus the ids of items that failed to decrypt.
#[derive(Debug, Default)]
pub struct Listing {
    pub items: Vec<VaultRecord>,
    pub unreadable: Vec<String>,
}

/// Items created within this many days count as recent.
const RECENT_DAYS: i64 = 7;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct VaultStats {
    pub store_created: DateTime<Utc>,
    pub total: usize,
    pub favorites: usize,
    pub unreadable: usize,
    /// Secrets scoring [`StrengthLabel::Weak`]. `Fair` counts as neither.
    pub weak_secrets: usize,
    pub strong_secrets: usize,
    pub recent: usize,
    pub average_secret_length: usize,
    /// `strong% - weak%/2`, rounded; 0 for an empty vault. Can go negative.
    pub security_score: i64,
    pub by_category: BTreeMap<String, usize>,
}

impl VaultStats {
    fn from_items(items: &[VaultRecord], now: DateTime<Utc>) -> Self {
        let recent_since = now - TimeDelta::days(RECENT_DAYS);
        let mut stats = VaultStats {
            total: items.len(),
            ..Default::default()
        };

        let mut secret_chars = 0;
        for item in items {
            if item.is_favorite {
                stats.favorites += 1;
            }
            if item.created_at > recent_since {
                stats.recent += 1;
            }
            *stats.by_category.entry(item.category.clone()).or_default() += 1;

            match generator::strength_label(generator::strength(&item.fields.secret)) {
                StrengthLabel::Weak => stats.weak_secrets += 1,
                StrengthLabel::Fair => {}
                StrengthLabel::Good | StrengthLabel::Strong => stats.strong_secrets += 1,
            }
            secret_chars += item.fields.secret.chars().count();
        }

        if stats.total > 0 {
            let total = stats.total as f64;
            stats.average_secret_length = (secret_chars + stats.total / 2) / stats.total;
            let raw = stats.strong_secrets as f64 / total * 100.0
                - stats.weak_secrets as f64 / total * 50.0;
            // halves round up, towards positive infinity
            stats.security_score = (raw + 0.5).floor() as i64;
        }
        stats
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwoFactorStatus {
    pub enabled: bool,
    pub pending: bool,
    /// Set while repeated failures have locked the account.
    pub locked_until: Option<DateTime<Utc>>,
}

impl SecuVault {
    /// Authenticates `secret` for the configured owner and opens the vault.
    ///
    /// The master password is checked against the account's password check
    /// envelope (created on first login). Accounts with 2FA enabled must
    /// pass [`SecondFactorGate`]; failures count towards the lockout.
    pub fn login(
        storage: Storage,
        config: Config,
        secret: MasterSecret,
        code: Option<&str>,
    ) -> Result<Self> {
        Self::login_with_codec(storage, config, secret, code, VaultItemCodec::default())
    }

    /// Like [`SecuVault::login`], but asks for the second factor only once
    /// the password has been accepted and the account turns out to need it.
    pub fn login_prompting<F>(
        storage: Storage,
        config: Config,
        secret: MasterSecret,
        ask_code: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> Result<String>,
    {
        Self::login_prompting_with_codec(storage, config, secret, ask_code, VaultItemCodec::default())
    }

    fn login_prompting_with_codec<F>(
        storage: Storage,
        config: Config,
        secret: MasterSecret,
        ask_code: F,
        codec: VaultItemCodec,
    ) -> Result<Self>
    where
        F: FnOnce() -> Result<String>,
    {
        match Self::login_with_codec(storage.clone(), config.clone(), secret.clone(), None, codec) {
            Err(e) if e.downcast_ref::<LoginError>() == Some(&LoginError::CodeRequired) => {
                let code = ask_code()?;
                Self::login_with_codec(storage, config, secret, Some(&code), codec)
            }
            other => other,
        }
    }

    fn login_with_codec(
        storage: Storage,
        config: Config,
        secret: MasterSecret,
        code: Option<&str>,
        codec: VaultItemCodec,
    ) -> Result<Self> {
        config.validate()?;
        let mut store = storage.load_store()?;
        let totp = TotpEngine::new(config.issuer.clone());
        let owner = config.owner_id.clone();
        let now = Utc::now();

        let account = store.account(&owner).cloned().unwrap_or_default();
        account.attempts.check(now).map_err(LoginError::from)?;

        let cipher = codec.cipher();
        let password_ok = match &account.password_check {
            Some(check) => cipher
                .open(check, &secret)
                .map(|plain| plain.as_str() == PASSWORD_CHECK)
                .unwrap_or(false),
            None => true,
        };

        let verdict = if password_ok {
            let mut gate = SecondFactorGate::begin(&totp, &account.two_factor, config.totp_window);
            if gate.state() == GateState::AwaitingCode {
                match code {
                    Some(code) => {
                        gate.submit(Some(code));
                    }
                    None => return Err(LoginError::CodeRequired.into()),
                }
            }
            gate.verdict()
        } else {
            Verdict::Rejected
        };

        if verdict != Verdict::Authenticated {
            warn!(owner = %owner, "login rejected");
            store
                .account_mut(&owner)
                .attempts
                .record_failure(&config.throttle, now);
            storage.save_store(&store)?;
            let err = if password_ok {
                LoginError::Rejected
            } else {
                LoginError::InvalidPassword
            };
            return Err(err.into());
        }

        let account = store.account_mut(&owner);
        let mut dirty = account.attempts.failures() > 0;
        account.attempts.record_success();
        if account.password_check.is_none() {
            account.password_check = Some(cipher.seal(PASSWORD_CHECK, &secret)?);
            dirty = true;
        }
        if dirty {
            storage.save_store(&store)?;
        }

        info!(owner = %owner, "vault unlocked");
        let session = Session::new(owner, secret, config.session_timeout);
        Ok(Self {
            store,
            storage,
            session,
            codec,
            totp,
            config,
        })
    }

    pub fn owner_id(&self) -> &str {
        self.session.owner_id()
    }

    pub fn create(&mut self, item: NewItem) -> Result<VaultRecord> {
        let secret = self.session.secret()?;
        let now = Utc::now();
        let record = VaultRecord {
            id: generate_id()?,
            owner_id: self.session.owner_id().to_string(),
            fields: item.fields.normalized(),
            category: item
                .category
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            is_favorite: item.is_favorite,
            created_at: now,
            updated_at: now,
        };

        let wire = self.codec.to_wire(&record, secret)?;
        self.store.insert(wire)?;
        self.storage.save_store(&self.store)?;
        debug!(id = %record.id, "item created");
        Ok(record)
    }

    pub fn get(&self, id: &str) -> Result<VaultRecord> {
        let secret = self.session.secret()?;
        let wire = self
            .store
            .get(id, self.session.owner_id())
            .ok_or_else(|| RecordError::NotFound(id.to_string()))?;
        Ok(self.codec.from_wire(wire, secret)?)
    }

    /// Lists the owner's items, newest change first.
    ///
    /// Items that fail to decrypt are left out and reported by id instead of
    /// failing the whole listing.
    pub fn list(&self, filter: &ListFilter) -> Result<Listing> {
        let secret = self.session.secret()?;
        let owner = self.session.owner_id();
        let needle = filter.search.as_deref().map(str::to_lowercase);

        let mut listing = Listing::default();
        for wire in self.store.records_for(owner) {
            if filter.favorites_only && !wire.is_favorite {
                continue;
            }
            if let Some(category) = &filter.category {
                if !wire.category.eq_ignore_ascii_case(category) {
                    continue;
                }
            }

            match self.codec.from_wire(wire, secret) {
                Ok(record) => {
                    if let Some(needle) = &needle {
                        if !matches_search(&record, needle) {
                            continue;
                        }
                    }
                    listing.items.push(record);
                }
                Err(RecordError::Unreadable { id, .. }) => listing.unreadable.push(id),
                Err(e) => return Err(e.into()),
            }
        }

        if !listing.unreadable.is_empty() {
            warn!(count = listing.unreadable.len(), "skipped unreadable items");
        }
        listing
            .items
            .sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        listing.unreadable.sort();
        Ok(listing)
    }

    /// Case-insensitive match on decrypted title and username.
    pub fn search(&self, query: &str) -> Result<Listing> {
        self.list(&ListFilter {
            search: Some(query.to_string()),
            ..Default::default()
        })
    }

    /// Applies `update`, re-encrypting only the fields that changed.
    pub fn update(&mut self, id: &str, update: ItemUpdate) -> Result<VaultRecord> {
        let secret = self.session.secret()?;
        let previous = self
            .store
            .get(id, self.session.owner_id())
            .ok_or_else(|| RecordError::NotFound(id.to_string()))?
            .clone();
        let current = self.codec.from_wire(&previous, secret)?;

        let fields = update.apply_to(&current.fields);
        let mut wire = self
            .codec
            .reencrypt_changed(&previous, &current.fields, &fields, secret)?;
        if let Some(category) = update.category.as_deref().filter(|c| !c.is_empty()) {
            wire.category = category.to_string();
        }
        if let Some(is_favorite) = update.is_favorite {
            wire.is_favorite = is_favorite;
        }
        wire.updated_at = Utc::now();

        self.store.replace(wire.clone())?;
        self.storage.save_store(&self.store)?;
        debug!(id, "item updated");

        Ok(VaultRecord {
            id: wire.id,
            owner_id: wire.owner_id,
            fields,
            category: wire.category,
            is_favorite: wire.is_favorite,
            created_at: wire.created_at,
            updated_at: wire.updated_at,
        })
    }

    pub fn delete(&mut self, id: &str) -> Result<()> {
        self.session.secret()?;
        self.store.remove(id, self.session.owner_id())?;
        self.storage.save_store(&self.store)?;
        debug!(id, "item deleted");
        Ok(())
    }

    /// Summary over the readable items, computed after decryption.
    pub fn stats(&self) -> Result<VaultStats> {
        let listing = self.list(&ListFilter::default())?;
        let mut stats = VaultStats::from_items(&listing.items, Utc::now());
        stats.unreadable = listing.unreadable.len();
        stats.store_created = self.store.creation_date();
        Ok(stats)
    }

    pub fn two_factor_status(&self) -> TwoFactorStatus {
        let account = self
            .store
            .account(self.session.owner_id())
            .cloned()
            .unwrap_or_default();
        TwoFactorStatus {
            enabled: account.two_factor.is_enabled(),
            pending: account.two_factor.has_pending(),
            locked_until: account
                .attempts
                .locked_until()
                .filter(|until| *until > Utc::now()),
        }
    }

    /// Generates an unconfirmed 2FA secret for this account.
    pub fn setup_two_factor(&mut self, account_label: &str) -> Result<(TotpSecret, ProvisioningUri)> {
        self.session.secret()?;
        let owner = self.session.owner_id().to_string();
        let enrollment = &mut self.store.account_mut(&owner).two_factor;
        let provisioned = enrollment.setup(&self.totp, account_label)?;
        self.storage.save_store(&self.store)?;
        Ok(provisioned)
    }

    /// Confirms the pending 2FA secret with a code from it.
    pub fn confirm_two_factor(&mut self, code: &str) -> Result<()> {
        self.throttled(|enrollment, totp, window| enrollment.confirm(totp, code, window))
    }

    pub fn disable_two_factor(&mut self, code: &str) -> Result<()> {
        self.throttled(|enrollment, totp, window| enrollment.disable(totp, code, window))
    }

    /// Runs a code check under the account's attempt limiter.
    fn throttled<F>(&mut self, check: F) -> Result<()>
    where
        F: FnOnce(&mut TwoFactorEnrollment, &TotpEngine, u32) -> Result<(), TwoFactorError>,
    {
        self.session.secret()?;
        let now = Utc::now();
        let owner = self.session.owner_id().to_string();
        let account = self.store.account_mut(&owner);
        account.attempts.check(now)?;

        let result = check(&mut account.two_factor, &self.totp, self.config.totp_window);
        match &result {
            Ok(()) => account.attempts.record_success(),
            Err(TwoFactorError::Rejected) => {
                account.attempts.record_failure(&self.config.throttle, now)
            }
            Err(_) => {}
        }

        self.storage
            .save_store(&self.store)
            .context("failed to persist two-factor state")?;
        Ok(result?)
    }

    /// Ends the session and wipes the master secret.
    pub fn logout(self) {
        info!(owner = %self.session.owner_id(), "vault locked");
        self.session.end();
    }
}

fn matches_search(record: &VaultRecord, needle: &str) -> bool {
    record.fields.title.to_lowercase().contains(needle)
        || record.fields.username.to_lowercase().contains(needle)
}

/// 96-bit random record id, hex encoded.
fn generate_id() -> Result<String> {
    let mut buf = [0u8; 12];
    fill(&mut buf).map_err(|_| anyhow::anyhow!("OS random generator unavailable"))?;
    Ok(buf.iter().map(|b| format!("{:02x}", b)).collect())
}
