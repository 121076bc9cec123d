use anyhow::{Context, Result, bail};
use chrono::TimeDelta;
use directories::ProjectDirs;
use std::path::PathBuf;

use crate::gate::DEFAULT_WINDOW;
use crate::storage::Storage;
use crate::throttle::ThrottlePolicy;
use crate::totp::DEFAULT_ISSUER;

/// Largest accepted TOTP window (steps on each side).
pub const MAX_TOTP_WINDOW: u32 = crate::totp::MAX_WINDOW;
pub const DEFAULT_OWNER: &str = "local";
pub const DEFAULT_SESSION_TIMEOUT_SECS: i64 = 15 * 60;

/// Runtime settings for a vault.
#[derive(Debug, Clone)]
pub struct Config {
    pub store_path: Option<PathBuf>,
    pub owner_id: String,
    pub issuer: String,
    pub totp_window: u32,
    pub session_timeout: TimeDelta,
    pub throttle: ThrottlePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: None,
            owner_id: DEFAULT_OWNER.to_string(),
            issuer: DEFAULT_ISSUER.to_string(),
            totp_window: DEFAULT_WINDOW,
            session_timeout: TimeDelta::seconds(DEFAULT_SESSION_TIMEOUT_SECS),
            throttle: ThrottlePolicy::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.owner_id.trim().is_empty() {
            bail!("owner id cannot be empty");
        }
        if self.issuer.trim().is_empty() {
            bail!("issuer cannot be empty");
        }
        if self.totp_window > MAX_TOTP_WINDOW {
            bail!("totp window must be at most {MAX_TOTP_WINDOW}");
        }
        if self.session_timeout <= TimeDelta::zero() {
            bail!("session timeout must be positive");
        }
        Ok(())
    }

    /// The configured store, or the platform default.
    pub fn storage(&self) -> Result<Storage> {
        match &self.store_path {
            Some(p) => Ok(Storage::new(p.clone())),
            None => default_storage(),
        }
    }
}

pub fn default_storage() -> Result<Storage> {
    let project_dirs = ProjectDirs::from("", "", "secuvault")
        .context("could not determine platform directories")?;

    let path = project_dirs.data_dir().join("vault.json");

    Ok(Storage::new(path))
}
