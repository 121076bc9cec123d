//! Second-factor gate between password verification and session issuance.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::TwoFactorError;
use crate::totp::{ProvisioningUri, TotpEngine, TotpSecret};

/// Steps accepted on either side of the current one.
pub const DEFAULT_WINDOW: u32 = 2;

/// Where a login attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    PasswordVerified,
    /// Password accepted; waiting for a one-time code.
    AwaitingCode,
    Authenticated,
    /// Last code was missing or wrong. Another code may be submitted.
    Rejected,
    /// The account has no second factor; login completes without one.
    NotEnrolled,
}

/// What the authentication layer acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Authenticated,
    Rejected,
    Pending,
}

/// Per-account 2FA state.
///
/// A secret from [`TwoFactorEnrollment::setup`] stays pending until a code
/// generated from it is confirmed; only the active secret is enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorEnrollment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending: Option<TotpSecret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    active: Option<TotpSecret>,
}

impl TwoFactorEnrollment {
    pub fn is_enabled(&self) -> bool {
        self.active.is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn active_secret(&self) -> Option<&TotpSecret> {
        self.active.as_ref()
    }

    /// Starts enrollment with a fresh secret.
    ///
    /// Replaces any earlier unconfirmed secret. An already active secret
    /// stays in force until the new one is confirmed.
    pub fn setup(
        &mut self,
        engine: &TotpEngine,
        account_label: &str,
    ) -> Result<(TotpSecret, ProvisioningUri)> {
        let (secret, uri) = engine.generate_secret(account_label)?;
        self.pending = Some(secret.clone());
        debug!("two-factor secret generated; awaiting confirmation");
        Ok((secret, uri))
    }

    /// Proves possession of the pending secret and makes it active.
    pub fn confirm(
        &mut self,
        engine: &TotpEngine,
        code: &str,
        window: u32,
    ) -> Result<(), TwoFactorError> {
        let pending = self.pending.as_ref().ok_or(TwoFactorError::NoPendingSetup)?;
        if !engine.verify(pending, code, window) {
            return Err(TwoFactorError::Rejected);
        }
        self.active = self.pending.take();
        info!("two-factor authentication enabled");
        Ok(())
    }

    /// Turns 2FA off after a valid code from the active secret.
    pub fn disable(
        &mut self,
        engine: &TotpEngine,
        code: &str,
        window: u32,
    ) -> Result<(), TwoFactorError> {
        let active = self.active.as_ref().ok_or(TwoFactorError::NotEnabled)?;
        if !engine.verify(active, code, window) {
            return Err(TwoFactorError::Rejected);
        }
        self.active = None;
        self.pending = None;
        info!("two-factor authentication disabled");
        Ok(())
    }
}

/// Drives one login attempt through the second factor.
#[derive(Debug)]
pub struct SecondFactorGate<'a> {
    engine: &'a TotpEngine,
    secret: Option<&'a TotpSecret>,
    window: u32,
    state: GateState,
}

impl<'a> SecondFactorGate<'a> {
    /// Starts a gate for an account whose password was just verified.
    pub fn begin(engine: &'a TotpEngine, enrollment: &'a TwoFactorEnrollment, window: u32) -> Self {
        let mut gate = Self {
            engine,
            secret: enrollment.active_secret(),
            window,
            state: GateState::PasswordVerified,
        };
        gate.state = match gate.secret {
            Some(_) => GateState::AwaitingCode,
            None => GateState::NotEnrolled,
        };
        gate
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Submits a code. Ignored once the gate has resolved.
    pub fn submit(&mut self, code: Option<&str>) -> GateState {
        if !matches!(self.state, GateState::AwaitingCode | GateState::Rejected) {
            return self.state;
        }

        let verified = match (self.secret, code) {
            (Some(secret), Some(code)) => self.engine.verify(secret, code, self.window),
            _ => false,
        };

        self.state = if verified {
            GateState::Authenticated
        } else {
            GateState::Rejected
        };
        self.state
    }

    pub fn verdict(&self) -> Verdict {
        match self.state {
            GateState::Authenticated | GateState::NotEnrolled => Verdict::Authenticated,
            GateState::Rejected => Verdict::Rejected,
            GateState::PasswordVerified | GateState::AwaitingCode => Verdict::Pending,
        }
    }
}
