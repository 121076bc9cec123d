//! TOTP (Time-based One-Time Password) second factor.
//!
//! RFC 6238 with HMAC-SHA1, a 30 second step and 6 digits. These are the
//! values every authenticator app assumes when it imports a provisioning
//! URI, so they are constants rather than per-account settings.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use data_encoding::{BASE32_NOPAD, DecodeError};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::crypto::secure_random;
use crate::error::TotpError;

/// Length of a generated shared secret in bytes.
pub const SECRET_LEN: usize = 20;
/// Time step in seconds.
pub const STEP_SECS: u64 = 30;
/// Number of digits in a code.
pub const DIGITS: usize = 6;
/// Largest window honoured by [`TotpEngine`]; larger values are clamped.
pub const MAX_WINDOW: u32 = 10;
/// Default issuer shown by authenticator apps.
pub const DEFAULT_ISSUER: &str = "SecuVault";

type HmacSha1 = Hmac<Sha1>;

/// Shared secret between the vault and the user's authenticator.
///
/// Stored and transported as unpadded base32.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TotpSecret(Zeroizing<Vec<u8>>);

impl TotpSecret {
    pub fn generate() -> Result<Self> {
        let mut bytes = Zeroizing::new(vec![0u8; SECRET_LEN]);
        secure_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Decodes base32, ignoring case, whitespace and `=` padding.
    pub fn from_base32(encoded: &str) -> Result<Self, DecodeError> {
        let normalized: String = encoded
            .chars()
            .filter(|c| !c.is_ascii_whitespace() && *c != '=')
            .map(|c| c.to_ascii_uppercase())
            .collect();
        BASE32_NOPAD
            .decode(normalized.as_bytes())
            .map(Self::from_bytes)
    }

    pub fn to_base32(&self) -> String {
        BASE32_NOPAD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TotpSecret(***)")
    }
}

impl TryFrom<String> for TotpSecret {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_base32(&value)
    }
}

impl From<TotpSecret> for String {
    fn from(secret: TotpSecret) -> Self {
        secret.to_base32()
    }
}

/// An `otpauth://` URI for importing a secret into an authenticator app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningUri(String);

impl ProvisioningUri {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProvisioningUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generates secrets and checks codes.
#[derive(Debug, Clone)]
pub struct TotpEngine {
    issuer: String,
}

impl Default for TotpEngine {
    fn default() -> Self {
        Self::new(DEFAULT_ISSUER)
    }
}

impl TotpEngine {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    /// Creates a fresh secret and the URI that carries it.
    pub fn generate_secret(&self, account_label: &str) -> Result<(TotpSecret, ProvisioningUri)> {
        let secret = TotpSecret::generate()?;
        let uri = self.provisioning_uri(&secret, account_label);
        Ok((secret, uri))
    }

    pub fn provisioning_uri(&self, secret: &TotpSecret, account_label: &str) -> ProvisioningUri {
        let issuer = percent_encode(&self.issuer);
        ProvisioningUri(format!(
            "otpauth://totp/{issuer}:{}?secret={}&issuer={issuer}&algorithm=SHA1&digits={DIGITS}&period={STEP_SECS}",
            percent_encode(account_label),
            secret.to_base32(),
        ))
    }

    /// Checks `code` against the current time step and `window` steps on
    /// either side.
    pub fn verify(&self, secret: &TotpSecret, code: &str, window: u32) -> bool {
        self.check(secret, code, window).is_ok()
    }

    pub fn check(&self, secret: &TotpSecret, code: &str, window: u32) -> Result<(), TotpError> {
        self.check_at(secret, code, window, unix_now())
    }

    pub fn check_at(
        &self,
        secret: &TotpSecret,
        code: &str,
        window: u32,
        unix_time: u64,
    ) -> Result<(), TotpError> {
        if !is_well_formed(code) {
            return Err(TotpError::InvalidCodeFormat);
        }
        if secret.as_bytes().is_empty() {
            return Err(TotpError::VerificationFailed);
        }

        let window = window.min(MAX_WINDOW);
        let current = unix_time / STEP_SECS;
        let first = current.saturating_sub(window as u64);
        let last = current.saturating_add(window as u64);

        let mut matched = 0u8;
        for step in first..=last {
            let candidate = hotp(secret.as_bytes(), step);
            matched |= candidate.as_bytes().ct_eq(code.as_bytes()).unwrap_u8();
        }

        if matched == 1 {
            Ok(())
        } else {
            Err(TotpError::VerificationFailed)
        }
    }

    /// Code for the step containing `unix_time`.
    pub fn code_at(&self, secret: &TotpSecret, unix_time: u64) -> String {
        hotp(secret.as_bytes(), unix_time / STEP_SECS)
    }

    pub fn current_code(&self, secret: &TotpSecret) -> String {
        self.code_at(secret, unix_now())
    }
}

/// HOTP value for `counter` (RFC 4226 dynamic truncation).
fn hotp(key: &[u8], counter: u64) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha1::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(&counter.to_be_bytes());
    let hash = mac.finalize().into_bytes();

    let offset = (hash[hash.len() - 1] & 0x0f) as usize;
    let value = u32::from_be_bytes([
        hash[offset] & 0x7f,
        hash[offset + 1],
        hash[offset + 2],
        hash[offset + 3],
    ]);

    format!("{:0width$}", value % 10u32.pow(DIGITS as u32), width = DIGITS)
}

fn is_well_formed(code: &str) -> bool {
    code.len() == DIGITS && code.bytes().all(|b| b.is_ascii_digit())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 appendix B, SHA-1 seed
    const RFC_SEED: &[u8] = b"12345678901234567890";

    fn rfc_secret() -> TotpSecret {
        TotpSecret::from_bytes(RFC_SEED.to_vec())
    }

    #[test]
    fn rfc6238_vectors_truncated_to_six_digits() {
        let engine = TotpEngine::default();
        let s = rfc_secret();
        // 8-digit vectors 94287082, 07081804, 14050471, 89005924
        assert_eq!(engine.code_at(&s, 59), "287082");
        assert_eq!(engine.code_at(&s, 1111111109), "081804");
        assert_eq!(engine.code_at(&s, 1111111111), "050471");
        assert_eq!(engine.code_at(&s, 1234567890), "005924");
    }

    #[test]
    fn window_tolerance_is_symmetric() {
        let engine = TotpEngine::default();
        let s = rfc_secret();
        let now = 1_700_000_000;
        let window = 2u32;

        for offset in -(window as i64)..=(window as i64) {
            let t = (now as i64 + offset * STEP_SECS as i64) as u64;
            let code = engine.code_at(&s, t);
            assert!(engine.check_at(&s, &code, window, now).is_ok(), "offset {offset}");
        }

        for offset in [-(window as i64) - 1, window as i64 + 1] {
            let t = (now as i64 + offset * STEP_SECS as i64) as u64;
            let code = engine.code_at(&s, t);
            assert_eq!(
                engine.check_at(&s, &code, window, now),
                Err(TotpError::VerificationFailed),
                "offset {offset}"
            );
        }
    }

    #[test]
    fn oversized_window_is_clamped() {
        let engine = TotpEngine::default();
        let s = rfc_secret();
        let now = 1_700_000_000u64;

        let edge = engine.code_at(&s, now - MAX_WINDOW as u64 * STEP_SECS);
        assert!(engine.check_at(&s, &edge, u32::MAX, now).is_ok());

        let beyond = engine.code_at(&s, now - (MAX_WINDOW as u64 + 1) * STEP_SECS);
        assert_eq!(
            engine.check_at(&s, &beyond, u32::MAX, now),
            Err(TotpError::VerificationFailed)
        );
    }

    #[test]
    fn window_near_epoch_does_not_underflow() {
        let engine = TotpEngine::default();
        let s = rfc_secret();
        let code = engine.code_at(&s, 0);
        assert!(engine.check_at(&s, &code, 2, 15).is_ok());
    }

    #[test]
    fn malformed_codes_are_rejected_before_comparison() {
        let engine = TotpEngine::default();
        let s = rfc_secret();
        for code in ["", "12345", "1234567", "12a456", " 12345", "１２３４５６"] {
            assert_eq!(
                engine.check_at(&s, code, 1, 59),
                Err(TotpError::InvalidCodeFormat),
                "{code:?}"
            );
        }
    }

    #[test]
    fn empty_secret_looks_like_a_wrong_code() {
        let engine = TotpEngine::default();
        let empty = TotpSecret::from_bytes(Vec::new());
        assert_eq!(
            engine.check_at(&empty, "123456", 1, 59),
            Err(TotpError::VerificationFailed)
        );
    }

    #[test]
    fn setup_scenario_current_code_verifies() {
        let engine = TotpEngine::default();
        let (secret, uri) = engine.generate_secret("alice@example.com").unwrap();

        assert_eq!(secret.as_bytes().len(), SECRET_LEN);
        assert!(uri.as_str().starts_with("otpauth://totp/SecuVault:alice%40example.com?"));
        assert!(uri.as_str().contains(&format!("secret={}", secret.to_base32())));

        let code = engine.current_code(&secret);
        assert!(engine.verify(&secret, &code, 2));

        let now = unix_now();
        let zero_in_window = (0..=4u64)
            .map(|k| engine.code_at(&secret, (now + k * STEP_SECS).saturating_sub(2 * STEP_SECS)))
            .any(|c| c == "000000");
        assert_eq!(engine.verify(&secret, "000000", 2), zero_in_window);
    }

    #[test]
    fn provisioning_uri_carries_fixed_parameters() {
        let engine = TotpEngine::new("Secu Vault");
        let uri = engine.provisioning_uri(&rfc_secret(), "bob");
        assert_eq!(
            uri.as_str(),
            "otpauth://totp/Secu%20Vault:bob?secret=GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ&issuer=Secu%20Vault&algorithm=SHA1&digits=6&period=30"
        );
    }

    #[test]
    fn base32_parsing_is_lenient() {
        let s = TotpSecret::from_base32("gezd gnbv gy3t qojq gezd gnbv gy3t qojq").unwrap();
        assert_eq!(s.as_bytes(), RFC_SEED);
        assert!(TotpSecret::from_base32("not base32!").is_err());
    }

    #[test]
    fn secret_serializes_as_base32_and_hides_in_debug() {
        let s = rfc_secret();
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, "\"GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ\"");
        let back: TotpSecret = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
        assert_eq!(format!("{s:?}"), "TotpSecret(***)");
    }
}
