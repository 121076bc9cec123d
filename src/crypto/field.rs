use tracing::trace;
use zeroize::{Zeroize, Zeroizing};

use super::{CipherEnvelope, KdfParams, aead, derive_key, generate_salt};
use crate::error::CipherError;
use crate::session::MasterSecret;

/// Encrypts and decrypts single string fields.
///
/// Every call to [`FieldCipher::encrypt`] draws a fresh salt and runs the
/// full key derivation, so two encryptions of the same value never share a
/// key.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldCipher {
    kdf: KdfParams,
}

impl FieldCipher {
    #[cfg(test)]
    pub(crate) fn with_params(kdf: KdfParams) -> Self {
        Self { kdf }
    }

    pub fn encrypt(
        &self,
        plaintext: &str,
        secret: &MasterSecret,
    ) -> Result<CipherEnvelope, CipherError> {
        let salt = generate_salt()?;
        let key = derive_key(secret, &salt, self.kdf)?;
        let ciphertext = aead::encrypt(&key, plaintext.as_bytes())?;
        trace!(len = ciphertext.len(), "field encrypted");
        Ok(CipherEnvelope::new(salt, ciphertext))
    }

    pub fn decrypt(
        &self,
        envelope: &CipherEnvelope,
        secret: &MasterSecret,
    ) -> Result<Zeroizing<String>, CipherError> {
        let key = derive_key(secret, envelope.salt(), self.kdf)?;
        let mut plaintext = aead::decrypt(&key, envelope.ciphertext())?;

        match String::from_utf8(std::mem::take(&mut *plaintext)) {
            Ok(text) => Ok(Zeroizing::new(text)),
            Err(err) => {
                err.into_bytes().zeroize();
                Err(CipherError::DecryptionFailed)
            }
        }
    }

    /// Encrypts straight into the stored string form.
    pub fn seal(&self, plaintext: &str, secret: &MasterSecret) -> Result<String, CipherError> {
        Ok(self.encrypt(plaintext, secret)?.encode())
    }

    /// Parses a stored string and decrypts it.
    pub fn open(&self, stored: &str, secret: &MasterSecret) -> Result<Zeroizing<String>, CipherError> {
        let envelope = CipherEnvelope::parse(stored)?;
        self.decrypt(&envelope, secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{NONCE_LEN, TAG_LEN};

    fn cipher() -> FieldCipher {
        FieldCipher::with_params(KdfParams::insecure_for_tests())
    }

    fn secret(pw: &str) -> MasterSecret {
        MasterSecret::new(pw.to_string())
    }

    #[test]
    fn roundtrip_preserves_plaintext() {
        let c = cipher();
        let s = secret("Tr0ub4dor&3");
        let long = "x".repeat(4096);
        for p in ["", "a", "p@ss:word", "ünïcødé 🔐", long.as_str()] {
            let env = c.encrypt(p, &s).unwrap();
            assert_eq!(c.decrypt(&env, &s).unwrap().as_str(), p);
        }
    }

    #[test]
    fn same_plaintext_gets_fresh_salt_and_ciphertext() {
        let c = cipher();
        let s = secret("pw");
        let a = c.encrypt("same", &s).unwrap();
        let b = c.encrypt("same", &s).unwrap();

        assert_ne!(a.salt(), b.salt());
        assert_ne!(a.ciphertext(), b.ciphertext());
    }

    #[test]
    fn wrong_password_is_rejected() {
        let c = cipher();
        let env = c.encrypt("hunter2", &secret("right")).unwrap();
        assert_eq!(
            c.decrypt(&env, &secret("wrong")).unwrap_err(),
            CipherError::DecryptionFailed
        );
    }

    #[test]
    fn seal_and_open_use_the_string_form() {
        let c = cipher();
        let s = secret("pw");
        let stored = c.seal("alice", &s).unwrap();

        assert_eq!(stored.matches(':').count(), 1);
        assert_eq!(c.open(&stored, &s).unwrap().as_str(), "alice");
    }

    #[test]
    fn open_reports_malformed_values() {
        let c = cipher();
        assert!(matches!(
            c.open("no-separator-here", &secret("pw")),
            Err(CipherError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn swapped_salt_fails_authentication() {
        let c = cipher();
        let s = secret("pw");
        let a = c.encrypt("one", &s).unwrap();
        let b = c.encrypt("two", &s).unwrap();
        let spliced = CipherEnvelope::new(*b.salt(), a.ciphertext().to_vec());

        assert_eq!(
            c.decrypt(&spliced, &s).unwrap_err(),
            CipherError::DecryptionFailed
        );
        assert!(a.ciphertext().len() >= NONCE_LEN + TAG_LEN);
    }

    #[test]
    fn scenario_github_item_fields() {
        let c = cipher();
        let master = secret("Tr0ub4dor&3");
        let wrong = secret("wrong-password");

        let fields = ["GitHub", "alice", "p@ss1"];
        let stored: Vec<String> = fields.iter().map(|f| c.seal(f, &master).unwrap()).collect();

        for (value, plain) in stored.iter().zip(fields) {
            let env = CipherEnvelope::parse(value).unwrap();
            assert_eq!(c.decrypt(&env, &master).unwrap().as_str(), plain);
            assert_eq!(
                c.decrypt(&env, &wrong).unwrap_err(),
                CipherError::DecryptionFailed
            );
        }
    }
}
