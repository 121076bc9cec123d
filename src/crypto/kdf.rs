use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use super::{KEY_LEN, SALT_LEN};
use crate::error::CipherError;
use crate::session::MasterSecret;

/// A key derived from a master secret. Wiped from memory on drop.
pub type DerivedKey = Zeroizing<[u8; KEY_LEN]>;

/// Argon2id cost parameters.
///
/// The parameters are part of the envelope format: every client has to use
/// the same values or previously written fields stop decrypting. Only
/// [`KdfParams::FIELD_V1`] is reachable from the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    mem_cost_kib: u32,
    time_cost: u32,
    parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self::FIELD_V1
    }
}

impl KdfParams {
    /// Parameters of the v1 field envelope.
    pub const FIELD_V1: Self = Self {
        // 19 MiB
        mem_cost_kib: 19 * 1024,
        time_cost: 2,
        parallelism: 1,
    };

    #[cfg(test)]
    pub(crate) fn new(mem_cost_kib: u32, time_cost: u32, parallelism: u32) -> anyhow::Result<Self> {
        let params = Self {
            mem_cost_kib,
            time_cost,
            parallelism,
        };
        params.validate()?;
        Ok(params)
    }

    /// Cheap parameters for unit tests. Never used for stored data.
    #[cfg(test)]
    pub(crate) fn insecure_for_tests() -> Self {
        Self {
            mem_cost_kib: 64,
            time_cost: 1,
            parallelism: 1,
        }
    }

    pub fn mem_cost_kib(&self) -> u32 {
        self.mem_cost_kib
    }

    pub fn time_cost(&self) -> u32 {
        self.time_cost
    }

    pub fn parallelism(&self) -> u32 {
        self.parallelism
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mem_cost_kib < 8 {
            anyhow::bail!("argon2 memory cost too low");
        }
        if self.time_cost < 1 {
            anyhow::bail!("argon2 time cost must be >= 1");
        }
        if self.parallelism < 1 {
            anyhow::bail!("argon2 parallelism must be >= 1");
        }
        if self.mem_cost_kib < 8 * self.parallelism {
            anyhow::bail!("argon2 memory cost must be at least 8 * parallelism");
        }
        Ok(())
    }
}

/// Derives the field key for `salt` from the master secret.
///
/// Deterministic for identical inputs. The only input-dependent failure is
/// a salt of the wrong length.
pub fn derive_key(
    secret: &MasterSecret,
    salt: &[u8],
    kdf: KdfParams,
) -> Result<DerivedKey, CipherError> {
    if salt.len() != SALT_LEN {
        return Err(CipherError::InvalidSaltLength(salt.len()));
    }

    let params = Params::new(
        kdf.mem_cost_kib,
        kdf.time_cost,
        kdf.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|_| CipherError::KeyDerivation)?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(secret.expose().as_bytes(), salt, &mut key[..])
        .map_err(|_| CipherError::KeyDerivation)?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(pw: &str) -> MasterSecret {
        MasterSecret::new(pw.to_string())
    }

    #[test]
    fn kdf_is_deterministic() {
        let salt = [42u8; SALT_LEN];
        let kdf = KdfParams::insecure_for_tests();

        let k1 = derive_key(&secret("password"), &salt, kdf).unwrap();
        let k2 = derive_key(&secret("password"), &salt, kdf).unwrap();

        assert_eq!(*k1, *k2);
    }

    #[test]
    fn different_salts_give_different_keys() {
        let kdf = KdfParams::insecure_for_tests();

        let k1 = derive_key(&secret("pw"), &[1u8; SALT_LEN], kdf).unwrap();
        let k2 = derive_key(&secret("pw"), &[2u8; SALT_LEN], kdf).unwrap();

        assert_ne!(*k1, *k2);
    }

    #[test]
    fn kdf_params_affect_output() {
        let salt = [7u8; SALT_LEN];

        let kdf1 = KdfParams::new(64, 1, 1).unwrap();
        let kdf2 = KdfParams::new(128, 1, 1).unwrap();

        let k1 = derive_key(&secret("pw"), &salt, kdf1).unwrap();
        let k2 = derive_key(&secret("pw"), &salt, kdf2).unwrap();

        assert_ne!(*k1, *k2);
    }

    #[test]
    fn wrong_salt_length_is_rejected() {
        let kdf = KdfParams::insecure_for_tests();
        match derive_key(&secret("pw"), &[0u8; 8], kdf) {
            Err(CipherError::InvalidSaltLength(8)) => {}
            other => panic!("expected InvalidSaltLength, got: {other:?}"),
        }
    }

    #[test]
    fn kdf_invalid_params_fail_gracefully() {
        assert!(KdfParams::new(0, 0, 0).is_err());
    }

    #[test]
    fn field_v1_parameters_are_pinned() {
        let kdf = KdfParams::default();
        assert_eq!(kdf, KdfParams::FIELD_V1);
        assert_eq!(kdf.mem_cost_kib(), 19456);
        assert_eq!(kdf.time_cost(), 2);
        assert_eq!(kdf.parallelism(), 1);
        assert!(kdf.validate().is_ok());
    }
}
