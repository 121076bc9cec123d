use super::{KEY_LEN, NONCE_LEN, SALT_LEN, TAG_LEN};
use crate::error::CipherError;
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use getrandom::fill;
use zeroize::Zeroizing;

/// Fill buffer with cryptographically secure random bytes
pub fn secure_random(buf: &mut [u8]) -> Result<(), CipherError> {
    fill(buf).map_err(|_| CipherError::RandomUnavailable)
}

/// Generate salt
pub fn generate_salt() -> Result<[u8; SALT_LEN], CipherError> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}

/// Encrypt plaintext under a fresh random nonce.
///
/// Returns `nonce || ciphertext || tag`.
pub fn encrypt(key: &[u8; KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let mut nonce = [0u8; NONCE_LEN];
    secure_random(&mut nonce)?;

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CipherError::EncryptionFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt `nonce || ciphertext || tag` produced by [`encrypt`].
pub fn decrypt(key: &[u8; KEY_LEN], sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(CipherError::MalformedEnvelope("ciphertext too short"));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);

    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let plaintext = cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CipherError::DecryptionFailed)?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = [9u8; KEY_LEN];
        let sealed = encrypt(&key, b"secret data").unwrap();

        assert_eq!(sealed.len(), NONCE_LEN + b"secret data".len() + TAG_LEN);
        assert_eq!(decrypt(&key, &sealed).unwrap().as_slice(), b"secret data");
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let sealed = encrypt(&[1u8; KEY_LEN], b"secret").unwrap();
        assert_eq!(
            decrypt(&[2u8; KEY_LEN], &sealed).unwrap_err(),
            CipherError::DecryptionFailed
        );
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let key = [3u8; KEY_LEN];
        let mut sealed = encrypt(&key, b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert_eq!(
            decrypt(&key, &sealed).unwrap_err(),
            CipherError::DecryptionFailed
        );
    }

    #[test]
    fn truncated_input_is_malformed() {
        let key = [3u8; KEY_LEN];
        assert!(matches!(
            decrypt(&key, &[0u8; NONCE_LEN]),
            Err(CipherError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn nonces_are_fresh() {
        let key = [4u8; KEY_LEN];
        let a = encrypt(&key, b"same").unwrap();
        let b = encrypt(&key, b"same").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
    }

    #[test]
    fn salts_are_random() {
        assert_ne!(generate_salt().unwrap(), generate_salt().unwrap());
    }
}
