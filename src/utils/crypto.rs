// Cryptographic primitives used by the cookie codec

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Nonce size for AES-256-GCM encryption (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Encryption key size for AES-256 (256 bits)
pub const ENCRYPTION_KEY_SIZE: usize = 32;

/// Size of an HMAC-SHA256 tag
pub const MAC_SIZE: usize = 32;

/// Fill a buffer of `length` bytes from the thread-local CSPRNG
#[must_use]
pub fn random_bytes(length: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; length];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

/// Generate a random secret of `length` bytes, encoded as standard base64
///
/// Used when no key material is configured.
#[must_use]
pub fn generate_secret(length: usize) -> String {
    general_purpose::STANDARD.encode(random_bytes(length))
}

/// Encrypt raw bytes with AES-256-GCM
///
/// The output is `nonce || ciphertext` (the GCM tag is part of the ciphertext).
///
/// # Errors
///
/// Returns an error if the key length is invalid or encryption fails
pub fn encrypt_bytes(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() != ENCRYPTION_KEY_SIZE {
        return Err(anyhow!(
            "Invalid key length: expected {ENCRYPTION_KEY_SIZE} bytes, got {}",
            key.len()
        ));
    }

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| anyhow!("AES encryption failed: {e}"))?;

    let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);
    Ok(combined)
}

/// Decrypt `nonce || ciphertext` produced by [`encrypt_bytes`]
///
/// # Errors
///
/// Returns an error if:
/// - Key length is invalid
/// - Data is shorter than a nonce
/// - AES decryption fails (wrong key or tampered data)
pub fn decrypt_bytes(combined: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if key.len() != ENCRYPTION_KEY_SIZE {
        return Err(anyhow!(
            "Invalid key length: expected {ENCRYPTION_KEY_SIZE} bytes, got {}",
            key.len()
        ));
    }

    if combined.len() < NONCE_SIZE {
        return Err(anyhow!("Invalid data length"));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| anyhow!("AES decryption failed: {e}"))
}

/// Compute an HMAC-SHA256 tag over `message`
///
/// # Errors
///
/// Returns an error if the HMAC key cannot be used
pub fn hmac_sign(message: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|_| anyhow!("Invalid HMAC key length"))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Verify an HMAC-SHA256 tag in constant time
#[must_use]
pub fn hmac_verify(message: &[u8], tag: &[u8], key: &[u8]) -> bool {
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(key) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(tag).is_ok()
}

/// Derive a 32-byte encryption key from input key material
///
/// The key is the SHA-256 digest of the input, so block keys of any length
/// spread over the whole AES key.
#[must_use]
pub fn derive_encryption_key(input_key: &[u8]) -> [u8; ENCRYPTION_KEY_SIZE] {
    <Sha256 as Digest>::digest(input_key).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &[u8] = b"test_secret_key_for_hmac_testing_32b";

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = derive_encryption_key(b"block-key");
        let sealed = encrypt_bytes(b"hello world", &key).unwrap();
        assert_ne!(&sealed[NONCE_SIZE..], b"hello world");

        let opened = decrypt_bytes(&sealed, &key).unwrap();
        assert_eq!(opened, b"hello world");
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let sealed = encrypt_bytes(b"secret", &derive_encryption_key(b"one")).unwrap();
        assert!(decrypt_bytes(&sealed, &derive_encryption_key(b"two")).is_err());
    }

    #[test]
    fn test_decrypt_short_input_fails() {
        let key = derive_encryption_key(b"k");
        let err = decrypt_bytes(&[1, 2, 3], &key).unwrap_err();
        assert!(err.to_string().contains("Invalid data length"));
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        assert!(encrypt_bytes(b"x", b"short").is_err());
    }

    #[test]
    fn test_hmac_sign_and_verify() {
        let tag = hmac_sign(b"name|1|payload", TEST_SECRET).unwrap();
        assert_eq!(tag.len(), MAC_SIZE);
        assert!(hmac_verify(b"name|1|payload", &tag, TEST_SECRET));
        assert!(!hmac_verify(b"name|1|payloaX", &tag, TEST_SECRET));
        assert!(!hmac_verify(b"name|1|payload", &tag, b"another key"));
    }

    #[test]
    fn test_derive_encryption_key_is_deterministic() {
        assert_eq!(derive_encryption_key(b"abc"), derive_encryption_key(b"abc"));
        assert_ne!(derive_encryption_key(b"abc"), derive_encryption_key(b"abd"));
    }

    #[test]
    fn test_derive_encryption_key_hashes_short_keys() {
        let key = derive_encryption_key(b"abc");
        let hex: String = key.iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(
            hex,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );

        assert_ne!(derive_encryption_key(b"b"), derive_encryption_key(b"bb"));
        assert_ne!(derive_encryption_key(&[]), [0u8; ENCRYPTION_KEY_SIZE]);
    }

    #[test]
    fn test_generate_secret_length() {
        let secret = generate_secret(32);
        let decoded = general_purpose::STANDARD.decode(secret).unwrap();
        assert_eq!(decoded.len(), 32);
    }
}
