//! Authenticated cookie codec
//!
//! Values are serialized to JSON, optionally encrypted with AES-256-GCM, and
//! signed with HMAC-SHA256 together with the cookie name and a timestamp:
//!
//! ```text
//! base64url( timestamp "|" base64url(payload) "|" hmac(name "|" timestamp "|" base64url(payload)) )
//! ```
//!
//! A [`CodecSet`] holds an ordered list of codecs built from key pairs. The first
//! codec encodes, every codec is tried when decoding, which allows keys to be
//! rotated without invalidating cookies issued under an older key.

use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::utils::crypto::{
    decrypt_bytes, derive_encryption_key, encrypt_bytes, hmac_sign, hmac_verify,
    ENCRYPTION_KEY_SIZE, MAC_SIZE,
};

/// Default maximum age of an encoded value (30 days)
pub const DEFAULT_MAX_AGE_SECONDS: i64 = 86_400 * 30;

/// Default maximum length of an encoded value; browsers cap cookies at 4 KiB
pub const DEFAULT_MAX_LENGTH: usize = 4096;

/// Timestamps further in the future than this are rejected
const MAX_CLOCK_SKEW_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("the value is not valid: signature mismatch")]
    InvalidSignature,
    #[error("the value is not valid: timestamp expired")]
    Expired,
    #[error("the value is not valid: {0}")]
    Malformed(String),
    #[error("the value is too long")]
    ValueTooLong,
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("no codecs were provided")]
    NoKeys,
}

/// Secret key material for one codec
#[derive(Clone)]
pub struct KeyPair {
    /// HMAC key, any length (32 or 64 random bytes recommended)
    pub hash_key: Vec<u8>,
    /// Optional encryption key; normalized to 32 bytes
    pub block_key: Option<Vec<u8>>,
}

impl KeyPair {
    #[must_use]
    pub fn new(hash_key: impl Into<Vec<u8>>, block_key: Option<Vec<u8>>) -> Self {
        Self {
            hash_key: hash_key.into(),
            block_key,
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("hash_key", &"<redacted>")
            .field("block_key", &self.block_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A single signing (and optionally encrypting) codec
#[derive(Clone)]
pub struct SecureCookie {
    hash_key: Vec<u8>,
    block_key: Option<[u8; ENCRYPTION_KEY_SIZE]>,
    max_age: i64,
    max_length: usize,
}

impl SecureCookie {
    #[must_use]
    pub fn new(pair: &KeyPair) -> Self {
        Self {
            hash_key: pair.hash_key.clone(),
            block_key: pair
                .block_key
                .as_deref()
                .filter(|key| !key.is_empty())
                .map(derive_encryption_key),
            max_age: DEFAULT_MAX_AGE_SECONDS,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }

    /// Encode `value` for the cookie called `name`
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or encryption fails, or if the encoded
    /// value exceeds the configured maximum length.
    pub fn encode<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<String, CodecError> {
        let serialized =
            serde_json::to_vec(value).map_err(|e| CodecError::Serialization(e.to_string()))?;

        let payload_bytes = match &self.block_key {
            Some(key) => {
                encrypt_bytes(&serialized, key).map_err(|e| CodecError::Encryption(e.to_string()))?
            }
            None => serialized,
        };
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(payload_bytes);

        let timestamp = Utc::now().timestamp();
        let mac = hmac_sign(
            format!("{name}|{timestamp}|{payload}").as_bytes(),
            &self.hash_key,
        )
        .map_err(|e| CodecError::Encryption(e.to_string()))?;

        let mut raw = format!("{timestamp}|{payload}|").into_bytes();
        raw.extend_from_slice(&mac);
        let encoded = general_purpose::URL_SAFE_NO_PAD.encode(raw);

        if self.max_length != 0 && encoded.len() > self.max_length {
            return Err(CodecError::ValueTooLong);
        }
        Ok(encoded)
    }

    /// Decode and authenticate a value previously produced by [`SecureCookie::encode`]
    ///
    /// The signature is verified before the payload is decrypted or deserialized.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidSignature`] on a MAC mismatch,
    /// [`CodecError::Expired`] when the timestamp is older than the maximum age,
    /// and [`CodecError::Malformed`] for truncated or otherwise invalid input.
    pub fn decode<T: DeserializeOwned>(&self, name: &str, value: &str) -> Result<T, CodecError> {
        if self.max_length != 0 && value.len() > self.max_length {
            return Err(CodecError::ValueTooLong);
        }

        let raw = general_purpose::URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|_| CodecError::Malformed("invalid base64".to_string()))?;

        let mut parts = raw.splitn(3, |b| *b == b'|');
        let (Some(timestamp), Some(payload), Some(mac)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CodecError::Malformed("missing fields".to_string()));
        };
        if mac.len() != MAC_SIZE {
            return Err(CodecError::Malformed("truncated signature".to_string()));
        }

        let mut signed = Vec::with_capacity(name.len() + timestamp.len() + payload.len() + 2);
        signed.extend_from_slice(name.as_bytes());
        signed.push(b'|');
        signed.extend_from_slice(timestamp);
        signed.push(b'|');
        signed.extend_from_slice(payload);
        if !hmac_verify(&signed, mac, &self.hash_key) {
            return Err(CodecError::InvalidSignature);
        }

        let timestamp: i64 = std::str::from_utf8(timestamp)
            .ok()
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| CodecError::Malformed("invalid timestamp".to_string()))?;
        let now = Utc::now().timestamp();
        if timestamp > now + MAX_CLOCK_SKEW_SECONDS {
            return Err(CodecError::Malformed("timestamp too new".to_string()));
        }
        if self.max_age != 0 && timestamp < now - self.max_age {
            return Err(CodecError::Expired);
        }

        let payload = general_purpose::URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| CodecError::Malformed("invalid payload encoding".to_string()))?;
        let plaintext = match &self.block_key {
            Some(key) => {
                decrypt_bytes(&payload, key).map_err(|e| CodecError::Encryption(e.to_string()))?
            }
            None => payload,
        };

        serde_json::from_slice(&plaintext).map_err(|e| CodecError::Serialization(e.to_string()))
    }
}

/// Ordered set of codecs supporting key rotation
#[derive(Clone)]
pub struct CodecSet {
    codecs: Vec<SecureCookie>,
}

impl CodecSet {
    /// Build one codec per key pair, newest first
    #[must_use]
    pub fn from_key_pairs(pairs: &[KeyPair]) -> Self {
        Self {
            codecs: pairs.iter().map(SecureCookie::new).collect(),
        }
    }

    /// Set the maximum age, in seconds, on every codec; 0 disables the check
    #[must_use]
    pub fn with_max_age(mut self, seconds: i64) -> Self {
        for codec in &mut self.codecs {
            codec.max_age = seconds;
        }
        self
    }

    /// Set the maximum encoded length on every codec; 0 disables the check
    #[must_use]
    pub fn with_max_length(mut self, length: usize) -> Self {
        for codec in &mut self.codecs {
            codec.max_length = length;
        }
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    /// Encode with the primary (first) codec
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::NoKeys`] when the set is empty, or the primary codec's error.
    pub fn encode<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<String, CodecError> {
        self.codecs
            .first()
            .ok_or(CodecError::NoKeys)?
            .encode(name, value)
    }

    /// Decode with each codec in order until one succeeds
    ///
    /// # Errors
    ///
    /// When every codec fails, returns the most specific failure: an error from a
    /// codec whose signature check passed is preferred over
    /// [`CodecError::InvalidSignature`].
    pub fn decode<T: DeserializeOwned>(&self, name: &str, value: &str) -> Result<T, CodecError> {
        let mut failure: Option<CodecError> = None;
        for codec in &self.codecs {
            match codec.decode(name, value) {
                Ok(decoded) => return Ok(decoded),
                Err(e) => {
                    let replace = match &failure {
                        None => true,
                        Some(CodecError::InvalidSignature) => e != CodecError::InvalidSignature,
                        Some(_) => false,
                    };
                    if replace {
                        failure = Some(e);
                    }
                }
            }
        }
        Err(failure.unwrap_or(CodecError::NoKeys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn signing_only(key: &str) -> KeyPair {
        KeyPair::new(key.as_bytes(), None)
    }

    fn encrypting(key: &str, block: &str) -> KeyPair {
        KeyPair::new(key.as_bytes(), Some(block.as_bytes().to_vec()))
    }

    #[test]
    fn test_roundtrip_signed_and_encrypted() {
        for pair in [signing_only("hash-key"), encrypting("hash-key", "block-key")] {
            let codecs = CodecSet::from_key_pairs(&[pair]);
            let encoded = codecs.encode("session", "0123456789abcdef").unwrap();
            let decoded: String = codecs.decode("session", &encoded).unwrap();
            assert_eq!(decoded, "0123456789abcdef");
        }
    }

    #[test]
    fn test_roundtrip_map_value() {
        let codecs = CodecSet::from_key_pairs(&[encrypting("h", "b")]);
        let mut values = HashMap::new();
        values.insert("user".to_string(), serde_json::json!({"id": 7}));
        let encoded = codecs.encode("s", &values).unwrap();
        let decoded: HashMap<String, serde_json::Value> = codecs.decode("s", &encoded).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_encrypted_payload_hides_plaintext() {
        let codecs = CodecSet::from_key_pairs(&[encrypting("h", "b")]);
        let encoded = codecs.encode("s", "visible-secret").unwrap();
        let raw = general_purpose::URL_SAFE_NO_PAD.decode(encoded).unwrap();
        let raw = String::from_utf8_lossy(&raw);
        assert!(!raw.contains("visible-secret"));
    }

    #[test]
    fn test_unknown_key_fails_with_invalid_signature() {
        let issuer = CodecSet::from_key_pairs(&[signing_only("issuer")]);
        let other = CodecSet::from_key_pairs(&[signing_only("stranger")]);
        let encoded = issuer.encode("s", "id").unwrap();
        assert_eq!(
            other.decode::<String>("s", &encoded),
            Err(CodecError::InvalidSignature)
        );
    }

    #[test]
    fn test_cookie_name_is_authenticated() {
        let codecs = CodecSet::from_key_pairs(&[signing_only("k")]);
        let encoded = codecs.encode("session", "id").unwrap();
        assert_eq!(
            codecs.decode::<String>("other", &encoded),
            Err(CodecError::InvalidSignature)
        );
    }

    #[test]
    fn test_any_flipped_byte_is_rejected() {
        let codecs = CodecSet::from_key_pairs(&[encrypting("h", "b")]);
        let encoded = codecs.encode("s", "abcdef0123456789").unwrap();
        let bytes = encoded.as_bytes();
        for i in 0..bytes.len() {
            let mut tampered = bytes.to_vec();
            tampered[i] = if tampered[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(tampered).unwrap();
            assert!(
                codecs.decode::<String>("s", &tampered).is_err(),
                "tampering at byte {i} was not detected"
            );
        }
    }

    #[test]
    fn test_truncated_input_is_malformed() {
        let codecs = CodecSet::from_key_pairs(&[signing_only("k")]);
        let truncated = general_purpose::URL_SAFE_NO_PAD.encode(b"12345|abc");
        assert!(matches!(
            codecs.decode::<String>("s", &truncated),
            Err(CodecError::Malformed(_))
        ));
        assert!(matches!(
            codecs.decode::<String>("s", "not base64 !!"),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_expired_value_is_rejected() {
        let codecs = CodecSet::from_key_pairs(&[signing_only("k")]).with_max_age(60);
        let stale = Utc::now().timestamp() - 120;
        let payload = general_purpose::URL_SAFE_NO_PAD.encode(b"\"id\"");
        let mac = hmac_sign(format!("s|{stale}|{payload}").as_bytes(), b"k").unwrap();
        let mut raw = format!("{stale}|{payload}|").into_bytes();
        raw.extend_from_slice(&mac);
        let encoded = general_purpose::URL_SAFE_NO_PAD.encode(raw);

        assert_eq!(codecs.decode::<String>("s", &encoded), Err(CodecError::Expired));

        let lenient = CodecSet::from_key_pairs(&[signing_only("k")]).with_max_age(0);
        assert_eq!(lenient.decode::<String>("s", &encoded).unwrap(), "id");
    }

    #[test]
    fn test_key_rotation_keeps_old_cookies_valid() {
        let old_key = encrypting("old-hash", "old-block");
        let new_key = encrypting("new-hash", "new-block");

        let before = CodecSet::from_key_pairs(&[old_key.clone()]);
        let cookie = before.encode("s", "session-id").unwrap();

        let rotated = CodecSet::from_key_pairs(&[new_key.clone(), old_key]);
        assert_eq!(rotated.decode::<String>("s", &cookie).unwrap(), "session-id");

        let fresh = rotated.encode("s", "session-id").unwrap();
        let new_only = CodecSet::from_key_pairs(&[new_key]);
        assert_eq!(new_only.decode::<String>("s", &fresh).unwrap(), "session-id");
        assert!(new_only.decode::<String>("s", &cookie).is_err());
    }

    #[test]
    fn test_max_length_enforced() {
        let codecs = CodecSet::from_key_pairs(&[signing_only("k")]).with_max_length(64);
        let long = "x".repeat(200);
        assert_eq!(codecs.encode("s", &long), Err(CodecError::ValueTooLong));

        let unlimited = CodecSet::from_key_pairs(&[signing_only("k")]).with_max_length(0);
        assert!(unlimited.encode("s", &long).is_ok());
    }

    #[test]
    fn test_empty_set_reports_no_keys() {
        let codecs = CodecSet::from_key_pairs(&[]);
        assert!(codecs.is_empty());
        assert_eq!(codecs.encode("s", "v"), Err(CodecError::NoKeys));
        assert_eq!(codecs.decode::<String>("s", "v"), Err(CodecError::NoKeys));
    }

    #[test]
    fn test_key_pair_debug_redacts_secrets() {
        let debug = format!("{:?}", encrypting("super-secret", "block-secret"));
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("block-secret"));
    }
}
