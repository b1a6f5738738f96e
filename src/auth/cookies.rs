//! Authenticated encryption of cookie values with key rotation.
//!
//! Every configured key yields one codec. The first codec seals new values,
//! all of them are tried when opening, so a value sealed with a retired key
//! stays readable while that key is still listed. With no keys at all the
//! codec passes values through untouched.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

type HmacSha256 = Hmac<Sha256>;

const TIMESTAMP_LEN: usize = 8;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MAC_LEN: usize = 32;
const BLOCK_KEY_LEN: usize = 32;

/// Encoded values above this size would not fit in a browser cookie.
pub const MAX_ENCODED_LEN: usize = 4096;

/// Sealed values older than this are rejected.
pub const DEFAULT_MAX_AGE: Duration = Duration::days(30);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CookieError {
    #[error("failed to base64-decode encryption key")]
    KeyEncoding,
    #[error("expected encryption key 32 or 64 bytes, got {0}")]
    KeyLength(usize),
    #[error("the value could not be decoded")]
    Malformed,
    #[error("the value is not valid")]
    InvalidMac,
    #[error("expired timestamp")]
    Expired,
    #[error("the value could not be decrypted")]
    Decrypt,
    #[error("failed to encrypt the value")]
    Encrypt,
    #[error("the value is too long")]
    TooLong,
}

/// One key's worth of sealing material.
struct Codec {
    hash_key: Vec<u8>,
    cipher: Aes256Gcm,
    max_age: Duration,
}

impl Codec {
    fn new(key: &[u8], max_age: Duration) -> Result<Self, CookieError> {
        if key.len() != 32 && key.len() != 64 {
            return Err(CookieError::KeyLength(key.len()));
        }
        let cipher = Aes256Gcm::new_from_slice(&key[..BLOCK_KEY_LEN])
            .map_err(|_| CookieError::KeyLength(key.len()))?;
        Ok(Self {
            hash_key: key.to_vec(),
            cipher,
            max_age,
        })
    }

    fn mac(&self) -> Result<HmacSha256, CookieError> {
        <HmacSha256 as Mac>::new_from_slice(&self.hash_key)
            .map_err(|_| CookieError::KeyLength(self.hash_key.len()))
    }

    fn seal(&self, value: &str, now: OffsetDateTime) -> Result<String, CookieError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|_| CookieError::Encrypt)?;

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), value.as_bytes())
            .map_err(|_| CookieError::Encrypt)?;

        let timestamp = u64::try_from(now.unix_timestamp()).unwrap_or_default();

        let mut out = Vec::with_capacity(TIMESTAMP_LEN + NONCE_LEN + ciphertext.len() + MAC_LEN);
        out.extend_from_slice(&timestamp.to_be_bytes());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);

        let mut mac = self.mac()?;
        mac.update(&out);
        out.extend_from_slice(&mac.finalize().into_bytes());

        let encoded = Base64UrlUnpadded::encode_string(&out);
        if encoded.len() > MAX_ENCODED_LEN {
            return Err(CookieError::TooLong);
        }
        Ok(encoded)
    }

    fn open(&self, raw: &[u8], now: OffsetDateTime) -> Result<String, CookieError> {
        let (signed, tag) = raw.split_at(raw.len() - MAC_LEN);

        let mut mac = self.mac()?;
        mac.update(signed);
        mac.verify_slice(tag).map_err(|_| CookieError::InvalidMac)?;

        let (timestamp, rest) = signed.split_at(TIMESTAMP_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let mut ts = [0u8; TIMESTAMP_LEN];
        ts.copy_from_slice(timestamp);
        let issued = i64::try_from(u64::from_be_bytes(ts)).map_err(|_| CookieError::Malformed)?;
        if issued < (now - self.max_age).unix_timestamp() {
            return Err(CookieError::Expired);
        }

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CookieError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CookieError::Malformed)
    }
}

/// Ordered set of cookie codecs. Index 0 is the primary key.
pub struct SecureCookies {
    codecs: Vec<Codec>,
}

impl std::fmt::Debug for SecureCookies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureCookies")
            .field("keys", &self.codecs.len())
            .finish()
    }
}

impl SecureCookies {
    /// Build codecs from base64-encoded keys.
    ///
    /// # Errors
    ///
    /// Returns an error if a key is not valid base64 or does not decode to
    /// 32 or 64 bytes.
    pub fn new<S: AsRef<str>>(encryption_keys: &[S]) -> Result<Self, CookieError> {
        Self::with_max_age(encryption_keys, DEFAULT_MAX_AGE)
    }

    /// Same as [`SecureCookies::new`] with a custom max age for sealed values.
    ///
    /// # Errors
    ///
    /// Returns an error if any key is invalid.
    pub fn with_max_age<S: AsRef<str>>(
        encryption_keys: &[S],
        max_age: Duration,
    ) -> Result<Self, CookieError> {
        let codecs = encryption_keys
            .iter()
            .map(|encoded| {
                let key = Base64::decode_vec(encoded.as_ref().trim())
                    .map_err(|_| CookieError::KeyEncoding)?;
                Codec::new(&key, max_age)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { codecs })
    }

    /// Codec without keys: encode and decode are identity functions.
    #[must_use]
    pub fn insecure() -> Self {
        Self { codecs: Vec::new() }
    }

    #[must_use]
    pub fn is_insecure(&self) -> bool {
        self.codecs.is_empty()
    }

    #[must_use]
    pub fn key_count(&self) -> usize {
        self.codecs.len()
    }

    /// Seal `value` with the primary key.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails or the result is too long for a cookie.
    pub fn encode(&self, value: &str) -> Result<String, CookieError> {
        self.encode_at(value, OffsetDateTime::now_utc())
    }

    /// Open a value sealed by any configured key.
    ///
    /// # Errors
    ///
    /// Returns an error if no key authenticates and decrypts the value.
    pub fn decode(&self, value: &str) -> Result<String, CookieError> {
        self.decode_at(value, OffsetDateTime::now_utc())
    }

    fn encode_at(&self, value: &str, now: OffsetDateTime) -> Result<String, CookieError> {
        match self.codecs.first() {
            Some(codec) => codec.seal(value, now),
            None => Ok(value.to_string()),
        }
    }

    fn decode_at(&self, value: &str, now: OffsetDateTime) -> Result<String, CookieError> {
        if self.codecs.is_empty() {
            return Ok(value.to_string());
        }
        if value.len() > MAX_ENCODED_LEN {
            return Err(CookieError::TooLong);
        }

        let raw = Base64UrlUnpadded::decode_vec(value).map_err(|_| CookieError::Malformed)?;
        if raw.len() < TIMESTAMP_LEN + NONCE_LEN + TAG_LEN + MAC_LEN {
            return Err(CookieError::Malformed);
        }

        // A key whose MAC matched but which failed afterwards explains the
        // failure better than the keys that never matched.
        let mut failure = CookieError::InvalidMac;
        for codec in &self.codecs {
            match codec.open(&raw, now) {
                Ok(plaintext) => return Ok(plaintext),
                Err(CookieError::InvalidMac) => {}
                Err(err) => failure = err,
            }
        }
        Err(failure)
    }
}
