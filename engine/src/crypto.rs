//! Authenticated encryption of independent archive units.
//!
//! Every unit is sealed with AES-256-GCM under a fresh random 96-bit nonce.
//! The binary form is `[12-byte nonce][ciphertext][16-byte tag]`; inside a
//! TextConcat archive each unit is stored as a token: the URL-safe base64 of
//! that binary form followed by a newline. Units carry no state between
//! calls, so a reader can open them one at a time.

use std::fmt;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{EngineError, Result};

/// Raw key length for AES-256.
pub const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Length of the padded base64 text form of a key.
const KEY_TEXT_LEN: usize = 44;

/// A 256-bit symmetric key.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Accept either 32 raw bytes or the 44-character URL-safe base64 text of 32 bytes.
    ///
    /// # Errors
    /// Returns `InvalidKey` for any other length or undecodable text.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw = match bytes.len() {
            KEY_LEN => bytes.to_vec(),
            KEY_TEXT_LEN => URL_SAFE.decode(bytes).map_err(|e| EngineError::InvalidKey {
                reason: format!("key text is not URL-safe base64: {}", e),
            })?,
            other => {
                return Err(EngineError::InvalidKey {
                    reason: format!(
                        "expected {} raw bytes or {} base64 characters, got {} bytes",
                        KEY_LEN, KEY_TEXT_LEN, other
                    ),
                })
            }
        };

        let key: [u8; KEY_LEN] = raw.try_into().map_err(|raw: Vec<u8>| EngineError::InvalidKey {
            reason: format!("decoded key is {} bytes, expected {}", raw.len(), KEY_LEN),
        })?;
        Ok(EncryptionKey(key))
    }

    /// Fresh key from the operating system RNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        EncryptionKey(key)
    }

    /// Padded URL-safe base64 text form, accepted back by [`EncryptionKey::from_bytes`].
    pub fn to_text(&self) -> String {
        URL_SAFE.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Generate a new key in its text form.
pub fn generate_key() -> String {
    EncryptionKey::generate().to_text()
}

/// Encrypts and decrypts independent units under one key.
pub struct CryptoCodec {
    cipher: Aes256Gcm,
}

impl CryptoCodec {
    pub fn new(key: &EncryptionKey) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| {
            EngineError::InvalidKey {
                reason: "cipher rejected key length".to_string(),
            }
        })?;
        Ok(CryptoCodec { cipher })
    }

    /// Build a codec straight from caller-supplied key material.
    pub fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
        CryptoCodec::new(&EncryptionKey::from_bytes(bytes)?)
    }

    /// Seal one unit: `[nonce][ciphertext || tag]`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| EngineError::InvalidKey {
                reason: "encryption failed".to_string(),
            })?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Open one unit produced by [`CryptoCodec::encrypt`].
    ///
    /// # Errors
    /// Returns `Decryption` for truncated, tampered, or foreign-key input.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(EngineError::Decryption);
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| EngineError::Decryption)
    }

    /// Seal one unit as a newline-terminated text token.
    pub fn encrypt_token(&self, plaintext: &[u8]) -> Result<String> {
        let sealed = self.encrypt(plaintext)?;
        let mut token = URL_SAFE_NO_PAD.encode(sealed);
        token.push('\n');
        Ok(token)
    }

    /// Open one text token (surrounding whitespace ignored).
    pub fn decrypt_token(&self, token: &str) -> Result<Vec<u8>> {
        let sealed = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| EngineError::Decryption)?;
        self.decrypt(&sealed)
    }
}

/// Encrypt a single unit with caller-supplied key material.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    CryptoCodec::from_key_bytes(key)?.encrypt(plaintext)
}

/// Decrypt a single unit with caller-supplied key material.
pub fn decrypt(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    CryptoCodec::from_key_bytes(key)?.decrypt(ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_codec() -> CryptoCodec {
        CryptoCodec::from_key_bytes(&[0x11; KEY_LEN]).expect("Failed to build codec")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let codec = test_codec();
        let sealed = codec.encrypt(b"secret message").expect("Failed to encrypt");
        assert_eq!(sealed.len(), NONCE_LEN + 14 + TAG_LEN);
        let opened = codec.decrypt(&sealed).expect("Failed to decrypt");
        assert_eq!(opened, b"secret message");
    }

    #[test]
    fn test_each_call_uses_fresh_nonce() {
        let codec = test_codec();
        let first = codec.encrypt(b"same").expect("Failed to encrypt");
        let second = codec.encrypt(b"same").expect("Failed to encrypt");
        assert_ne!(first, second);
    }

    #[test]
    fn test_tampered_unit_is_rejected() {
        let codec = test_codec();
        let mut sealed = codec.encrypt(b"secret message").expect("Failed to encrypt");
        sealed[NONCE_LEN + 2] ^= 0xFF;
        assert!(matches!(codec.decrypt(&sealed), Err(EngineError::Decryption)));
    }

    #[test]
    fn test_truncated_unit_is_rejected() {
        let codec = test_codec();
        let sealed = codec.encrypt(b"secret message").expect("Failed to encrypt");
        assert!(matches!(
            codec.decrypt(&sealed[..sealed.len() - 1]),
            Err(EngineError::Decryption)
        ));
        assert!(matches!(codec.decrypt(&[0u8; 20]), Err(EngineError::Decryption)));
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let sealed = encrypt(&[0x11; KEY_LEN], b"payload").expect("Failed to encrypt");
        let result = decrypt(&[0x22; KEY_LEN], &sealed);
        assert!(matches!(result, Err(EngineError::Decryption)));
    }

    #[test]
    fn test_malformed_key_is_invalid() {
        assert!(matches!(
            CryptoCodec::from_key_bytes(b"short"),
            Err(EngineError::InvalidKey { .. })
        ));
        let bad_text = [b'!'; KEY_TEXT_LEN];
        assert!(matches!(
            EncryptionKey::from_bytes(&bad_text),
            Err(EngineError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_key_text_roundtrip() {
        let key = EncryptionKey::generate();
        let text = key.to_text();
        assert_eq!(text.len(), KEY_TEXT_LEN);
        let parsed = EncryptionKey::from_bytes(text.as_bytes()).expect("Failed to parse key");
        assert_eq!(parsed, key);
        assert_eq!(format!("{:?}", parsed), "EncryptionKey(<redacted>)");
    }

    #[test]
    fn test_token_roundtrip_and_tamper() {
        let codec = test_codec();
        let token = codec.encrypt_token(b"--- a.txt ---\n").expect("Failed to encrypt");
        assert!(token.ends_with('\n'));
        assert!(!token.trim_end().contains('\n'));
        assert_eq!(
            codec.decrypt_token(&token).expect("Failed to decrypt"),
            b"--- a.txt ---\n"
        );

        let mut bytes = token.into_bytes();
        bytes[10] = if bytes[10] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).expect("token is ASCII");
        assert!(matches!(codec.decrypt_token(&tampered), Err(EngineError::Decryption)));
    }
}
