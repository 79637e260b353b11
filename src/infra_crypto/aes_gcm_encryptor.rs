use crate::domain_port::{Encryptor, EncryptorError};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit as AeadKeyInit},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD as BASE64};
use hmac::{Hmac, KeyInit, Mac};
use rand::RngCore;
use sha2::Sha256;

/// 96-bit GCM nonce.
const NONCE_SIZE: usize = 12;

const KEY_LABEL: &[u8] = b"sessiongate/refresh-token";

/// AES-256-GCM over the refresh-claims string.
///
/// The cipher key is HMAC-SHA256(sign key, label), so any non-empty secret
/// works. Output is URL-safe base64 of `nonce || ciphertext`.
#[derive(Debug, Default, Clone)]
pub struct AesGcmEncryptor;

impl AesGcmEncryptor {
    pub fn new() -> Self {
        Self
    }

    fn cipher(key: &str) -> Result<Aes256Gcm, EncryptorError> {
        if key.is_empty() {
            return Err(EncryptorError::InvalidKey("empty key".to_string()));
        }
        let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
            .map_err(|e| EncryptorError::InvalidKey(e.to_string()))?;
        mac.update(KEY_LABEL);
        let derived = mac.finalize().into_bytes();
        <Aes256Gcm as AeadKeyInit>::new_from_slice(&derived[..])
            .map_err(|e| EncryptorError::InvalidKey(e.to_string()))
    }
}

impl Encryptor for AesGcmEncryptor {
    fn encrypt_to_string(&self, plaintext: &str, key: &str) -> Result<String, EncryptorError> {
        let cipher = Self::cipher(key)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| EncryptorError::Cipher)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    fn decrypt_to_string(&self, ciphertext: &str, key: &str) -> Result<String, EncryptorError> {
        let cipher = Self::cipher(key)?;

        let raw = BASE64
            .decode(ciphertext.trim())
            .map_err(|e| EncryptorError::Malformed(e.to_string()))?;
        if raw.len() <= NONCE_SIZE {
            return Err(EncryptorError::Malformed("ciphertext too short".to_string()));
        }
        let (nonce_bytes, body) = raw.split_at(NONCE_SIZE);

        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), body)
            .map_err(|_| EncryptorError::Cipher)?;

        String::from_utf8(plaintext).map_err(|e| EncryptorError::Malformed(e.to_string()))
    }
}
