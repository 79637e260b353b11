/// Symmetric cipher protecting refresh-token payloads.
pub trait Encryptor: Send + Sync {
    fn encrypt_to_string(&self, plaintext: &str, key: &str) -> Result<String, EncryptorError>;
    fn decrypt_to_string(&self, ciphertext: &str, key: &str) -> Result<String, EncryptorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EncryptorError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("malformed ciphertext: {0}")]
    Malformed(String),
    #[error("cipher failure")]
    Cipher,
}
