mod aes_gcm_encryptor;

pub use aes_gcm_encryptor::*;
