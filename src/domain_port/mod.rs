// store

mod token_store;

pub use token_store::*;

// crypto

mod encryptor;

pub use encryptor::*;
