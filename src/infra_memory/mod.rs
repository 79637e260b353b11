mod token_store_memory;

pub use token_store_memory::*;
