mod claims;
mod login;
mod session;
mod token_item;

pub use claims::*;
pub use login::*;
pub use session::*;
pub use token_item::*;
