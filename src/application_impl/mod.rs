mod auth_repo_impl;
mod login_policy;

pub use auth_repo_impl::*;
pub use login_policy::*;
