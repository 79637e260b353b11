use serde::{Deserialize, Serialize};
use std::fmt;

/// Concurrent-login policy attached to a session payload.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoginLimit {
    #[default]
    Unlimited,
    /// One live session per account.
    OnlyOne,
    /// One live session per account and platform.
    PlatformOne,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoginPlatform(pub String);

impl LoginPlatform {
    pub fn new(platform: impl Into<String>) -> Self {
        LoginPlatform(platform.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LoginPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LoginPlatform {
    fn from(value: &str) -> Self {
        LoginPlatform(value.to_owned())
    }
}
