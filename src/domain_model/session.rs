use crate::domain_model::{LoginLimit, LoginPlatform};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// The part of the claims this crate looks into. Everything else in a payload
/// is carried through signing and storage untouched.
pub trait ClaimsPayload:
    Clone + Send + Sync + Serialize + DeserializeOwned + std::fmt::Debug + 'static
{
    /// Stable account key. Token sets are scoped by it.
    fn user_identifier(&self) -> String;
    fn login_platform(&self) -> &LoginPlatform;
    fn login_limit(&self) -> LoginLimit;
}

/// Default payload shipped with the server.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, serde::Deserialize)]
pub struct SessionPayload {
    pub user_id: String,
    #[serde(default)]
    pub login_platform: LoginPlatform,
    #[serde(default)]
    pub login_limit: LoginLimit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl SessionPayload {
    pub fn new(
        user_id: impl Into<String>,
        login_platform: impl Into<LoginPlatform>,
        login_limit: LoginLimit,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            login_platform: login_platform.into(),
            login_limit,
            device_id: None,
        }
    }
}

impl ClaimsPayload for SessionPayload {
    fn user_identifier(&self) -> String {
        self.user_id.clone()
    }

    fn login_platform(&self) -> &LoginPlatform {
        &self.login_platform
    }

    fn login_limit(&self) -> LoginLimit {
        self.login_limit
    }
}
