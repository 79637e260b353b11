use crate::application_impl::AuthConfig;
use crate::domain_port::AuthCacheKeyPrefix;
use anyhow::{Result, anyhow};
use config::{Config, Environment, File};
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub auth: Auth,
    pub redis: Redis,
    pub http: Http,
    pub log: Log,
}

#[derive(Deserialize)]
pub struct Auth {
    pub backend: String, // "memory" or "redis"
    pub sign_key: String,
    #[serde(default)]
    pub signing_method: Option<String>,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    #[serde(default)]
    pub cache_key_prefix: Option<AuthCacheKeyPrefix>,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("backend", &self.backend)
            .field("sign_key", &"<redacted>")
            .field("signing_method", &self.signing_method)
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("cache_key_prefix", &self.cache_key_prefix)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct Redis {
    pub dsn: String,
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    // Plain HTTP unless both are set.
    #[serde(default)]
    pub cert_path: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

/// `SESSIONGATE__AUTH__SIGN_KEY=...` overrides `auth.sign_key`.
const ENV_PREFIX: &str = "SESSIONGATE";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}

impl Settings {
    pub fn auth_config(&self) -> Result<AuthConfig> {
        let signing_method = self
            .auth
            .signing_method
            .as_deref()
            .filter(|m| !m.is_empty())
            .map(Algorithm::from_str)
            .transpose()
            .map_err(|e| anyhow!("auth.signing_method: {e}"))?;

        Ok(AuthConfig {
            signing_method,
            sign_key: self.auth.sign_key.clone(),
            access_ttl: Duration::from_secs(self.auth.access_ttl_secs),
            refresh_ttl: Duration::from_secs(self.auth.refresh_ttl_secs),
            refresh_cipher: None,
            cache_key_prefix: self.auth.cache_key_prefix.clone(),
        })
    }
}
