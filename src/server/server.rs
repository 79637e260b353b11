use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::logger::*;
use crate::settings::Settings;
use std::sync::Arc;

pub struct Server {
    pub auth_repo: Arc<dyn AuthRepo<SessionPayload>>,
    real_auth_repo: Arc<RealAuthRepo<SessionPayload>>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let config = settings.auth_config()?;

        let auth_repo = match settings.auth.backend.as_str() {
            "memory" => {
                let store: Arc<dyn TokenStore<SessionPayload>> =
                    Arc::new(MemoryTokenStore::<SessionPayload>::new());
                RealAuthRepo::new(store, config)?
            }
            "redis" => {
                let redis_client = redis::Client::open(settings.redis.dsn.as_str())?;
                let redis_manager = redis_client.get_connection_manager().await?;
                RealAuthRepo::with_redis(redis_manager, config)?
            }
            other => return Err(anyhow::anyhow!("Unknown auth backend: {}", other)),
        };
        debug!(prefix = ?auth_repo.cache_key_prefix(), "auth repo ready");

        info!(backend = %settings.auth.backend, "server started");
        Ok(Self::with_repo(Arc::new(auth_repo)))
    }

    pub fn with_repo(repo: Arc<RealAuthRepo<SessionPayload>>) -> Self {
        Self {
            auth_repo: repo.clone(),
            real_auth_repo: repo,
        }
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");
        self.real_auth_repo.shutdown().await;
    }
}
