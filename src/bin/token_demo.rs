//! Two devices, one account, `ONLY_ONE` login limit, all in memory.
//!
//! $ cargo run --bin token_demo

use sessiongate::application_impl::*;
use sessiongate::application_port::*;
use sessiongate::domain_model::*;
use sessiongate::infra_memory::MemoryTokenStore;
use sessiongate::logger::*;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logger = Logger::new_bootstrap();
    logger.reload_from_config(&LogConfig {
        filter: "sessiongate=debug,info".to_string(),
    })?;

    let store = Arc::new(MemoryTokenStore::<SessionPayload>::new());
    let repo = RealAuthRepo::<SessionPayload>::new(
        store,
        AuthConfig {
            sign_key: "token-demo-key".to_string(),
            ..AuthConfig::default()
        },
    )?;

    let laptop = SessionPayload::new("alice", "web", LoginLimit::OnlyOne);
    let (laptop_tokens, _) = repo.sign_token(Claims::new(laptop)).await?;
    repo.drain_background().await;
    info!("laptop signed in");

    let phone = SessionPayload::new("alice", "ios", LoginLimit::OnlyOne);
    let (phone_tokens, _) = repo.sign_token(Claims::new(phone)).await?;
    repo.drain_background().await;
    info!("phone signed in");

    for (device, tokens) in [("laptop", &laptop_tokens), ("phone", &phone_tokens)] {
        let claims = repo.decode_access_token(&tokens.access_token).await?;
        match repo.verify_token(&claims).await {
            Ok(()) => info!(device, "access token accepted"),
            Err(e) => warn!(device, error = %e, "access token refused"),
        }
    }

    match repo.refresh_token(&laptop_tokens.refresh_token).await {
        Ok(_) => warn!("laptop refresh unexpectedly accepted"),
        Err(e) => info!(error = %e, "laptop refresh refused"),
    }

    let (rotated, _) = repo.refresh_token(&phone_tokens.refresh_token).await?;
    info!(expires_at = %rotated.access_token_expires_at, "phone rotated its pair");

    repo.shutdown().await;
    Ok(())
}
