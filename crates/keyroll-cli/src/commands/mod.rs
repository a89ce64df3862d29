pub mod auth;
pub mod rotate;
pub mod team_mail;

use anyhow::{Context, Result};
use keyroll_core::auth::{AuthSessionManager, ScopeSet, SessionHandle, UseCase};
use keyroll_core::config::KeyrollConfig;
use reqwest::Client;
use std::sync::Arc;

/// Establish the shared session for a run.
pub async fn acquire_session(
    config: &KeyrollConfig,
    use_case: UseCase,
    http: Client,
) -> Result<Arc<SessionHandle>> {
    let manager =
        AuthSessionManager::from_strategy(&config.auth, ScopeSet::for_use_case(use_case), http)?;
    let session = manager
        .acquire()
        .await
        .context("Failed to establish authorization session")?;
    Ok(Arc::new(session))
}
