//! Shared session handle and the bearer token seam used by remote clients.

use super::manager::AuthSessionManager;
use super::types::AuthSession;
use crate::error::AuthError;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Supplies the bearer token for every remote call.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn bearer_token(&self) -> Result<String, AuthError>;
}

/// Fixed token, for callers that manage the session themselves.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }
}

/// Session established for a run, renewed in place when it expires.
///
/// Cloning shares the same session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    session: RwLock<AuthSession>,
    manager: AuthSessionManager,
}

impl SessionHandle {
    pub fn new(session: AuthSession, manager: AuthSessionManager) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                session: RwLock::new(session),
                manager,
            }),
        }
    }

    /// Copy of the current session.
    pub async fn snapshot(&self) -> AuthSession {
        self.inner.session.read().await.clone()
    }
}

#[async_trait]
impl TokenSource for SessionHandle {
    async fn bearer_token(&self) -> Result<String, AuthError> {
        {
            let session = self.inner.session.read().await;
            if !session.is_expired(Utc::now()) {
                return Ok(session.access_token.clone());
            }
        }

        let mut session = self.inner.session.write().await;
        // Another caller may have renewed while we waited for the lock.
        if !session.is_expired(Utc::now()) {
            return Ok(session.access_token.clone());
        }

        info!("Session expired mid-run, renewing");
        let renewed = self.inner.manager.renew(&session).await?;
        *session = renewed;
        Ok(session.access_token.clone())
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("manager", &self.inner.manager)
            .finish_non_exhaustive()
    }
}
