//! Authorization session manager
//!
//! Decides, once per run, how the shared session is obtained:
//!
//! 1. A stored session that is unexpired and bound to exactly the requested
//!    scopes is reused as-is.
//! 2. Otherwise a stored refresh token is exchanged for a session bound to the
//!    requested scopes.
//! 3. Otherwise the configured provider bootstraps a new session.
//!
//! Interactive sessions are written back to the token store after any
//! change. Delegated sessions are never persisted.

use super::delegated::{ServiceAccountFlow, ServiceAccountKey};
use super::installed::{ClientSecrets, InstalledAppFlow};
use super::provider::SessionProvider;
use super::session::SessionHandle;
use super::store::TokenStore;
use super::types::{AuthSession, AuthStrategy, ScopeSet};
use crate::error::AuthError;
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct AuthSessionManager {
    provider: Arc<dyn SessionProvider>,
    store: Option<TokenStore>,
    scopes: ScopeSet,
}

impl AuthSessionManager {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        store: Option<TokenStore>,
        scopes: ScopeSet,
    ) -> Self {
        Self {
            provider,
            store,
            scopes,
        }
    }

    /// Build the manager for a configured strategy.
    ///
    /// Credential files are read here so a misconfiguration surfaces before
    /// any account is touched.
    pub fn from_strategy(
        strategy: &AuthStrategy,
        scopes: ScopeSet,
        http: Client,
    ) -> Result<Self, AuthError> {
        match strategy {
            AuthStrategy::Interactive {
                client_secrets,
                token_store,
            } => {
                let secrets = ClientSecrets::load(client_secrets)?;
                Ok(Self::new(
                    Arc::new(InstalledAppFlow::new(secrets, http)),
                    Some(TokenStore::new(token_store)),
                    scopes,
                ))
            }
            AuthStrategy::Delegated {
                service_account_key,
                admin_subject,
            } => {
                let key = ServiceAccountKey::load(service_account_key)?;
                Ok(Self::new(
                    Arc::new(ServiceAccountFlow::new(key, admin_subject.clone(), http)),
                    None,
                    scopes,
                ))
            }
        }
    }

    pub fn scopes(&self) -> &ScopeSet {
        &self.scopes
    }

    pub fn strategy_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn store(&self) -> Option<&TokenStore> {
        self.store.as_ref()
    }

    /// Establish the session and wrap it in a handle shared by every remote
    /// call of the run.
    pub async fn acquire(&self) -> Result<SessionHandle, AuthError> {
        let session = self.establish().await?;
        Ok(SessionHandle::new(session, self.clone()))
    }

    /// Obtain a session for the requested scopes, reusing or refreshing the
    /// stored one when possible.
    pub async fn establish(&self) -> Result<AuthSession, AuthError> {
        if let Some(stored) = self.load_stored().await {
            if stored.is_valid_for(&self.scopes, Utc::now()) {
                info!(strategy = self.provider.name(), "Reusing stored session");
                return Ok(stored);
            }

            if stored.can_refresh() {
                debug!(
                    stored_scopes = %stored.scopes,
                    requested_scopes = %self.scopes,
                    "Stored session unusable, refreshing"
                );
                match self.refresh(&stored).await {
                    Ok(session) => {
                        self.persist_or_warn(&session).await;
                        info!(strategy = self.provider.name(), "Refreshed stored session");
                        return Ok(session);
                    }
                    Err(e) => {
                        warn!(error = %e, "Refresh failed, starting a new authorization");
                    }
                }
            }
        }

        let session = self.bootstrap().await?;
        self.persist_or_warn(&session).await;
        Ok(session)
    }

    /// Run the provider's bootstrap unconditionally and persist the result.
    ///
    /// Unlike [`AuthSessionManager::establish`], a session that cannot be
    /// written to the token store is an error.
    pub async fn login(&self) -> Result<AuthSession, AuthError> {
        let session = self.bootstrap().await?;
        self.persist(&session).await?;
        Ok(session)
    }

    async fn bootstrap(&self) -> Result<AuthSession, AuthError> {
        info!(
            strategy = self.provider.name(),
            scopes = %self.scopes,
            "Bootstrapping new session"
        );
        self.provider.bootstrap(&self.scopes).await
    }

    /// Replace a session that expired mid-run.
    ///
    /// Interactive sessions only renew through their refresh token; a new
    /// consent is never started in the middle of a batch.
    pub async fn renew(&self, current: &AuthSession) -> Result<AuthSession, AuthError> {
        if current.can_refresh() {
            let session = self.refresh(current).await?;
            self.persist_or_warn(&session).await;
            return Ok(session);
        }

        if self.provider.can_rederive() {
            return self.provider.bootstrap(&self.scopes).await;
        }

        Err(AuthError::RefreshUnavailable(
            "session has no refresh token and re-authorization requires consent".to_string(),
        ))
    }

    async fn refresh(&self, session: &AuthSession) -> Result<AuthSession, AuthError> {
        let mut refreshed = self.provider.refresh(session, &self.scopes).await?;
        if !refreshed.scopes.contains_all(&self.scopes) {
            return Err(AuthError::RefreshUnavailable(format!(
                "granted scopes '{}' do not cover '{}'",
                refreshed.scopes, self.scopes
            )));
        }
        refreshed.scopes = self.scopes.clone();
        Ok(refreshed)
    }

    async fn load_stored(&self) -> Option<AuthSession> {
        let store = self.store.as_ref()?;
        match store.load().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable token store");
                None
            }
        }
    }

    async fn persist(&self, session: &AuthSession) -> Result<(), AuthError> {
        if !self.provider.persists_sessions() {
            return Ok(());
        }
        match &self.store {
            Some(store) => store.save(session).await,
            None => Ok(()),
        }
    }

    /// The session is still usable for this run when the store write fails.
    async fn persist_or_warn(&self, session: &AuthSession) {
        if let Err(e) = self.persist(session).await {
            warn!(error = %e, "Failed to persist session");
        }
    }
}

impl std::fmt::Debug for AuthSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSessionManager")
            .field("strategy", &self.provider.name())
            .field("store", &self.store)
            .field("scopes", &self.scopes)
            .finish()
    }
}
