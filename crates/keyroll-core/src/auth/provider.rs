use super::types::{AuthSession, ScopeSet};
use crate::error::AuthError;
use async_trait::async_trait;

/// A way of minting and renewing sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether sessions from this provider belong in the token store.
    fn persists_sessions(&self) -> bool;

    /// Whether an expired session may be replaced by a fresh bootstrap
    /// without operator interaction.
    fn can_rederive(&self) -> bool;

    async fn bootstrap(&self, scopes: &ScopeSet) -> Result<AuthSession, AuthError>;

    async fn refresh(
        &self,
        session: &AuthSession,
        scopes: &ScopeSet,
    ) -> Result<AuthSession, AuthError>;
}
