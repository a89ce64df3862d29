//! Service account flow with domain-wide delegation
//!
//! Signs an RS256 assertion with the service account key and exchanges it
//! for a session acting as the configured administrator. Nothing is stored
//! locally; every bootstrap derives a fresh session from the key material.

use super::oauth::{SessionOrigin, request_token, session_from_response};
use super::provider::SessionProvider;
use super::types::{AuthSession, GOOGLE_TOKEN_URI, ScopeSet};
use crate::error::AuthError;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECONDS: i64 = 3600;

/// Service account key file as issued by the provider console.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let content = std::fs::read_to_string(path).map_err(|e| AuthError::ServiceAccountKey {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| AuthError::ServiceAccountKey {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub sub: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Delegated bootstrap strategy.
pub struct ServiceAccountFlow {
    key: ServiceAccountKey,
    subject: String,
    http: Client,
}

impl ServiceAccountFlow {
    pub fn new(key: ServiceAccountKey, subject: impl Into<String>, http: Client) -> Self {
        Self {
            key,
            subject: subject.into(),
            http,
        }
    }

    /// Sign the JWT-bearer assertion for `scopes`.
    pub fn build_assertion(&self, scopes: &ScopeSet) -> Result<String, AuthError> {
        let iat = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            sub: self.subject.clone(),
            scope: scopes.joined(),
            aud: self.key.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECONDS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let encoding_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| AuthError::Signing(e.to_string()))?;
        encode(&header, &claims, &encoding_key).map_err(|e| AuthError::Signing(e.to_string()))
    }
}

#[async_trait]
impl SessionProvider for ServiceAccountFlow {
    fn name(&self) -> &'static str {
        "delegated"
    }

    fn persists_sessions(&self) -> bool {
        false
    }

    fn can_rederive(&self) -> bool {
        true
    }

    async fn bootstrap(&self, scopes: &ScopeSet) -> Result<AuthSession, AuthError> {
        let assertion = self.build_assertion(scopes)?;
        let response = request_token(
            &self.http,
            &self.key.token_uri,
            &[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)],
        )
        .await?;

        info!(
            service_account = %self.key.client_email,
            subject = %self.subject,
            "Obtained delegated session"
        );

        Ok(session_from_response(
            response,
            scopes,
            SessionOrigin {
                token_uri: &self.key.token_uri,
                client_id: &self.key.client_email,
                client_secret: None,
            },
            None,
        ))
    }

    async fn refresh(
        &self,
        _session: &AuthSession,
        scopes: &ScopeSet,
    ) -> Result<AuthSession, AuthError> {
        self.bootstrap(scopes).await
    }
}
