//! Core types for the authorization session
//!
//! Defines the session, the scope sets requested per use case, and the
//! configured bootstrap strategy.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

pub const DIRECTORY_USER_SCOPE: &str = "https://www.googleapis.com/auth/admin.directory.user";
pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Sessions expiring within this window are treated as expired.
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// What a run needs access to. Each use case maps to the narrowest scope set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseCase {
    /// Rotate credentials without notifying anyone
    RotateOnly,
    /// Rotate credentials and mail the new credential to a secondary address
    RotateAndNotify,
    /// Mail-only team information broadcast
    TeamMail,
}

/// Set of OAuth scopes a session was granted or is requested with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    pub fn for_use_case(use_case: UseCase) -> Self {
        let scopes: &[&str] = match use_case {
            UseCase::RotateOnly => &[DIRECTORY_USER_SCOPE],
            UseCase::RotateAndNotify => &[DIRECTORY_USER_SCOPE, GMAIL_SEND_SCOPE],
            UseCase::TeamMail => &[GMAIL_SEND_SCOPE],
        };
        scopes.iter().copied().collect()
    }

    /// Parse the space-delimited `scope` field of a token response.
    pub fn from_space_delimited(value: &str) -> Self {
        value.split_whitespace().collect()
    }

    /// Space-delimited form used in authorization requests.
    pub fn joined(&self) -> String {
        self.0.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
    }

    pub fn contains_all(&self, other: &ScopeSet) -> bool {
        other.0.is_subset(&self.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self(iter.into_iter().map(str::to_string).collect())
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

/// Delegated access credential shared by every remote call of a run.
///
/// The serialized form is the token store file format.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthSession {
    /// Bearer token for API calls
    #[serde(rename = "token")]
    pub access_token: String,
    /// Refresh token for obtaining new access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Access token expiration time
    #[serde(rename = "expiry", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Scopes the session is bound to
    #[serde(default)]
    pub scopes: ScopeSet,
    /// Endpoint used to refresh the session
    pub token_uri: String,
    /// Client (or service account) that owns the session
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

impl AuthSession {
    /// Check if the session has expired (or is about to)
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map(|exp| exp - Duration::seconds(EXPIRY_SKEW_SECONDS) <= now)
            .unwrap_or(false)
    }

    /// Check if the session can be refreshed without user interaction
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// A session is usable for a run when it is unexpired and was created
    /// for exactly the requested scope set.
    pub fn is_valid_for(&self, scopes: &ScopeSet, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && !self.is_expired(now) && &self.scopes == scopes
    }

    /// Display-safe version of the access token
    pub fn masked_token(&self) -> String {
        let value = &self.access_token;
        let chars = value.chars().count();
        if chars <= 8 {
            return "*".repeat(chars);
        }
        let head: String = value.chars().take(4).collect();
        let tail: String = value.chars().skip(chars - 4).collect();
        format!("{head}...{tail}")
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &self.masked_token())
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .finish()
    }
}

/// How a session is bootstrapped, selected at configuration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum AuthStrategy {
    /// Installed-app consent flow; the session is persisted to `token_store`
    Interactive {
        client_secrets: PathBuf,
        token_store: PathBuf,
    },
    /// Service account impersonating `admin_subject`; nothing is persisted
    Delegated {
        service_account_key: PathBuf,
        admin_subject: String,
    },
}

impl Default for AuthStrategy {
    fn default() -> Self {
        AuthStrategy::Interactive {
            client_secrets: PathBuf::from("credentials.json"),
            token_store: PathBuf::from("token.json"),
        }
    }
}

impl AuthStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            AuthStrategy::Interactive { .. } => "interactive",
            AuthStrategy::Delegated { .. } => "delegated",
        }
    }
}

/// Successful token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Error body returned by the token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}
