//! Error taxonomy
//!
//! [`AuthError`] is fatal for a run: without a session no account can be
//! processed. Everything else is contained at the account boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to obtain, persist, or renew the shared authorization session.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid client secrets file {path}: {message}")]
    ClientSecrets { path: PathBuf, message: String },

    #[error("Invalid service account key {path}: {message}")]
    ServiceAccountKey { path: PathBuf, message: String },

    #[error("Token store {path}: {message}")]
    Store { path: PathBuf, message: String },

    #[error("Consent flow failed: {0}")]
    Consent(String),

    #[error("Authorization response state did not match the request")]
    StateMismatch,

    #[error("Token endpoint returned {status}: {error}{}", .description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    TokenEndpoint {
        status: u16,
        error: String,
        description: Option<String>,
    },

    #[error("Failed to sign assertion: {0}")]
    Signing(String),

    #[error("HTTP error talking to token endpoint: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session expired and cannot be renewed: {0}")]
    RefreshUnavailable(String),
}

/// Failure of a single remote directory or mail call.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("{operation} failed with status {status}: {message}")]
    Status {
        operation: &'static str,
        status: u16,
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("{operation} failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} returned an unexpected body: {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
}

impl RemoteError {
    /// HTTP status of the failed call, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-requested delay before retrying, in seconds.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            RemoteError::Status {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            RemoteError::Transport { source, .. } => source.is_timeout() || source.is_connect(),
            RemoteError::Decode { .. } => false,
        }
    }
}

/// Secret generation failure.
#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Password length must be at least 1")]
    InvalidLength,

    #[error("Secure random source unavailable: {0}")]
    RandomSource(String),
}

/// Directory call failure for one account.
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error(transparent)]
    Session(#[from] AuthError),
}

/// Notification failure for one recipient.
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Template not found: {0}")]
    TemplateMissing(PathBuf),

    #[error("Failed to read template {path}: {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build message: {0}")]
    Message(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Session(#[from] AuthError),
}
