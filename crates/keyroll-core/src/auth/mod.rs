//! Authorization session management
//!
//! This module provides the single delegated session shared by a run:
//! - Installed-app consent flow with a persisted, refreshable session
//! - Service account flow with domain-wide delegation
//! - Scope-exact reuse of stored sessions and refresh-based downscoping
//! - Mid-run renewal behind the [`TokenSource`] seam

pub mod delegated;
pub mod installed;
pub mod manager;
pub mod oauth;
pub mod provider;
pub mod session;
pub mod store;
pub mod types;

pub use delegated::{ServiceAccountFlow, ServiceAccountKey};
pub use installed::{ClientSecrets, ConsentPrompt, InstalledAppFlow, LoopbackReceiver, StderrPrompt};
pub use manager::AuthSessionManager;
pub use provider::SessionProvider;
pub use session::{SessionHandle, StaticToken, TokenSource};
pub use store::TokenStore;
pub use types::{
    AuthSession, AuthStrategy, DIRECTORY_USER_SCOPE, GMAIL_SEND_SCOPE, ScopeSet, UseCase,
};
