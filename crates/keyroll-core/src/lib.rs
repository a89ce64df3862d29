//! Bulk credential rotation for a managed user directory.
//!
//! A run authenticates once, then rotates the password of every account on a
//! roster and optionally mails the new password to the account's secondary
//! address. Per-account failures are recorded and the batch continues.

pub mod auth;
pub mod batch;
pub mod config;
pub mod directory;
pub mod error;
pub mod http;
pub mod notify;
pub mod paths;
pub mod roster;
pub mod secret;
pub mod team_mail;

pub use auth::{AuthSessionManager, AuthStrategy, ScopeSet, SessionHandle, TokenSource, UseCase};
pub use batch::{BatchAborted, BatchCoordinator, Delivery, RotationFailure, RotationOutcome};
pub use config::KeyrollConfig;
pub use directory::{AccountDirectory, DirectoryClient};
pub use error::{AuthError, DirectoryError, NotificationError, RemoteError, SecretError};
pub use http::{ApiClient, RetryPolicy};
pub use notify::{NotificationDispatcher, NotificationJob, NotificationKind, Notifier};
pub use roster::AccountId;
pub use secret::{GeneratedSecret, generate_password};
pub use team_mail::{MailOutcome, Participant, TeamMailAborted, TeamMailer};
