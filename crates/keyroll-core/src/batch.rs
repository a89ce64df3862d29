//! Batch rotation
//!
//! Processes the roster sequentially. Every account yields exactly one
//! [`RotationOutcome`]; only a session failure stops the run.

use crate::directory::AccountDirectory;
use crate::error::{AuthError, DirectoryError, NotificationError};
use crate::notify::{Bindings, NotificationJob, NotificationKind, Notifier};
use crate::roster::AccountId;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// What happened after a committed rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "delivery", rename_all = "snake_case")]
pub enum Delivery {
    Notified { recipient: String },
    NoSecondaryAddress,
    NotificationsDisabled,
    LookupFailed { reason: String },
    NotificationFailed { recipient: String, reason: String },
}

impl Delivery {
    pub fn describe(&self) -> String {
        match self {
            Delivery::Notified { recipient } => format!("notified {recipient}"),
            Delivery::NoSecondaryAddress => "no secondary address".to_string(),
            Delivery::NotificationsDisabled => "notifications disabled".to_string(),
            Delivery::LookupFailed { reason } => format!("secondary address lookup failed: {reason}"),
            Delivery::NotificationFailed { recipient, reason } => {
                format!("notification to {recipient} failed: {reason}")
            }
        }
    }
}

/// Rotation that did not commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationFailure {
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Result for one account. The generated password is never part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    pub account: AccountId,
    pub result: Result<Delivery, RotationFailure>,
}

impl RotationOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

impl Serialize for RotationOutcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Wire<'a> {
            account: &'a AccountId,
            rotated: bool,
            #[serde(flatten)]
            delivery: Option<&'a Delivery>,
            #[serde(skip_serializing_if = "Option::is_none")]
            failure: Option<&'a RotationFailure>,
        }

        Wire {
            account: &self.account,
            rotated: self.result.is_ok(),
            delivery: self.result.as_ref().ok(),
            failure: self.result.as_ref().err(),
        }
        .serialize(serializer)
    }
}

/// Run stopped because the shared session could not be renewed.
#[derive(Debug, Error)]
#[error("Run aborted after {} account(s): {source}", .outcomes.len())]
pub struct BatchAborted {
    /// Outcomes recorded before the abort, including the interrupted account
    pub outcomes: Vec<RotationOutcome>,
    #[source]
    pub source: AuthError,
}

pub struct BatchCoordinator {
    directory: Arc<dyn AccountDirectory>,
    notifier: Option<(Arc<dyn Notifier>, String)>,
}

impl BatchCoordinator {
    /// Coordinator that rotates without notifying.
    pub fn new(directory: Arc<dyn AccountDirectory>) -> Self {
        Self {
            directory,
            notifier: None,
        }
    }

    /// Notify the secondary address of every rotated account using
    /// `template_id`.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>, template_id: impl Into<String>) -> Self {
        self.notifier = Some((notifier, template_id.into()));
        self
    }

    pub async fn run(&self, accounts: &[AccountId]) -> Result<Vec<RotationOutcome>, BatchAborted> {
        let mut outcomes = Vec::with_capacity(accounts.len());

        for (index, account) in accounts.iter().enumerate() {
            let (result, session_error) = self.process(account).await;
            let outcome = RotationOutcome {
                account: account.clone(),
                result,
            };
            log_outcome(&outcome);
            outcomes.push(outcome);

            if let Some(source) = session_error {
                error!(
                    error = %source,
                    unprocessed = accounts.len() - index - 1,
                    "Session lost, aborting run"
                );
                return Err(BatchAborted { outcomes, source });
            }
        }

        Ok(outcomes)
    }

    /// Handle one account. A session error is returned alongside the
    /// outcome so a committed rotation is still reported as such.
    async fn process(
        &self,
        account: &AccountId,
    ) -> (Result<Delivery, RotationFailure>, Option<AuthError>) {
        let secret = match self.directory.rotate_credential(account).await {
            Ok(secret) => secret,
            Err(DirectoryError::Session(e)) => {
                let failure = RotationFailure {
                    reason: e.to_string(),
                    status: None,
                };
                return (Err(failure), Some(e));
            }
            Err(e) => {
                let status = match &e {
                    DirectoryError::Remote(remote) => remote.status(),
                    _ => None,
                };
                let failure = RotationFailure {
                    reason: e.to_string(),
                    status,
                };
                return (Err(failure), None);
            }
        };

        let Some((notifier, template_id)) = &self.notifier else {
            return (Ok(Delivery::NotificationsDisabled), None);
        };

        let recipient = match self.directory.fetch_secondary_address(account).await {
            Ok(Some(recipient)) => recipient,
            Ok(None) => return (Ok(Delivery::NoSecondaryAddress), None),
            Err(e) => {
                let delivery = Delivery::LookupFailed {
                    reason: e.to_string(),
                };
                return match e {
                    DirectoryError::Session(e) => (Ok(delivery), Some(e)),
                    _ => (Ok(delivery), None),
                };
            }
        };

        let job = NotificationJob {
            recipient: recipient.clone(),
            kind: NotificationKind::PasswordReset,
            template_id: template_id.clone(),
            bindings: Bindings::new()
                .with("user_email", account.as_str())
                .with("new_password", secret.expose()),
        };
        drop(secret);

        match notifier.send(job).await {
            Ok(()) => (Ok(Delivery::Notified { recipient }), None),
            Err(e) => {
                let delivery = Delivery::NotificationFailed {
                    recipient,
                    reason: e.to_string(),
                };
                match e {
                    NotificationError::Session(e) => (Ok(delivery), Some(e)),
                    _ => (Ok(delivery), None),
                }
            }
        }
    }
}

fn log_outcome(outcome: &RotationOutcome) {
    let account = outcome.account.as_str();
    match &outcome.result {
        Ok(delivery @ Delivery::NotificationFailed { .. })
        | Ok(delivery @ Delivery::LookupFailed { .. }) => {
            warn!(account, "Password rotated, {}", delivery.describe());
        }
        Ok(delivery) => info!(account, "Password rotated, {}", delivery.describe()),
        Err(failure) => warn!(account, status = ?failure.status, "Rotation failed: {}", failure.reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteError;
    use crate::secret::GeneratedSecret;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeDirectory {
        missing: Vec<&'static str>,
        secondary: HashMap<&'static str, &'static str>,
        session_lost_at: Option<&'static str>,
        rotated: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AccountDirectory for FakeDirectory {
        async fn rotate_credential(&self, account: &AccountId) -> Result<GeneratedSecret, DirectoryError> {
            if self.session_lost_at == Some(account.as_str()) {
                return Err(DirectoryError::Session(AuthError::RefreshUnavailable(
                    "revoked".to_string(),
                )));
            }
            if self.missing.contains(&account.as_str()) {
                return Err(DirectoryError::Remote(RemoteError::Status {
                    operation: "update user",
                    status: 404,
                    message: "Resource Not Found".to_string(),
                    retry_after_secs: None,
                }));
            }
            self.rotated.lock().unwrap().push(account.to_string());
            Ok(GeneratedSecret::from(format!("pw-{account}")))
        }

        async fn fetch_secondary_address(
            &self,
            account: &AccountId,
        ) -> Result<Option<String>, DirectoryError> {
            Ok(self.secondary.get(account.as_str()).map(|s| s.to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        fail_for: Option<&'static str>,
        sent: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, job: NotificationJob) -> Result<(), NotificationError> {
            if self.fail_for == Some(job.recipient.as_str()) {
                return Err(NotificationError::Message("rejected".to_string()));
            }
            self.sent.lock().unwrap().push((
                job.recipient.clone(),
                job.bindings.get("new_password").map(str::to_string),
            ));
            Ok(())
        }
    }

    fn roster(values: &[&str]) -> Vec<AccountId> {
        values.iter().filter_map(|v| AccountId::parse(v)).collect()
    }

    #[tokio::test]
    async fn test_failed_rotation_is_isolated() {
        let directory = Arc::new(FakeDirectory {
            missing: vec!["bad@x.com"],
            ..Default::default()
        });
        let coordinator = BatchCoordinator::new(directory.clone());

        let outcomes = coordinator
            .run(&roster(&["a@x.com", "bad@x.com", "c@x.com"]))
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].result, Ok(Delivery::NotificationsDisabled));
        assert_eq!(
            outcomes[1].result.as_ref().unwrap_err().status,
            Some(404)
        );
        assert_eq!(outcomes[2].result, Ok(Delivery::NotificationsDisabled));
        assert_eq!(*directory.rotated.lock().unwrap(), vec!["a@x.com", "c@x.com"]);
    }

    #[tokio::test]
    async fn test_no_secondary_address_skips_notifier() {
        let directory = Arc::new(FakeDirectory {
            secondary: HashMap::from([("a@x.com", "a@home.org")]),
            ..Default::default()
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let coordinator =
            BatchCoordinator::new(directory).with_notifier(notifier.clone(), "reset_password_template");

        let outcomes = coordinator
            .run(&roster(&["a@x.com", "b@x.com"]))
            .await
            .unwrap();

        assert_eq!(
            outcomes[0].result,
            Ok(Delivery::Notified {
                recipient: "a@home.org".to_string()
            })
        );
        assert_eq!(outcomes[1].result, Ok(Delivery::NoSecondaryAddress));

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "a@home.org");
        assert_eq!(sent[0].1.as_deref(), Some("pw-a@x.com"));
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_rotation() {
        let directory = Arc::new(FakeDirectory {
            secondary: HashMap::from([("a@x.com", "a@home.org"), ("b@x.com", "b@home.org")]),
            ..Default::default()
        });
        let notifier = Arc::new(RecordingNotifier {
            fail_for: Some("a@home.org"),
            ..Default::default()
        });
        let coordinator = BatchCoordinator::new(directory).with_notifier(notifier, "t");

        let outcomes = coordinator
            .run(&roster(&["a@x.com", "b@x.com"]))
            .await
            .unwrap();

        assert!(outcomes[0].is_success());
        assert!(matches!(
            outcomes[0].result,
            Ok(Delivery::NotificationFailed { .. })
        ));
        assert!(matches!(outcomes[1].result, Ok(Delivery::Notified { .. })));
    }

    #[tokio::test]
    async fn test_session_loss_aborts_run() {
        let directory = Arc::new(FakeDirectory {
            session_lost_at: Some("b@x.com"),
            ..Default::default()
        });
        let coordinator = BatchCoordinator::new(directory.clone());

        let aborted = coordinator
            .run(&roster(&["a@x.com", "b@x.com", "c@x.com"]))
            .await
            .unwrap_err();

        assert_eq!(aborted.outcomes.len(), 2);
        assert!(aborted.outcomes[0].is_success());
        assert!(!aborted.outcomes[1].is_success());
        assert!(matches!(aborted.source, AuthError::RefreshUnavailable(_)));
        assert_eq!(*directory.rotated.lock().unwrap(), vec!["a@x.com"]);
    }

    #[tokio::test]
    async fn test_session_loss_while_notifying_keeps_rotation() {
        struct RevokedNotifier;

        #[async_trait]
        impl Notifier for RevokedNotifier {
            async fn send(&self, _job: NotificationJob) -> Result<(), NotificationError> {
                Err(NotificationError::Session(AuthError::RefreshUnavailable(
                    "revoked".to_string(),
                )))
            }
        }

        let directory = Arc::new(FakeDirectory {
            secondary: HashMap::from([("a@x.com", "a@home.org")]),
            ..Default::default()
        });
        let coordinator =
            BatchCoordinator::new(directory.clone()).with_notifier(Arc::new(RevokedNotifier), "t");

        let aborted = coordinator
            .run(&roster(&["a@x.com", "b@x.com"]))
            .await
            .unwrap_err();

        assert_eq!(aborted.outcomes.len(), 1);
        assert!(aborted.outcomes[0].is_success());
        assert!(matches!(
            aborted.outcomes[0].result,
            Ok(Delivery::NotificationFailed { .. })
        ));
        assert_eq!(*directory.rotated.lock().unwrap(), vec!["a@x.com"]);
    }

    #[tokio::test]
    async fn test_empty_roster() {
        let coordinator = BatchCoordinator::new(Arc::new(FakeDirectory::default()));
        assert!(coordinator.run(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn test_outcome_json_shape() {
        let ok = RotationOutcome {
            account: AccountId::parse("a@x.com").unwrap(),
            result: Ok(Delivery::Notified {
                recipient: "a@home.org".to_string(),
            }),
        };
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({
                "account": "a@x.com",
                "rotated": true,
                "delivery": "notified",
                "recipient": "a@home.org"
            })
        );

        let failed = RotationOutcome {
            account: AccountId::parse("bad@x.com").unwrap(),
            result: Err(RotationFailure {
                reason: "not found".to_string(),
                status: Some(404),
            }),
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({
                "account": "bad@x.com",
                "rotated": false,
                "failure": {"reason": "not found", "status": 404}
            })
        );
    }
}
