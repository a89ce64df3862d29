use super::message::build_raw_message;
use super::template::{Bindings, render_template};
use crate::auth::TokenSource;
use crate::error::NotificationError;
use crate::http::{ApiClient, endpoint};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Kind of notification, which fixes its subject line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    PasswordReset,
    TeamAssignment,
}

impl NotificationKind {
    pub fn subject(&self) -> &'static str {
        match self {
            NotificationKind::PasswordReset => "Password Reset Notification",
            NotificationKind::TeamAssignment => "Urgent: Appointment as Temporary Detectives",
        }
    }
}

/// One message to one recipient.
#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub recipient: String,
    pub kind: NotificationKind,
    pub template_id: String,
    pub bindings: Bindings,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, job: NotificationJob) -> Result<(), NotificationError>;
}

#[derive(Serialize)]
struct RawMessage<'a> {
    raw: &'a str,
}

/// Renders templates and submits them through the Gmail send API.
pub struct NotificationDispatcher {
    api: ApiClient,
    base_url: Url,
    tokens: Arc<dyn TokenSource>,
    sender: String,
    templates_dir: PathBuf,
}

impl NotificationDispatcher {
    pub fn new(
        api: ApiClient,
        base_url: Url,
        tokens: Arc<dyn TokenSource>,
        sender: impl Into<String>,
        templates_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            api,
            base_url,
            tokens,
            sender: sender.into(),
            templates_dir: templates_dir.into(),
        }
    }

    pub fn template_path(&self, template_id: &str) -> PathBuf {
        self.templates_dir.join(format!("{template_id}.html"))
    }

    async fn load_template(&self, template_id: &str) -> Result<String, NotificationError> {
        let path = self.template_path(template_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(NotificationError::TemplateMissing(path))
            }
            Err(source) => Err(NotificationError::TemplateRead { path, source }),
        }
    }
}

#[async_trait]
impl Notifier for NotificationDispatcher {
    async fn send(&self, job: NotificationJob) -> Result<(), NotificationError> {
        let template = self.load_template(&job.template_id).await?;
        let html = render_template(&template, &job.bindings);
        let raw = build_raw_message(&self.sender, &job.recipient, job.kind.subject(), &html)?;

        let token = self.tokens.bearer_token().await?;
        let url = endpoint(
            &self.base_url,
            &["gmail", "v1", "users", "me", "messages", "send"],
        );
        let body = RawMessage { raw: &raw };

        self.api
            .send("send message", |http| {
                http.post(url.clone()).bearer_auth(&token).json(&body)
            })
            .await?;

        debug!(recipient = %job.recipient, template = %job.template_id, "Message sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use crate::http::RetryPolicy;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn dispatcher(server: &MockServer, templates: &TempDir) -> NotificationDispatcher {
        NotificationDispatcher::new(
            ApiClient::new(reqwest::Client::new(), RetryPolicy::none()),
            Url::parse(&server.uri()).unwrap(),
            Arc::new(StaticToken::new("mail-token")),
            "it@example.com",
            templates.path(),
        )
    }

    fn reset_job() -> NotificationJob {
        NotificationJob {
            recipient: "a@home.org".to_string(),
            kind: NotificationKind::PasswordReset,
            template_id: "reset_password_template".to_string(),
            bindings: Bindings::new()
                .with("user_email", "a@x.com")
                .with("new_password", "Xy7&pass"),
        }
    }

    #[test]
    fn test_subjects() {
        assert_eq!(
            NotificationKind::PasswordReset.subject(),
            "Password Reset Notification"
        );
        assert_eq!(
            NotificationKind::TeamAssignment.subject(),
            "Urgent: Appointment as Temporary Detectives"
        );
    }

    #[test]
    fn test_job_debug_hides_values() {
        let debug = format!("{:?}", reset_job());
        assert!(debug.contains("new_password"));
        assert!(!debug.contains("Xy7&pass"));
    }

    #[tokio::test]
    async fn test_send_renders_and_posts_raw_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gmail/v1/users/me/messages/send"))
            .and(header("authorization", "Bearer mail-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "1"})))
            .expect(1)
            .mount(&server)
            .await;

        let templates = TempDir::new().unwrap();
        std::fs::write(
            templates.path().join("reset_password_template.html"),
            "<p>{{ user_email }} / {{ new_password }}</p>",
        )
        .unwrap();

        dispatcher(&server, &templates).send(reset_job()).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let raw = body["raw"].as_str().unwrap();
        let message = String::from_utf8(URL_SAFE.decode(raw).unwrap()).unwrap();

        assert!(message.contains("To: a@home.org"));
        assert!(message.contains("Subject: Password Reset Notification"));
        assert!(message.contains("<p>a@x.com / Xy7&amp;pass</p>"));
    }

    #[tokio::test]
    async fn test_missing_template() {
        let server = MockServer::start().await;
        let templates = TempDir::new().unwrap();

        let err = dispatcher(&server, &templates)
            .send(reset_job())
            .await
            .unwrap_err();

        match err {
            NotificationError::TemplateMissing(path) => {
                assert!(path.ends_with("reset_password_template.html"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("insufficient permissions"))
            .mount(&server)
            .await;

        let templates = TempDir::new().unwrap();
        std::fs::write(
            templates.path().join("reset_password_template.html"),
            "<p>{{ user_email }}</p>",
        )
        .unwrap();

        let err = dispatcher(&server, &templates)
            .send(reset_job())
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::Remote(_)));
    }
}
