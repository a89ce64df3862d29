//! Installed-app consent flow
//!
//! Opens a loopback listener, asks the operator to visit the consent URL,
//! and exchanges the returned authorization code (with PKCE) for a
//! user-bound session carrying a refresh token.

use super::oauth::{SessionOrigin, refresh_session, request_token, session_from_response};
use super::provider::SessionProvider;
use super::types::{AuthSession, GOOGLE_AUTH_URI, GOOGLE_TOKEN_URI, ScopeSet};
use crate::error::AuthError;
use async_trait::async_trait;
use axum::Router;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info};

const DEFAULT_CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

const COMPLETION_PAGE: &str = "<html><body><p>The authentication flow has completed. \
You may close this window.</p></body></html>";

/// OAuth client registration loaded from the provider's client secrets file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    #[serde(default)]
    installed: Option<ClientSecrets>,
    #[serde(default)]
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(content: &str) -> Result<Self, String> {
        let file: ClientSecretsFile = serde_json::from_str(content).map_err(|e| e.to_string())?;
        file.installed
            .or(file.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" client entry".to_string())
    }

    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let content = std::fs::read_to_string(path).map_err(|e| AuthError::ClientSecrets {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|message| AuthError::ClientSecrets {
            path: path.to_path_buf(),
            message,
        })
    }
}

/// Shows the consent URL to whoever is running the flow.
pub trait ConsentPrompt: Send + Sync {
    fn present(&self, url: &str);
}

/// Prints the consent URL on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrPrompt;

impl ConsentPrompt for StderrPrompt {
    fn present(&self, url: &str) {
        eprintln!("Please visit this URL to authorize keyroll:\n\n{url}\n");
    }
}

/// Authorization URL plus the values needed to finish the exchange.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub code_verifier: String,
    pub redirect_uri: String,
}

/// Query parameters of the redirect back to the loopback listener.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

type CallbackSlot = Arc<Mutex<Option<oneshot::Sender<CallbackParams>>>>;

/// One-shot HTTP listener on 127.0.0.1 receiving the consent redirect.
pub struct LoopbackReceiver {
    listener: TcpListener,
    port: u16,
}

impl LoopbackReceiver {
    pub async fn bind() -> Result<Self, AuthError> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| AuthError::Consent(format!("failed to bind loopback listener: {e}")))?;
        let port = listener
            .local_addr()
            .map_err(|e| AuthError::Consent(e.to_string()))?
            .port();
        Ok(Self { listener, port })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }

    /// Serve until the first redirect arrives or `timeout` elapses.
    pub async fn wait(self, timeout: Duration) -> Result<CallbackParams, AuthError> {
        let (tx, rx) = oneshot::channel();
        let slot: CallbackSlot = Arc::new(Mutex::new(Some(tx)));
        let app = Router::new()
            .route("/", get(handle_callback))
            .with_state(slot);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(self.listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let received = tokio::time::timeout(timeout, rx).await;
        let _ = shutdown_tx.send(());
        let _ = server.await;

        match received {
            Ok(Ok(params)) => Ok(params),
            Ok(Err(_)) => Err(AuthError::Consent(
                "loopback listener stopped before a redirect arrived".to_string(),
            )),
            Err(_) => Err(AuthError::Consent(
                "timed out waiting for the authorization redirect".to_string(),
            )),
        }
    }
}

async fn handle_callback(
    State(slot): State<CallbackSlot>,
    Query(params): Query<CallbackParams>,
) -> Html<&'static str> {
    let sender = slot.lock().ok().and_then(|mut guard| guard.take());
    if let Some(sender) = sender {
        let _ = sender.send(params);
    }
    Html(COMPLETION_PAGE)
}

fn generate_code_verifier() -> String {
    let random_bytes: [u8; 48] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

fn generate_code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

/// Interactive bootstrap strategy.
pub struct InstalledAppFlow {
    secrets: ClientSecrets,
    http: Client,
    prompt: Arc<dyn ConsentPrompt>,
    timeout: Duration,
}

impl InstalledAppFlow {
    pub fn new(secrets: ClientSecrets, http: Client) -> Self {
        Self {
            secrets,
            http,
            prompt: Arc::new(StderrPrompt),
            timeout: DEFAULT_CONSENT_TIMEOUT,
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn ConsentPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the consent URL with state and a PKCE S256 challenge.
    pub fn authorization_request(
        &self,
        scopes: &ScopeSet,
        redirect_uri: &str,
    ) -> Result<AuthorizationRequest, AuthError> {
        let state = generate_state();
        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);

        let mut url = url::Url::parse(&self.secrets.auth_uri).map_err(|e| {
            AuthError::Consent(format!("invalid auth_uri {}: {e}", self.secrets.auth_uri))
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.secrets.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &scopes.joined())
            .append_pair("state", &state)
            .append_pair("code_challenge", &code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");

        Ok(AuthorizationRequest {
            url: url.into(),
            state,
            code_verifier,
            redirect_uri: redirect_uri.to_string(),
        })
    }

    /// Exchange an authorization code for a session.
    pub async fn exchange_code(
        &self,
        code: &str,
        request: &AuthorizationRequest,
        scopes: &ScopeSet,
    ) -> Result<AuthSession, AuthError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", request.redirect_uri.as_str()),
            ("client_id", self.secrets.client_id.as_str()),
            ("code_verifier", request.code_verifier.as_str()),
        ];
        if let Some(secret) = self.secrets.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let response = request_token(&self.http, &self.secrets.token_uri, &form).await?;
        Ok(session_from_response(
            response,
            scopes,
            self.origin(),
            None,
        ))
    }

    fn origin(&self) -> SessionOrigin<'_> {
        SessionOrigin {
            token_uri: &self.secrets.token_uri,
            client_id: &self.secrets.client_id,
            client_secret: self.secrets.client_secret.as_deref(),
        }
    }
}

#[async_trait]
impl SessionProvider for InstalledAppFlow {
    fn name(&self) -> &'static str {
        "interactive"
    }

    fn persists_sessions(&self) -> bool {
        true
    }

    fn can_rederive(&self) -> bool {
        false
    }

    async fn bootstrap(&self, scopes: &ScopeSet) -> Result<AuthSession, AuthError> {
        let receiver = LoopbackReceiver::bind().await?;
        let request = self.authorization_request(scopes, &receiver.redirect_uri())?;

        info!(redirect_uri = %request.redirect_uri, scopes = %scopes, "Waiting for user consent");
        self.prompt.present(&request.url);

        let callback = receiver.wait(self.timeout).await?;
        if let Some(error) = callback.error {
            return Err(AuthError::Consent(format!("authorization denied: {error}")));
        }
        if callback.state.as_deref() != Some(request.state.as_str()) {
            return Err(AuthError::StateMismatch);
        }
        let code = callback
            .code
            .ok_or_else(|| AuthError::Consent("redirect carried no authorization code".to_string()))?;

        debug!("Authorization code received, exchanging");
        self.exchange_code(&code, &request, scopes).await
    }

    async fn refresh(
        &self,
        session: &AuthSession,
        scopes: &ScopeSet,
    ) -> Result<AuthSession, AuthError> {
        refresh_session(&self.http, session, scopes).await
    }
}
