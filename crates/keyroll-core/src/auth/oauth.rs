//! Token endpoint exchanges shared by both bootstrap strategies.

use super::types::{AuthSession, ScopeSet, TokenErrorBody, TokenResponse};
use crate::error::AuthError;
use chrono::{Duration, Utc};
use reqwest::Client;
use tracing::debug;

/// Identity and endpoint a session is minted for.
#[derive(Debug, Clone)]
pub struct SessionOrigin<'a> {
    pub token_uri: &'a str,
    pub client_id: &'a str,
    pub client_secret: Option<&'a str>,
}

/// POST a form to the token endpoint and decode the response.
pub async fn request_token(
    http: &Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, AuthError> {
    let grant_type = form
        .iter()
        .find(|(key, _)| *key == "grant_type")
        .map(|(_, value)| *value)
        .unwrap_or("unknown");
    debug!(token_uri, grant_type, "Requesting token");

    let response = http.post(token_uri).form(form).send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<TokenResponse>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<TokenErrorBody>(&body).ok();
    Err(AuthError::TokenEndpoint {
        status: status.as_u16(),
        error: parsed
            .as_ref()
            .map(|b| b.error.clone())
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
        description: parsed.and_then(|b| b.error_description),
    })
}

/// Build a session from a token response.
///
/// The refresh token of `previous` is kept when the endpoint does not rotate
/// it, and the granted scopes fall back to the requested ones when the
/// response omits them.
pub fn session_from_response(
    response: TokenResponse,
    requested: &ScopeSet,
    origin: SessionOrigin<'_>,
    previous_refresh_token: Option<&str>,
) -> AuthSession {
    let scopes = response
        .scope
        .as_deref()
        .map(ScopeSet::from_space_delimited)
        .filter(|granted| !granted.is_empty())
        .unwrap_or_else(|| requested.clone());

    AuthSession {
        access_token: response.access_token,
        refresh_token: response
            .refresh_token
            .or_else(|| previous_refresh_token.map(str::to_string)),
        expires_at: response
            .expires_in
            .map(|seconds| Utc::now() + Duration::seconds(seconds)),
        scopes,
        token_uri: origin.token_uri.to_string(),
        client_id: origin.client_id.to_string(),
        client_secret: origin.client_secret.map(str::to_string),
    }
}

/// Exchange a refresh token for a new access token bound to `scopes`.
pub async fn refresh_session(
    http: &Client,
    session: &AuthSession,
    scopes: &ScopeSet,
) -> Result<AuthSession, AuthError> {
    let refresh_token = session.refresh_token.as_deref().ok_or_else(|| {
        AuthError::RefreshUnavailable("session has no refresh token".to_string())
    })?;

    let scope = scopes.joined();
    let mut form = vec![
        ("grant_type", "refresh_token"),
        ("client_id", session.client_id.as_str()),
        ("refresh_token", refresh_token),
        ("scope", scope.as_str()),
    ];
    if let Some(secret) = session.client_secret.as_deref() {
        form.push(("client_secret", secret));
    }

    let response = request_token(http, &session.token_uri, &form).await?;
    Ok(session_from_response(
        response,
        scopes,
        SessionOrigin {
            token_uri: &session.token_uri,
            client_id: &session.client_id,
            client_secret: session.client_secret.as_deref(),
        },
        Some(refresh_token),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::{DIRECTORY_USER_SCOPE, UseCase};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn stale_session(token_uri: String) -> AuthSession {
        AuthSession {
            access_token: "old-access".to_string(),
            refresh_token: Some("refresh-1".to_string()),
            expires_at: Some(Utc::now() - Duration::hours(1)),
            scopes: ScopeSet::for_use_case(UseCase::RotateOnly),
            token_uri,
            client_id: "client-id".to_string(),
            client_secret: Some("client-secret".to_string()),
        }
    }

    #[test]
    fn test_session_from_response_keeps_previous_refresh_token() {
        let response = TokenResponse {
            access_token: "new".to_string(),
            expires_in: Some(3599),
            refresh_token: None,
            scope: None,
            token_type: Some("Bearer".to_string()),
        };
        let requested = ScopeSet::for_use_case(UseCase::RotateOnly);
        let session = session_from_response(
            response,
            &requested,
            SessionOrigin {
                token_uri: "https://token",
                client_id: "id",
                client_secret: None,
            },
            Some("kept"),
        );

        assert_eq!(session.refresh_token.as_deref(), Some("kept"));
        assert_eq!(session.scopes, requested);
        assert!(!session.is_expired(Utc::now()));
    }

    #[tokio::test]
    async fn test_refresh_session_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .and(body_string_contains("client_secret=client-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-access",
                "expires_in": 3599,
                "scope": DIRECTORY_USER_SCOPE,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = stale_session(format!("{}/token", server.uri()));
        let scopes = ScopeSet::for_use_case(UseCase::RotateOnly);
        let refreshed = refresh_session(&Client::new(), &session, &scopes)
            .await
            .unwrap();

        assert_eq!(refreshed.access_token, "fresh-access");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("refresh-1"));
        assert!(refreshed.is_valid_for(&scopes, Utc::now()));
    }

    #[tokio::test]
    async fn test_refresh_session_invalid_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let session = stale_session(format!("{}/token", server.uri()));
        let err = refresh_session(
            &Client::new(),
            &session,
            &ScopeSet::for_use_case(UseCase::RotateOnly),
        )
        .await
        .unwrap_err();

        match err {
            AuthError::TokenEndpoint { status, error, .. } => {
                assert_eq!(status, 400);
                assert_eq!(error, "invalid_grant");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let mut session = stale_session("http://127.0.0.1:9/token".to_string());
        session.refresh_token = None;

        let err = refresh_session(&Client::new(), &session, &ScopeSet::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RefreshUnavailable(_)));
    }
}
