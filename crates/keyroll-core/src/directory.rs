//! Directory client
//!
//! Rotates account passwords and resolves secondary contact addresses through
//! the Admin SDK Directory API.

use crate::auth::TokenSource;
use crate::error::DirectoryError;
use crate::http::{ApiClient, endpoint};
use crate::roster::AccountId;
use crate::secret::{DEFAULT_PASSWORD_LENGTH, GeneratedSecret, generate_password};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Account operations the batch depends on.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Set a fresh password that must be changed at next login.
    async fn rotate_credential(&self, account: &AccountId) -> Result<GeneratedSecret, DirectoryError>;

    /// First non-primary address on the account, if any.
    async fn fetch_secondary_address(
        &self,
        account: &AccountId,
    ) -> Result<Option<String>, DirectoryError>;
}

/// User record as returned by `users.get`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    #[serde(default)]
    pub primary_email: Option<String>,
    #[serde(default)]
    pub emails: Vec<ContactAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContactAddress {
    pub address: String,
    #[serde(default)]
    pub primary: Option<bool>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl AccountRecord {
    pub fn secondary_address(&self) -> Option<&str> {
        self.emails
            .iter()
            .find(|email| !email.primary.unwrap_or(false))
            .map(|email| email.address.as_str())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordUpdate<'a> {
    password: &'a str,
    change_password_at_next_login: bool,
}

pub struct DirectoryClient {
    api: ApiClient,
    base_url: Url,
    tokens: Arc<dyn TokenSource>,
    password_length: usize,
}

impl DirectoryClient {
    pub fn new(api: ApiClient, base_url: Url, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            api,
            base_url,
            tokens,
            password_length: DEFAULT_PASSWORD_LENGTH,
        }
    }

    pub fn with_password_length(mut self, length: usize) -> Self {
        self.password_length = length;
        self
    }

    fn user_url(&self, account: &AccountId) -> Url {
        endpoint(
            &self.base_url,
            &["admin", "directory", "v1", "users", account.as_str()],
        )
    }
}

#[async_trait]
impl AccountDirectory for DirectoryClient {
    async fn rotate_credential(&self, account: &AccountId) -> Result<GeneratedSecret, DirectoryError> {
        let secret = generate_password(self.password_length)?;
        let token = self.tokens.bearer_token().await?;
        let url = self.user_url(account);
        let body = PasswordUpdate {
            password: secret.expose(),
            change_password_at_next_login: true,
        };

        self.api
            .send("update user", |http| {
                http.put(url.clone()).bearer_auth(&token).json(&body)
            })
            .await?;

        debug!(account = %account, "Password updated");
        Ok(secret)
    }

    async fn fetch_secondary_address(
        &self,
        account: &AccountId,
    ) -> Result<Option<String>, DirectoryError> {
        let token = self.tokens.bearer_token().await?;
        let url = self.user_url(account);

        let record: AccountRecord = self
            .api
            .send_json("get user", |http| http.get(url.clone()).bearer_auth(&token))
            .await?;

        Ok(record.secondary_address().map(str::to_string))
    }
}
