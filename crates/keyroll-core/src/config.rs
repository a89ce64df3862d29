//! Configuration file support
//!
//! Loads `~/.keyroll/config.toml` (or an explicit path). Relative paths in the
//! file are resolved against the directory that contains it.

use crate::auth::AuthStrategy;
use crate::http::RetryPolicy;
use crate::paths;
use crate::secret::DEFAULT_PASSWORD_LENGTH;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_DIRECTORY_URL: &str = "https://admin.googleapis.com";
pub const DEFAULT_MAIL_URL: &str = "https://gmail.googleapis.com";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyrollConfig {
    #[serde(default)]
    pub auth: AuthStrategy,
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_directory_url")]
    pub base_url: String,
    /// Length of generated passwords
    #[serde(default = "default_password_length")]
    pub password_length: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_directory_url(),
            password_length: default_password_length(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_mail_url")]
    pub base_url: String,
    /// From address of outgoing messages
    pub sender: Option<String>,
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    #[serde(default = "default_reset_template")]
    pub reset_template: String,
    #[serde(default = "default_team_template")]
    pub team_template: String,
    /// Chat channel announced in team mails
    #[serde(default = "default_channel_name")]
    pub channel_name: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            base_url: default_mail_url(),
            sender: None,
            templates_dir: default_templates_dir(),
            reset_template: default_reset_template(),
            team_template: default_team_template(),
            channel_name: default_channel_name(),
        }
    }
}

fn default_directory_url() -> String {
    DEFAULT_DIRECTORY_URL.to_string()
}
fn default_password_length() -> usize {
    DEFAULT_PASSWORD_LENGTH
}
fn default_mail_url() -> String {
    DEFAULT_MAIL_URL.to_string()
}
fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}
fn default_reset_template() -> String {
    "reset_password_template".to_string()
}
fn default_team_template() -> String {
    "team_info_email_template".to_string()
}
fn default_channel_name() -> String {
    "#it-onboarding".to_string()
}

impl KeyrollConfig {
    /// Load from `explicit`, or from the default location.
    ///
    /// An explicit path must exist and parse. A missing default file yields
    /// the defaults, with relative paths anchored at the state directory.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        let path = paths::config_path()?;
        if path.exists() {
            return Self::load_from_path(&path);
        }

        let mut config = Self::default();
        config.resolve_paths(&paths::resolve_keyroll_dir()?);
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&content, base)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse TOML and resolve relative paths against `base_dir`.
    pub fn from_toml_str(content: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(content)?;
        config.resolve_paths(base_dir);
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        match &mut self.auth {
            AuthStrategy::Interactive {
                client_secrets,
                token_store,
            } => {
                *client_secrets = paths::resolve_relative(base, client_secrets);
                *token_store = paths::resolve_relative(base, token_store);
            }
            AuthStrategy::Delegated {
                service_account_key,
                ..
            } => {
                *service_account_key = paths::resolve_relative(base, service_account_key);
            }
        }
        self.mail.templates_dir = paths::resolve_relative(base, &self.mail.templates_dir);
    }

    pub fn validate(&self) -> Result<()> {
        self.directory_url()?;
        self.mail_url()?;
        if self.directory.password_length == 0 {
            bail!("directory.password_length must be at least 1");
        }
        Ok(())
    }

    pub fn directory_url(&self) -> Result<Url> {
        Url::parse(&self.directory.base_url)
            .with_context(|| format!("Invalid directory.base_url '{}'", self.directory.base_url))
    }

    pub fn mail_url(&self) -> Result<Url> {
        Url::parse(&self.mail.base_url)
            .with_context(|| format!("Invalid mail.base_url '{}'", self.mail.base_url))
    }

    /// From address for outgoing mail. Delegated runs fall back to the
    /// impersonated administrator.
    pub fn sender_address(&self) -> Option<String> {
        self.mail.sender.clone().or_else(|| match &self.auth {
            AuthStrategy::Delegated { admin_subject, .. } => Some(admin_subject.clone()),
            AuthStrategy::Interactive { .. } => None,
        })
    }

    /// Path of the HTML template named `template_id`.
    pub fn template_path(&self, template_id: &str) -> PathBuf {
        self.mail.templates_dir.join(format!("{template_id}.html"))
    }
}
