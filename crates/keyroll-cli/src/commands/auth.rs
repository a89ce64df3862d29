use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use keyroll_core::auth::{
    AuthSession, AuthSessionManager, AuthStrategy, ScopeSet, TokenStore, UseCase,
};
use keyroll_core::config::KeyrollConfig;
use keyroll_core::http::build_http_client;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::{AuthCommands, UseCaseArg};
use crate::output::table::{key_value_table, print_table};
use crate::output::{OutputFormat, json::print_json};

pub async fn run(config: &KeyrollConfig, command: AuthCommands, format: OutputFormat) -> Result<()> {
    match command {
        AuthCommands::Login { use_case } => login(config, use_case, format).await,
        AuthCommands::Status => status(config, format).await,
        AuthCommands::Logout => logout(config, format).await,
    }
}

fn use_case(arg: UseCaseArg) -> UseCase {
    match arg {
        UseCaseArg::Rotate => UseCase::RotateOnly,
        UseCaseArg::RotateNotify => UseCase::RotateAndNotify,
        UseCaseArg::TeamMail => UseCase::TeamMail,
    }
}

fn token_store(strategy: &AuthStrategy) -> Option<TokenStore> {
    match strategy {
        AuthStrategy::Interactive { token_store, .. } => Some(TokenStore::new(token_store)),
        AuthStrategy::Delegated { .. } => None,
    }
}

#[derive(Debug, Serialize)]
struct SessionSummary {
    scopes: Vec<String>,
    expires_at: Option<DateTime<Utc>>,
    expired: bool,
    refreshable: bool,
    token: String,
    /// Use cases this session can serve without a refresh
    ready_for: Vec<&'static str>,
}

impl SessionSummary {
    fn from_session(session: &AuthSession) -> Self {
        let now = Utc::now();
        let ready_for = [
            (UseCaseArg::Rotate, "rotate"),
            (UseCaseArg::RotateNotify, "rotate-notify"),
            (UseCaseArg::TeamMail, "team-mail"),
        ]
        .into_iter()
        .filter(|(arg, _)| session.is_valid_for(&ScopeSet::for_use_case(use_case(*arg)), now))
        .map(|(_, name)| name)
        .collect();

        Self {
            scopes: session.scopes.iter().map(str::to_string).collect(),
            expires_at: session.expires_at,
            expired: session.is_expired(now),
            refreshable: session.can_refresh(),
            token: session.masked_token(),
            ready_for,
        }
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Scopes", self.scopes.join("\n")),
            (
                "Expires",
                self.expires_at
                    .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            ("Expired", self.expired.to_string()),
            ("Refreshable", self.refreshable.to_string()),
            ("Token", self.token.clone()),
            (
                "Ready for",
                if self.ready_for.is_empty() {
                    "-".to_string()
                } else {
                    self.ready_for.join(", ")
                },
            ),
        ]
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    strategy: &'static str,
    token_store: Option<PathBuf>,
    session: Option<SessionSummary>,
}

async fn login(config: &KeyrollConfig, arg: UseCaseArg, format: OutputFormat) -> Result<()> {
    let manager = AuthSessionManager::from_strategy(
        &config.auth,
        ScopeSet::for_use_case(use_case(arg)),
        build_http_client(),
    )?;
    let session = manager.login().await?;

    let report = StatusReport {
        strategy: manager.strategy_name(),
        token_store: manager.store().map(|store| store.path().to_path_buf()),
        session: Some(SessionSummary::from_session(&session)),
    };
    if format.is_json() {
        return print_json(&report);
    }

    match &report.token_store {
        Some(path) => println!("Session stored at {}", path.display()),
        None => println!("Delegated session obtained; nothing is stored."),
    }
    if let Some(summary) = &report.session {
        print_table(key_value_table(summary.rows()))?;
    }
    Ok(())
}

async fn status(config: &KeyrollConfig, format: OutputFormat) -> Result<()> {
    let store = token_store(&config.auth);
    let session = match &store {
        Some(store) => store.load().await?,
        None => None,
    };

    let report = StatusReport {
        strategy: config.auth.name(),
        token_store: store.as_ref().map(|s| s.path().to_path_buf()),
        session: session.as_ref().map(SessionSummary::from_session),
    };
    if format.is_json() {
        return print_json(&report);
    }

    let mut rows = vec![("Strategy", report.strategy.to_string())];
    match &report.token_store {
        Some(path) => rows.push(("Token store", path.display().to_string())),
        None => rows.push(("Token store", "- (sessions are derived per run)".to_string())),
    }
    match &report.session {
        Some(summary) => rows.extend(summary.rows()),
        None => rows.push(("Session", "none".to_string())),
    }
    print_table(key_value_table(rows))
}

#[derive(Debug, Serialize)]
struct LogoutReport {
    token_store: Option<PathBuf>,
    removed: bool,
}

async fn logout(config: &KeyrollConfig, format: OutputFormat) -> Result<()> {
    let store = token_store(&config.auth);
    let removed = match &store {
        Some(store) => store.delete().await?,
        None => false,
    };

    let report = LogoutReport {
        token_store: store.map(|s| s.path().to_path_buf()),
        removed,
    };
    if format.is_json() {
        return print_json(&report);
    }

    match (&report.token_store, report.removed) {
        (Some(path), true) => println!("Removed stored session at {}", path.display()),
        (Some(path), false) => println!("No stored session at {}", path.display()),
        (None, _) => println!("Delegated strategy stores no session."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use keyroll_core::auth::GMAIL_SEND_SCOPE;

    fn session(scopes: ScopeSet) -> AuthSession {
        AuthSession {
            access_token: "ya29.abcdefghijkl".to_string(),
            refresh_token: Some("1//r".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            scopes,
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "client".to_string(),
            client_secret: None,
        }
    }

    #[test]
    fn summary_lists_exact_use_case_only() {
        let summary =
            SessionSummary::from_session(&session(ScopeSet::for_use_case(UseCase::TeamMail)));

        assert_eq!(summary.ready_for, vec!["team-mail"]);
        assert_eq!(summary.scopes, vec![GMAIL_SEND_SCOPE.to_string()]);
        assert_eq!(summary.token, "ya29...ijkl");
        assert!(summary.refreshable);
        assert!(!summary.expired);
    }

    #[test]
    fn delegated_strategy_has_no_store() {
        let strategy = AuthStrategy::Delegated {
            service_account_key: PathBuf::from("sa.json"),
            admin_subject: "admin@x.com".to_string(),
        };
        assert!(token_store(&strategy).is_none());
        assert!(token_store(&AuthStrategy::default()).is_some());
    }
}
