use anyhow::{Context, Result};
use colored::Colorize;
use keyroll_core::auth::UseCase;
use keyroll_core::batch::{BatchCoordinator, Delivery, RotationOutcome};
use keyroll_core::config::KeyrollConfig;
use keyroll_core::directory::DirectoryClient;
use keyroll_core::http::{ApiClient, build_http_client};
use keyroll_core::notify::NotificationDispatcher;
use keyroll_core::roster::load_roster;
use std::sync::Arc;
use tracing::{info, warn};

use super::acquire_session;
use crate::cli::RotateArgs;
use crate::output::{OutputFormat, json::print_json};

pub async fn run(config: &KeyrollConfig, args: RotateArgs, format: OutputFormat) -> Result<()> {
    let roster = load_roster(args.roster_file.as_deref(), args.accounts.as_deref())?;
    if roster.is_empty() {
        info!("Roster is empty, nothing to rotate");
        return print_outcomes(&[], format);
    }

    let notify = !args.no_notify;
    let sender = if notify {
        Some(
            config
                .sender_address()
                .context("mail.sender must be set to send notifications")?,
        )
    } else {
        None
    };
    let use_case = if notify {
        UseCase::RotateAndNotify
    } else {
        UseCase::RotateOnly
    };

    let http = build_http_client();
    let session = acquire_session(config, use_case, http.clone()).await?;
    let api = ApiClient::new(http, config.retry.clone());

    let length = args
        .length
        .map(usize::from)
        .unwrap_or(config.directory.password_length);
    let directory = DirectoryClient::new(api.clone(), config.directory_url()?, session.clone())
        .with_password_length(length);
    let mut coordinator = BatchCoordinator::new(Arc::new(directory));

    if let Some(sender) = sender {
        let template = args
            .template
            .unwrap_or_else(|| config.mail.reset_template.clone());
        let template_path = config.template_path(&template);
        if !template_path.exists() {
            warn!(path = %template_path.display(), "Notification template not found");
        }
        let dispatcher = NotificationDispatcher::new(
            api,
            config.mail_url()?,
            session,
            sender,
            config.mail.templates_dir.clone(),
        );
        coordinator = coordinator.with_notifier(Arc::new(dispatcher), template);
    }

    info!(accounts = roster.len(), notify, "Starting rotation");
    match coordinator.run(&roster).await {
        Ok(outcomes) => print_outcomes(&outcomes, format),
        Err(aborted) => {
            print_outcomes(&aborted.outcomes, format)?;
            Err(aborted.into())
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    rotated: usize,
    notified: usize,
    failed: usize,
}

fn summarize(outcomes: &[RotationOutcome]) -> Summary {
    let mut summary = Summary::default();
    for outcome in outcomes {
        match &outcome.result {
            Ok(delivery) => {
                summary.rotated += 1;
                if matches!(delivery, Delivery::Notified { .. }) {
                    summary.notified += 1;
                }
            }
            Err(_) => summary.failed += 1,
        }
    }
    summary
}

fn print_outcomes(outcomes: &[RotationOutcome], format: OutputFormat) -> Result<()> {
    if format.is_json() {
        return print_json(&outcomes);
    }

    if outcomes.is_empty() {
        println!("No accounts to process.");
        return Ok(());
    }

    for outcome in outcomes {
        match &outcome.result {
            Ok(delivery) => println!(
                "{} {}: password rotated, {}",
                "✓".green(),
                outcome.account,
                delivery.describe()
            ),
            Err(failure) => println!(
                "{} {}: rotation failed: {}",
                "✗".red(),
                outcome.account,
                failure.reason
            ),
        }
    }

    let summary = summarize(outcomes);
    println!(
        "\n{} account(s): {} rotated, {} notified, {} failed",
        outcomes.len(),
        summary.rotated,
        summary.notified,
        summary.failed
    );
    Ok(())
}
