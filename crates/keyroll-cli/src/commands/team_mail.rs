use anyhow::{Context, Result};
use colored::Colorize;
use keyroll_core::auth::UseCase;
use keyroll_core::config::KeyrollConfig;
use keyroll_core::http::{ApiClient, build_http_client};
use keyroll_core::notify::NotificationDispatcher;
use keyroll_core::team_mail::{MailOutcome, TeamMailer, read_participants};
use std::sync::Arc;
use tracing::info;

use super::acquire_session;
use crate::cli::TeamMailArgs;
use crate::output::{OutputFormat, json::print_json};

pub async fn run(config: &KeyrollConfig, args: TeamMailArgs, format: OutputFormat) -> Result<()> {
    let participants = read_participants(&args.participants)?;
    if participants.is_empty() {
        info!("No participants, nothing to send");
        return print_outcomes(&[], format);
    }

    let sender = config
        .sender_address()
        .context("mail.sender must be set to send team mail")?;
    let template = args
        .template
        .unwrap_or_else(|| config.mail.team_template.clone());
    let channel = args
        .channel
        .unwrap_or_else(|| config.mail.channel_name.clone());

    let http = build_http_client();
    let session = acquire_session(config, UseCase::TeamMail, http.clone()).await?;
    let dispatcher = NotificationDispatcher::new(
        ApiClient::new(http, config.retry.clone()),
        config.mail_url()?,
        session,
        sender,
        config.mail.templates_dir.clone(),
    );

    let mailer = TeamMailer::new(Arc::new(dispatcher), template, channel);
    match mailer.run(&participants).await {
        Ok(outcomes) => print_outcomes(&outcomes, format),
        Err(aborted) => {
            print_outcomes(&aborted.outcomes, format)?;
            Err(aborted.into())
        }
    }
}

fn print_outcomes(outcomes: &[MailOutcome], format: OutputFormat) -> Result<()> {
    if format.is_json() {
        return print_json(&outcomes);
    }

    if outcomes.is_empty() {
        println!("No participants to mail.");
        return Ok(());
    }

    for outcome in outcomes {
        match &outcome.result {
            Ok(()) => println!("{} {}: sent", "✓".green(), outcome.recipient),
            Err(reason) => println!("{} {}: {}", "✗".red(), outcome.recipient, reason),
        }
    }

    let sent = outcomes.iter().filter(|o| o.result.is_ok()).count();
    println!("\n{sent} of {} mail(s) sent", outcomes.len());
    Ok(())
}
