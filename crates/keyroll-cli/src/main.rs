mod cli;
mod commands;
mod completions;
mod error;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use keyroll_core::config::KeyrollConfig;
use keyroll_core::paths;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        completions::generate_completions(shell);
        return;
    }

    let _guard = match init_logging(cli.verbose) {
        Ok(guard) => guard,
        Err(err) => error::handle_error(err),
    };

    if let Err(err) = run(cli).await {
        error::handle_error(err);
    }
}

/// Log to a daily file under ~/.keyroll/logs, and to stderr with --verbose.
fn init_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = paths::ensure_logs_dir()?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "keyroll.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_filter = if verbose {
        "info,keyroll=debug,keyroll_core=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = verbose.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .with_level(true),
        )
        .with(stderr_layer)
        .init();

    Ok(guard)
}

async fn run(cli: Cli) -> Result<()> {
    let config = KeyrollConfig::load(cli.config.as_deref())?;
    tracing::debug!(strategy = config.auth.name(), "Configuration loaded");

    match cli.command {
        Commands::Rotate(args) => commands::rotate::run(&config, args, cli.format).await,
        Commands::TeamMail(args) => commands::team_mail::run(&config, args, cli.format).await,
        Commands::Auth { command } => commands::auth::run(&config, command, cli.format).await,
        Commands::Completions { .. } => Ok(()),
    }
}
