use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

/// Output format for CLI commands
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn is_json(self) -> bool {
        matches!(self, OutputFormat::Json)
    }
}

#[derive(Parser)]
#[command(name = "keyroll")]
#[command(version, about = "keyroll - bulk password rotation for Google Workspace accounts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ~/.keyroll/config.toml)
    #[arg(long, global = true, env = "KEYROLL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rotate the password of every account on the roster
    Rotate(RotateArgs),

    /// Mail team assignments to every participant of a CSV file
    TeamMail(TeamMailArgs),

    /// Authorization session management
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug)]
pub struct RotateArgs {
    /// Newline-delimited roster file; used when it exists
    #[arg(long, env = "EMAIL_LIST_FILE")]
    pub roster_file: Option<PathBuf>,

    /// Comma-delimited account list
    #[arg(long, env = "EMAILS")]
    pub accounts: Option<String>,

    /// Rotate without mailing the new password
    #[arg(long)]
    pub no_notify: bool,

    /// Notification template name (overrides mail.reset_template)
    #[arg(long)]
    pub template: Option<String>,

    /// Generated password length (overrides directory.password_length)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub length: Option<u16>,
}

#[derive(Args, Debug)]
pub struct TeamMailArgs {
    /// CSV file with Name, Email, Team and Code columns
    #[arg(long)]
    pub participants: PathBuf,

    /// Template name (overrides mail.team_template)
    #[arg(long)]
    pub template: Option<String>,

    /// Chat channel announced in the mail (overrides mail.channel_name)
    #[arg(long)]
    pub channel: Option<String>,
}

/// Scope set to authorize for
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UseCaseArg {
    /// Directory access only
    Rotate,
    /// Directory access and mail sending
    #[default]
    RotateNotify,
    /// Mail sending only
    TeamMail,
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Run the configured authorization flow and store the session
    Login {
        #[arg(long, value_enum, default_value = "rotate-notify")]
        use_case: UseCaseArg,
    },

    /// Show the stored session
    Status,

    /// Delete the stored session
    Logout,
}
