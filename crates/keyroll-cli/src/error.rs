use colored::Colorize;

pub fn handle_error(err: anyhow::Error) -> ! {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    let msg = format!("{err:#}").to_lowercase();

    if msg.contains("client secrets") || msg.contains("service account key") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Check the [auth] section of your configuration file:");
        eprintln!("  {} $EDITOR ~/.keyroll/config.toml", "$".dimmed());
    }

    if msg.contains("invalid_grant") || msg.contains("cannot be renewed") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  The stored session was revoked. Authorize again with:");
        eprintln!("  {} keyroll auth logout && keyroll auth login", "$".dimmed());
    }

    if msg.contains("mail.sender") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Set the sender address, or rotate without notifications:");
        eprintln!("  {} keyroll rotate --no-notify", "$".dimmed());
    }

    if msg.contains("connection refused") || msg.contains("network") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Check your internet connection and try again.");
    }

    std::process::exit(1);
}
