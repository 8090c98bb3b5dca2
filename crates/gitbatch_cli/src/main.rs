//! Gitbatch CLI - keep a directory of working copies in sync with GitHub.

mod commands;
mod config;
mod progress;
mod prompt;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use gitbatch::CancellationFlag;
use tracing_subscriber::EnvFilter;

use crate::commands::sync::SyncArgs;

#[derive(Parser)]
#[command(name = "gitbatch")]
#[command(version)]
#[command(about = "Clone or pull every repository of a GitHub user or organization")]
#[command(
    long_about = "Gitbatch lists every repository owned by a GitHub user or organization \
and clones the missing ones or pulls the existing ones into a local folder, several at a \
time. Working copies whose origin uses the other protocol (SSH or HTTPS) can be switched \
interactively or automatically."
)]
#[command(after_long_help = r#"EXAMPLES
    Clone or update every repository of an organization over SSH:
        $ gitbatch sync org rust-lang -f ~/src --ssh

    Only public, non-fork repositories of a user, eight at a time:
        $ gitbatch sync user octocat -f ~/src --visibility public --exclude-forks -w 8

    See what would happen without touching anything:
        $ gitbatch sync org kubernetes -f ~/src --dry-run

    Switch every mismatched working copy without asking:
        $ gitbatch sync org acme -f ~/src --ssh --policy automatic

    Generate shell completions:
        $ gitbatch completions bash > ~/.local/share/bash-completion/completions/gitbatch

CONFIGURATION
    Gitbatch reads configuration from, in increasing priority:
      1. ~/.config/gitbatch/config.toml (or $XDG_CONFIG_HOME/gitbatch/config.toml)
      2. ./gitbatch.toml
      3. Environment variables (GITBATCH_ prefix, e.g. GITBATCH_SYNC__MAX_WORKERS)
      4. Command-line flags
    A .env file in the current directory is loaded first.

ENVIRONMENT VARIABLES
    GITHUB_TOKEN                   GitHub personal access token (same as --token)
    GITBATCH_GITHUB__TOKEN         GitHub personal access token
    GITBATCH_GITHUB__API_URL       API base URL (default: https://api.github.com)
    GITBATCH_SYNC__LOCAL_FOLDER    Workspace root
    GITBATCH_SYNC__MAX_WORKERS     Parallel clones/pulls (default: 4)
    GITBATCH_CACHE__ENABLED        Cache the inventory between runs (default: true)
"#)]
struct Cli {
    /// Log filter used when output is not a terminal (e.g. "debug", "gitbatch=trace")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone missing and pull existing repositories of a user or organization
    Sync(SyncArgs),
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate man pages
    Man {
        /// Directory to write man pages into (prints the main page to stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Structured logging only when not attached to a terminal
    if !Term::stdout().is_term() {
        let env_filter = match cli.log_level.as_deref() {
            Some(level) => EnvFilter::try_new(level)?,
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gitbatch=info,gitbatch_cli=info")),
        };

        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Completions { shell } => commands::meta::handle_completions(shell),
        Commands::Man { output } => commands::meta::handle_man(output),
        Commands::Sync(args) => {
            let config = config::Config::load();

            let cancel = CancellationFlag::new();
            shutdown::setup_shutdown_handler(cancel.clone());

            if !commands::sync::handle_sync(args, config, cancel).await? {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
