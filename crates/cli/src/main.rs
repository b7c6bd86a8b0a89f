//! LexChamber CLI — the main entry point.
//!
//! Commands:
//! - `serve`     — Start the HTTP gateway and chat frontend
//! - `ask`       — Submit one question to a chamber
//! - `chambers`  — List a user's chambers, or print one transcript
//! - `config`    — Show, locate, or initialise the configuration
//! - `status`    — Show the effective configuration
//! - `doctor`    — Diagnose configuration, store, and provider

use clap::{Parser, Subcommand};

mod commands;

use commands::ask::ChamberArg;

#[derive(Parser)]
#[command(
    name = "lexchamber",
    about = "LexChamber — legal consultation assistant",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask one question and print the answer
    Ask {
        /// Authenticated user email
        #[arg(short, long)]
        email: String,

        /// Chamber id, or `new` to open a fresh chamber
        #[arg(short, long, default_value = "new")]
        chamber: ChamberArg,

        /// Title for a new chamber
        #[arg(short, long, default_value = "")]
        title: String,

        /// The question
        #[arg(short, long)]
        message: String,
    },

    /// List chambers, or print one chamber's transcript
    Chambers {
        #[arg(short, long)]
        email: String,

        /// Print the transcript of this chamber
        #[arg(short, long)]
        show: Option<i64>,

        /// Delete this chamber and its turns
        #[arg(long, conflicts_with = "show")]
        delete: Option<i64>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show system status
    Status,

    /// Diagnose system health
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (API key redacted)
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so `ask` output stays pipeable.
    let default = match (&cli.command, cli.verbose) {
        (_, true) => "debug",
        (Commands::Serve { .. }, false) => "info",
        _ => "warn",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Ask {
            email,
            chamber,
            title,
            message,
        } => commands::ask::run(&email, chamber, &title, &message).await?,
        Commands::Chambers {
            email,
            show,
            delete,
        } => commands::chambers::run(&email, show, delete).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show()?,
            ConfigAction::Path => commands::config_cmd::path(),
            ConfigAction::Init => commands::config_cmd::init()?,
        },
        Commands::Status => commands::status::run().await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
