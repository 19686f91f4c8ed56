//! CountMeIn CLI
//!
//! Command-line interface for CountMeIn - shared song-request queues for
//! karaoke and open-mic nights.

use std::fs::File;
use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use countmein_core::{Config, MAX_ROOM_TTL_HOURS};

mod commands;
mod output;

use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "countmein")]
#[command(about = "CountMeIn - song-request queues for karaoke and open-mic nights")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Use this config file instead of the default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and inspect rooms
    Room {
        #[command(subcommand)]
        command: RoomCommands,
    },
    /// Submit and manage song requests
    Request {
        #[command(subcommand)]
        command: RequestCommands,
    },
    /// Follow a room live until interrupted
    Watch {
        /// Room code
        code: String,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum RoomCommands {
    /// Create a new room hosted from this device
    #[command(alias = "new")]
    Create,
    /// Show a room and its queue
    Show {
        /// Room code
        code: String,
    },
    /// Check whether a room exists
    Exists {
        /// Room code
        code: String,
    },
    /// Push a room's expiry further out (host only)
    Extend {
        /// Room code
        code: String,
        /// Hours to add (defaults to room_ttl_hours, at most one year)
        #[arg(
            long,
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_ROOM_TTL_HOURS))
        )]
        hours: Option<u32>,
    },
    /// Print the join link for a room
    Link {
        /// Room code
        code: String,
    },
}

#[derive(Subcommand)]
enum RequestCommands {
    /// Request a song as a guest
    #[command(alias = "create")]
    Add {
        /// Room code
        code: String,
        /// Your name
        #[arg(short, long)]
        guest: String,
        /// Song to perform
        #[arg(short, long)]
        song: String,
        /// Optional YouTube link
        #[arg(short, long)]
        link: Option<String>,
    },
    /// Set a request's status (host only)
    Status {
        /// Room code
        code: String,
        /// Request ID
        request_id: String,
        /// New status (pending, next, ongoing, completed)
        status: String,
    },
    /// Remove a request from the queue (host only)
    #[command(alias = "rm")]
    Remove {
        /// Room code
        code: String,
        /// Request ID
        request_id: String,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, write_mode, join_base_url, ...)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from_flags(cli.json, cli.quiet);

    // Config commands must work even when the file is broken
    if let Commands::Config { command } = &cli.command {
        let output = Output::new(format, Config::default().join_base_url);
        return handle_config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())?;
    init_logging(&config, cli.verbose);

    let output = Output::new(format, config.join_base_url.clone());

    match cli.command {
        Commands::Room { command } => handle_room_command(command, &config, &output).await,
        Commands::Request { command } => handle_request_command(command, &config, &output).await,
        Commands::Watch { code } => commands::watch::watch(&config, code, &output).await,
        Commands::Config { .. } => unreachable!(), // Handled above
    }
}

async fn handle_room_command(command: RoomCommands, config: &Config, output: &Output) -> Result<()> {
    match command {
        RoomCommands::Create => commands::room::create(config, output).await,
        RoomCommands::Show { code } => commands::room::show(config, code, output).await,
        RoomCommands::Exists { code } => commands::room::exists(config, code, output).await,
        RoomCommands::Extend { code, hours } => {
            commands::room::extend(config, code, hours, output).await
        }
        RoomCommands::Link { code } => commands::room::link(config, code, output),
    }
}

async fn handle_request_command(
    command: RequestCommands,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        RequestCommands::Add {
            code,
            guest,
            song,
            link,
        } => commands::request::add(config, code, guest, song, link, output).await,
        RequestCommands::Status {
            code,
            request_id,
            status,
        } => commands::request::status(config, code, request_id, status, output).await,
        RequestCommands::Remove { code, request_id } => {
            commands::request::remove(config, code, request_id, output).await
        }
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

/// Set up tracing
///
/// RUST_LOG takes precedence over `-v`. Without either, only warnings are
/// shown. Logs go to `log_file` when configured, otherwise stderr.
fn init_logging(config: &Config, verbose: u8) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        };
        EnvFilter::new(format!("countmein_core={},countmein={}", level, level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    // Ignore the error if a subscriber is already installed
    let _ = match &config.log_file {
        Some(log_path) => match File::create(log_path) {
            Ok(log_file) => builder.with_ansi(false).with_writer(log_file).try_init(),
            Err(e) => {
                eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
                builder.with_writer(std::io::stderr).try_init()
            }
        },
        None => builder.with_writer(std::io::stderr).try_init(),
    };
}
