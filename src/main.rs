//! tablegate command-line driver
//!
//! Runs one operation request (or lists grants) as a given principal and
//! prints the result as JSON.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tablegate::common::config::TablegateConfig;
use tablegate::common::types::{ApiError, Principal, UserId};
use tablegate::TablegateService;

#[derive(Parser, Debug)]
#[command(name = "tablegate")]
#[command(about = "Permission-aware table access", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "tablegate.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Override policy.max_records_per_request
    #[arg(long, env = "TABLEGATE_MAX_RECORDS")]
    max_records: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute one operation request
    Exec {
        /// Caller's user id
        #[arg(long)]
        user_id: UserId,

        /// Run as an admin (bypasses grants)
        #[arg(long)]
        admin: bool,

        /// Request as inline JSON
        #[arg(long, conflicts_with = "request_file", required_unless_present = "request_file")]
        request: Option<String>,

        /// Request read from a JSON file
        #[arg(long)]
        request_file: Option<PathBuf>,
    },
    /// List the grants held by a user
    Grants {
        /// Caller's user id
        #[arg(long)]
        user_id: UserId,

        /// Run as an admin
        #[arg(long)]
        admin: bool,

        /// User whose grants to list (admins only; defaults to the caller)
        #[arg(long)]
        of: Option<UserId>,
    },
}

fn principal(user_id: UserId, admin: bool) -> Principal {
    if admin {
        Principal::admin(user_id)
    } else {
        Principal::user(user_id)
    }
}

fn print_error(err: &tablegate::common::Error) -> anyhow::Result<ExitCode> {
    let body = ApiError::from(err);
    eprintln!("{}", serde_json::to_string_pretty(&body)?);
    Ok(ExitCode::FAILURE)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .init();

    // Load configuration
    let mut config = if args.config.exists() {
        TablegateConfig::load(&args.config)?
    } else {
        info!("Using default configuration");
        TablegateConfig::default()
    };
    if let Some(max_records) = args.max_records {
        config.policy.max_records_per_request = max_records;
        config.validate()?;
    }

    let service = TablegateService::new(config).await?;

    match args.command {
        Command::Exec {
            user_id,
            admin,
            request,
            request_file,
        } => {
            let raw = match (request, request_file) {
                (Some(inline), _) => inline,
                (None, Some(path)) => std::fs::read_to_string(path)?,
                (None, None) => anyhow::bail!("either --request or --request-file is required"),
            };

            let value = match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(e) => {
                    let err: tablegate::common::Error = e.into();
                    return print_error(&err);
                }
            };

            match service.execute_json(value, &principal(user_id, admin)).await {
                Ok(outcome) => {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => print_error(&e),
            }
        }
        Command::Grants { user_id, admin, of } => {
            match service.admin().list(&principal(user_id, admin), of).await {
                Ok(grants) => {
                    println!("{}", serde_json::to_string_pretty(&grants)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => print_error(&e),
            }
        }
    }
}
