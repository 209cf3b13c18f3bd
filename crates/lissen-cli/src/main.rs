//! Lissen dashboards CLI
//!
//! Serves the onboarding funnel dashboard over HTTP or prints it to the
//! terminal.

mod commands;

use clap::{Parser, Subcommand};
use commands::{ServeCommand, ShowCommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LISSEN_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "LISSEN_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    /// Settings file
    #[arg(
        long,
        default_value = "config.yaml",
        env = "LISSEN_CONFIG",
        global = true
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the dashboard and JSON API
    Serve(ServeCommand),
    /// Print the onboarding funnel once
    Show(ShowCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // If RUST_LOG is set, use it directly; otherwise use our default filter
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .map_err(|e| anyhow::anyhow!("Invalid RUST_LOG environment variable: {}", e))?
    } else {
        // All lissen crates at the requested level, noisy dependencies at warn
        tracing_subscriber::EnvFilter::try_new(format!(
            "lissen={level},\
             lissen_cli={level},\
             lissen_core={level},\
             lissen_config={level},\
             lissen_query={level},\
             lissen_query_bigquery={level},\
             lissen_query_csv={level},\
             lissen_analytics_funnels={level},\
             tower_http={level},\
             h2=warn,\
             hyper=warn,\
             reqwest=warn,\
             rustls=warn",
            level = cli.log_level
        ))
        .map_err(|e| anyhow::anyhow!("Invalid log level '{}': {}", cli.log_level, e))?
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer() // "compact" or any other value
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve(serve_cmd) => serve_cmd.execute(&cli.config),
        Commands::Show(show_cmd) => show_cmd.execute(&cli.config),
    }
}
