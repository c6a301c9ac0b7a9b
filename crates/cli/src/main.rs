mod relay;
mod validate_command;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "courier", about = "Courier: relay Telegram messages along routes kept in a Google Sheet")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (overrides discovery of ./courier.toml and friends).
    #[arg(long, global = true, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay (default when no subcommand is provided).
    Run,
    /// Read the routing sheet once and print the resulting route table.
    Check {
        /// Print the report and routes as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the source key each input normalizes to.
    Normalize {
        #[arg(required = true, allow_negative_numbers = true)]
        raw: Vec<String>,
    },
    /// Validate the configuration and report errors/warnings.
    Validate {
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn normalize(raw: &[String]) {
    for input in raw {
        let key = courier_routing::normalize(input);
        if key.is_empty() {
            println!("{input:?} -> (empty, never routed)");
        } else {
            println!("{input:?} -> {key}");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    if let Some(Commands::Normalize { raw }) = &cli.command {
        normalize(raw);
        return Ok(());
    }

    let loaded = courier_config::resolve(cli.config.as_deref())?;

    match cli.command {
        None | Some(Commands::Run) => {
            info!(version = env!("CARGO_PKG_VERSION"), "courier starting");
            relay::run(loaded.config).await
        },
        Some(Commands::Check { json }) => relay::check(loaded.config, json).await,
        Some(Commands::Validate { verbose }) => validate_command::run(&loaded, verbose),
        Some(Commands::Normalize { .. }) => Ok(()),
    }
}
