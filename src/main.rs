use clap::Parser;
use flowscope::cli::{commands, Cli};
use flowscope::config::Config;
use flowscope::ObserveError;
use std::io::Write;
use std::process;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Returns `true` when the command was interrupted.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let Some(command) = cli.command else {
        eprintln!("No command specified. Use --help for usage information.");
        process::exit(2);
    };

    let config = Config::load(cli.config.as_deref())?;
    Ok(commands::handle_command(command, &config).await?)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    info!("Starting flowscope v{}", flowscope::VERSION);

    match run(cli).await {
        Ok(false) => {}
        Ok(true) => {
            // A pending stdin read would keep the runtime from shutting down.
            let _ = std::io::stdout().flush();
            process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let usage = e
                .downcast_ref::<ObserveError>()
                .map_or(false, ObserveError::is_usage);
            process::exit(if usage { 2 } else { 1 });
        }
    }
}
