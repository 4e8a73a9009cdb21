//! shroud CLI entry point

use clap::Parser;
use shroud_cli::{Cli, CliOverrides, Config, ExitCode};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    // Write a sample config on first run, unless a custom path was given
    if cli.config.is_none() {
        if let Some(path) = Config::default_path() {
            if let Err(e) = Config::create_default_if_missing(&path) {
                eprintln!("Warning: Could not create default config: {e}");
            }
        }
    }

    let config = match Config::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Config error: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };

    let config = match config.with_process_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::InvalidInput.to_exit_code();
        }
    };

    let overrides = CliOverrides {
        directory_url: cli.directory_url.clone(),
        own_id: cli.own_id,
        data_dir: cli.data_dir.clone(),
        debug: cli.debug,
    };
    let config = config.with_overrides(&overrides);

    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        return ExitCode::InvalidInput.to_exit_code();
    }

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    // Logs go to stderr; stdout carries envelopes and plaintext.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.execute_with_config(config).await {
        Ok(code) => code.to_exit_code(),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::GeneralError.to_exit_code()
        }
    }
}
