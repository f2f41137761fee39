//! FFU Controller CLI entry point

use clap::Parser;
use ffu_controller::config::CliOverrides;
use ffu_controller::{Cli, Config, ExitCode};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> std::process::ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    let initializing = cli.is_config_init();

    // Create default config on first run
    if cli.config.is_none() && !initializing {
        if let Err(e) = Config::create_default_if_missing() {
            eprintln!("Warning: Could not create default config: {e}");
        }
    }

    // Load config from custom path or default
    let loaded = if initializing {
        Ok(Config::default())
    } else {
        Config::load_from(cli.config.as_deref())
    };
    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Config error: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };

    // Apply CLI overrides to config
    let overrides = CliOverrides {
        output_format: cli.output.map(|format| format.to_string()),
        verbose: if cli.verbose { Some(true) } else { None },
        debug: if cli.debug { Some(true) } else { None },
    };
    let config = config.with_overrides(&overrides);

    // Initialize logging based on config (with CLI override)
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Execute command with resolved config
    match cli.execute_with_config(config).await {
        Ok(code) => code.to_exit_code(),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::GeneralError.to_exit_code()
        }
    }
}
