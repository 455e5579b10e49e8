mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use regflow_core::config::AppConfig;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    // Stages run strictly one after another
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = AppConfig::load(&cli.config)?;
    config.apply_env_overrides();

    match cli.command {
        Commands::Register {
            timeout,
            poll_interval,
            name,
        } => {
            // Individual overrides (take precedence over env)
            if let Some(secs) = timeout {
                config.waiter.timeout_seconds = secs;
            }
            if let Some(secs) = poll_interval {
                config.waiter.poll_interval_seconds = secs;
            }
            config.validate()?;

            match commands::register::run(config, name).await? {
                Ok(outcome) => {
                    println!("{}", outcome.completion_token);
                    println!("{}", outcome.email);
                    if cli.verbose {
                        eprintln!("{}", outcome.summary());
                        for step in outcome.stage_path() {
                            eprintln!("  {}", step);
                        }
                    }
                }
                Err(e) => {
                    eprintln!("error: {}: {}", e.stage, e.source);
                    std::process::exit(1);
                }
            }
        }
        Commands::CheckConfig => {
            if !commands::check_config::run(&config) {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
