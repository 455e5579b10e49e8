use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "regflow", about = "Registers a disposable identity through the human-verification flow")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml", global = true)]
    pub config: String,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the registration flow once and print the completion token
    Register {
        /// Seconds to wait for the emailed code
        #[arg(long)]
        timeout: Option<u64>,

        /// Seconds between inbox checks
        #[arg(long)]
        poll_interval: Option<u64>,

        /// Display name to register with (generated when omitted)
        #[arg(long)]
        name: Option<String>,
    },
    /// Load and validate the configuration, and report which secrets are set
    CheckConfig,
}
