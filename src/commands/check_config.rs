use regflow_core::{AppConfig, Secrets};

/// Validate the loaded configuration and report secret presence.
/// Returns whether everything needed for a run is in place.
pub fn run(config: &AppConfig) -> bool {
    let mut ok = true;

    match config.validate() {
        Ok(()) => println!("Configuration:      valid"),
        Err(e) => {
            println!("Configuration:      ERROR - {}", e);
            ok = false;
        }
    }

    println!(
        "Code wait:          {}s, polling every {}s",
        config.waiter.timeout_seconds, config.waiter.poll_interval_seconds
    );

    for var in [Secrets::MAILSLURP_VAR, Secrets::TWOCAPTCHA_VAR] {
        let present = std::env::var(var).map(|v| !v.trim().is_empty()).unwrap_or(false);
        println!("{:<20}{}", format!("{}:", var), if present { "set" } else { "MISSING" });
        ok &= present;
    }

    ok
}
