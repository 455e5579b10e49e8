use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use regflow_core::{AppConfig, Identity, Secrets, ServiceEndpoints};
use regflow_registration::identity::generate_identity;
use regflow_registration::{
    CodeWaiter, HttpTransport, MailSlurpMailbox, RegistrationEngine, StageError, TwoCaptchaSolver,
    WorkflowOutcome,
};

/// Register command - wires the adapters and runs the flow once.
///
/// The outer `Result` covers setup problems; the inner one is the workflow
/// outcome, which the caller turns into the exit code.
pub async fn run(
    config: AppConfig,
    name: Option<String>,
) -> Result<Result<WorkflowOutcome, StageError>> {
    let secrets = Secrets::from_env()?;

    let transport = HttpTransport::new(&config.http).context("building HTTP transport")?;
    let mailbox = MailSlurpMailbox::new(&config.mailbox, secrets.mailslurp_api_key)
        .context("building MailSlurp client")?;
    let solver = TwoCaptchaSolver::new(&config.captcha, secrets.twocaptcha_api_key)
        .context("building 2Captcha client")?;
    let waiter = CodeWaiter::from_config(&config.mailbox, &config.waiter)
        .context("compiling mailbox patterns")?;

    let engine = RegistrationEngine::new(
        Arc::new(transport),
        Arc::new(mailbox),
        Arc::new(solver),
        ServiceEndpoints::default(),
        waiter,
    );

    let identity = match name {
        Some(name) => Identity::new(name),
        None => generate_identity(config.identity.name_length),
    };
    info!(
        wait_timeout_s = config.waiter.timeout_seconds,
        poll_interval_s = config.waiter.poll_interval_seconds,
        "Starting registration run"
    );

    Ok(engine.run(identity).await)
}
