use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use regflow_core::{Identity, ServiceEndpoints};
use regflow_parser::{ChallengeDocument, Field};

use crate::core::*;
use crate::{CodeWaiter, FlowError, MathChallenge, StageError};

// Form field names expected by the service
const FULLNAME: &str = "fullname";
const EMAIL: &str = "email";
const STOKEN: &str = "stoken";
const CAPTCHA_RESPONSE: &str = "g-captcha-response";
const SITEKEY: &str = "sitekey";
const EMAIL_CODE: &str = "code";
const TS: &str = "ts";
const SOLUTION: &str = "solution";

/// Drives one registration run through every stage, strictly in order.
///
/// Each stage issues at most one request and checks the response for the
/// service's error marker before reading any field from it. A missing field
/// ends the run; only the code waiter retries.
pub struct RegistrationEngine {
    transport: Arc<dyn Transport>,
    mailbox: Arc<dyn MailboxProvider>,
    solver: Arc<dyn ChallengeSolver>,
    endpoints: ServiceEndpoints,
    waiter: CodeWaiter,
}

impl RegistrationEngine {
    pub fn new(
        transport: Arc<dyn Transport>,
        mailbox: Arc<dyn MailboxProvider>,
        solver: Arc<dyn ChallengeSolver>,
        endpoints: ServiceEndpoints,
        waiter: CodeWaiter,
    ) -> Self {
        Self {
            transport,
            mailbox,
            solver,
            endpoints,
            waiter,
        }
    }

    /// Run the workflow for `identity` to completion or failure.
    pub async fn run(&self, identity: Identity) -> Result<WorkflowOutcome, StageError> {
        let mut session = Session::new(identity);
        info!(
            "Starting registration for '{}' at {}",
            session.identity.full_name, self.endpoints.base
        );

        if let Err(e) = self.drive(&mut session).await {
            let error = session.fail(e);
            warn!("✗ Registration failed at {}: {}", error.stage, error.source);
            return Err(error);
        }

        let outcome = WorkflowOutcome {
            completion_token: session.completion_token().unwrap_or_default().to_string(),
            email: session.email().unwrap_or_default().to_string(),
            full_name: session.identity.full_name.clone(),
            transitions: session.transitions().to_vec(),
            duration: session.duration(),
        };
        info!("{}", outcome.summary());
        Ok(outcome)
    }

    async fn drive(&self, session: &mut Session) -> Result<(), FlowError> {
        self.acquire_session_token(session).await?;
        let captcha_page = self.submit_registration(session).await?;
        extract_site_key(session, &captcha_page)?;
        self.solve_captcha(session).await?;
        self.verify_captcha(session).await?;
        self.receive_email_code(session).await?;
        let math_page = self.submit_email_code(session).await?;
        extract_math_challenge(session, &math_page)?;
        solve_math_challenge(session)?;
        let final_page = self.submit_math_answer(session).await?;
        extract_completion_token(session, &final_page)
    }

    // Init -> SessionTokenAcquired
    async fn acquire_session_token(&self, session: &mut Session) -> Result<(), FlowError> {
        let form_page = self.fetch(&self.endpoints.form_page, &[Field::SessionToken]).await?;
        session.set_session_token(require(&form_page, Field::SessionToken)?);
        session.advance(Some("session token extracted".to_string()));
        Ok(())
    }

    // -> RegistrationSubmitted
    async fn submit_registration(&self, session: &mut Session) -> Result<ChallengeDocument, FlowError> {
        self.ensure_mailbox(session).await?;

        let captcha_page = {
            let stoken = captured(session.session_token(), "stoken")?;
            let email = captured(session.email(), "email")?;
            self.submit(
                &self.endpoints.register,
                &[
                    (FULLNAME, session.identity.full_name.as_str()),
                    (EMAIL, email),
                    (STOKEN, stoken),
                ],
                &[Field::SiteKey],
            )
            .await?
        };

        let details = format!("registered as {}", session.email().unwrap_or_default());
        session.advance(Some(details));
        Ok(captcha_page)
    }

    // -> CaptchaSolved
    async fn solve_captcha(&self, session: &mut Session) -> Result<(), FlowError> {
        info!("Delegating CAPTCHA to {}", self.solver.name());
        let solution = {
            let site_key = captured(session.site_key(), "siteKey")?;
            self.solver.solve(site_key, &self.endpoints.register).await?
        };

        let details = format!("{} byte solution", solution.len());
        session.set_captcha_solution(solution);
        session.advance(Some(details));
        Ok(())
    }

    // -> CaptchaVerified; the body carries nothing we need
    async fn verify_captcha(&self, session: &mut Session) -> Result<(), FlowError> {
        {
            let solution = captured(session.captcha_solution(), "captchaSolution")?;
            let site_key = captured(session.site_key(), "siteKey")?;
            self.submit(
                &self.endpoints.captcha_verify,
                &[(CAPTCHA_RESPONSE, solution), (SITEKEY, site_key)],
                &[],
            )
            .await?;
        }

        session.advance(Some("CAPTCHA accepted".to_string()));
        Ok(())
    }

    // -> EmailCodeReceived
    async fn receive_email_code(&self, session: &mut Session) -> Result<(), FlowError> {
        let code = {
            let mailbox = captured(session.mailbox(), "mailbox")?;
            self.waiter.await_code(self.mailbox.as_ref(), mailbox).await?
        };

        session.set_email_code(code);
        session.advance(Some("verification code received".to_string()));
        Ok(())
    }

    // -> EmailCodeSubmitted
    async fn submit_email_code(&self, session: &mut Session) -> Result<ChallengeDocument, FlowError> {
        let math_page = {
            let code = captured(session.email_code(), "emailCode")?;
            self.submit(
                &self.endpoints.email_verify,
                &[(EMAIL_CODE, code)],
                &[Field::OperandA, Field::OperandB, Field::Timestamp],
            )
            .await?
        };

        session.advance(Some("verification code accepted".to_string()));
        Ok(math_page)
    }

    // -> MathChallengeSubmitted
    async fn submit_math_answer(&self, session: &mut Session) -> Result<ChallengeDocument, FlowError> {
        let final_page = {
            let challenge = captured(session.math(), "mathChallenge")?;
            let answer = captured(session.math_answer(), "mathAnswer")?;
            self.submit(
                &self.endpoints.math_verify,
                &[(TS, challenge.ts.as_str()), (SOLUTION, answer)],
                &[Field::CompletionToken],
            )
            .await?
        };

        session.advance(Some("math answer accepted".to_string()));
        Ok(final_page)
    }

    /// The mailbox is provisioned on first use and reused afterwards.
    async fn ensure_mailbox(&self, session: &mut Session) -> Result<(), FlowError> {
        if session.mailbox().is_some() {
            return Ok(());
        }

        let mailbox = self.mailbox.provision().await?;
        info!("Provisioned {} via {}", mailbox.address, self.mailbox.name());
        session.set_mailbox(mailbox);
        Ok(())
    }

    async fn fetch(&self, url: &Url, wanted: &[Field]) -> Result<ChallengeDocument, FlowError> {
        let body = self.transport.get(url).await?;
        inspect(body, wanted)
    }

    async fn submit(
        &self,
        url: &Url,
        fields: &[(&str, &str)],
        wanted: &[Field],
    ) -> Result<ChallengeDocument, FlowError> {
        let body = self.transport.post_form(url, fields).await?;
        inspect(body, wanted)
    }
}

/// Parse a response, failing on the service's error marker.
fn inspect(body: String, wanted: &[Field]) -> Result<ChallengeDocument, FlowError> {
    let doc = ChallengeDocument::extract(body, wanted);
    match doc.rejection() {
        Some(message) => Err(FlowError::RemoteRejection(message.to_string())),
        None => Ok(doc),
    }
}

fn require(doc: &ChallengeDocument, field: Field) -> Result<String, FlowError> {
    doc.get(field)
        .map(str::to_string)
        .ok_or(FlowError::FieldNotFound(field))
}

/// A value an earlier stage stored in the session.
fn captured<'s, T: ?Sized>(value: Option<&'s T>, name: &'static str) -> Result<&'s T, FlowError> {
    value.ok_or(FlowError::MissingCapture(name))
}

// -> CaptchaChallengeExtracted
fn extract_site_key(session: &mut Session, captcha_page: &ChallengeDocument) -> Result<(), FlowError> {
    let site_key = require(captcha_page, Field::SiteKey)?;
    let details = format!("site key {site_key}");
    session.set_site_key(site_key);
    session.advance(Some(details));
    Ok(())
}

// -> MathChallengeExtracted
fn extract_math_challenge(session: &mut Session, math_page: &ChallengeDocument) -> Result<(), FlowError> {
    let challenge = MathChallenge::from_document(math_page)?;
    let details = format!("operands {} and {}", challenge.a, challenge.b);
    session.set_math(challenge);
    session.advance(Some(details));
    Ok(())
}

// -> MathChallengeSolved
fn solve_math_challenge(session: &mut Session) -> Result<(), FlowError> {
    let answer = captured(session.math(), "mathChallenge")?.solve()?;
    let details = format!("answer {answer}");
    session.set_math_answer(answer);
    session.advance(Some(details));
    Ok(())
}

// -> Completed
fn extract_completion_token(session: &mut Session, final_page: &ChallengeDocument) -> Result<(), FlowError> {
    session.set_completion_token(require(final_page, Field::CompletionToken)?);
    session.advance(Some("completion token extracted".to_string()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use regflow_core::{MailMessage, TransportError};
    use tokio::time::Instant;

    use super::*;
    use crate::MailboxError;
    use crate::testing::{FakeMailbox, FakeSolver, ScriptedTransport};

    const FORM_PAGE: &str = r#"
        <html><body>
        <form method="post" action="captcha_bot.php">
            <input type="text" name="fullname">
            <input type="email" name="email">
            <input type="hidden" name="stoken" value="st-5c1e">
            <button type="submit">Register</button>
        </form>
        </body></html>
    "#;
    const CAPTCHA_PAGE: &str = r#"
        <div class="verification-box">
            <div class="g-recaptcha" data-captcha-code="6LfD3PIbAAAAAJs_eEHvoOl75_83eXSqpPSRFJ_u"></div>
        </div>
    "#;
    const VERIFIED_PAGE: &str = r#"<p>Check your inbox for a verification code.</p>"#;
    const MATH_PAGE: &str = r#"
        <div class="verification-box">
            <p>Prove you are human: <b id="a">3</b> and <b id="b">4</b></p>
            <form method="post"><input type="hidden" name="ts" value="1718031337.4410"></form>
        </div>
    "#;
    const FINAL_PAGE: &str = r#"
        <div class="verification-box"><p>All done.</p><code class="token">cmpl-77f1d0e2</code></div>
    "#;

    fn code_mail() -> MailMessage {
        MailMessage::new(
            "verify@blackscale.media",
            "Email Verification Code - K7P2QX",
        )
    }

    fn waiter(timeout_secs: u64, interval_secs: u64) -> CodeWaiter {
        CodeWaiter::new(
            r"@blackscale\.media",
            r"Email\s+Verification\s+Code\s+-\s+(\w{6})$",
            Duration::from_secs(timeout_secs),
            Duration::from_secs(interval_secs),
        )
        .unwrap()
    }

    struct Harness {
        transport: Arc<ScriptedTransport>,
        mailbox: Arc<FakeMailbox>,
        solver: Arc<FakeSolver>,
        engine: RegistrationEngine,
    }

    fn harness(transport: ScriptedTransport, mailbox: FakeMailbox, solver: FakeSolver) -> Harness {
        let transport = Arc::new(transport);
        let mailbox = Arc::new(mailbox);
        let solver = Arc::new(solver);
        let engine = RegistrationEngine::new(
            transport.clone(),
            mailbox.clone(),
            solver.clone(),
            ServiceEndpoints::default(),
            waiter(60, 5),
        );
        Harness {
            transport,
            mailbox,
            solver,
            engine,
        }
    }

    fn identity() -> Identity {
        Identity::new("Brave Falcon")
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_completes() {
        let h = harness(
            ScriptedTransport::new([FORM_PAGE, CAPTCHA_PAGE, VERIFIED_PAGE, MATH_PAGE, FINAL_PAGE]),
            FakeMailbox::with_messages(vec![code_mail()]).arriving_after(2),
            FakeSolver::returning("03AGdBq25-solved"),
        );

        let outcome = h.engine.run(identity()).await.unwrap();

        assert_eq!(outcome.completion_token, "cmpl-77f1d0e2");
        assert_eq!(outcome.email, h.mailbox.address());
        assert_eq!(outcome.full_name, "Brave Falcon");
        assert_eq!(outcome.transitions.len(), 11);
        assert_eq!(outcome.transitions.last().map(|t| t.to), Some(Stage::Completed));
        assert_eq!(h.mailbox.provisions(), 1);

        let requests = h.transport.requests();
        assert_eq!(requests.len(), 5);

        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].url, "https://challenge.blackscale.media/captcha_bot.php");

        assert_eq!(requests[1].method, "POST");
        assert_eq!(requests[1].field("fullname"), Some("Brave Falcon"));
        assert_eq!(requests[1].field("email"), Some(h.mailbox.address()));
        assert_eq!(requests[1].field("stoken"), Some("st-5c1e"));

        assert_eq!(requests[2].url, "https://challenge.blackscale.media/verify.php");
        assert_eq!(requests[2].field("g-captcha-response"), Some("03AGdBq25-solved"));
        assert_eq!(
            requests[2].field("sitekey"),
            Some("6LfD3PIbAAAAAJs_eEHvoOl75_83eXSqpPSRFJ_u")
        );

        assert_eq!(requests[3].url, "https://challenge.blackscale.media/captcha_uman.php");
        assert_eq!(requests[3].field("code"), Some("K7P2QX"));

        assert_eq!(requests[4].field("ts"), Some("1718031337.4410"));
        assert_eq!(requests[4].field("solution"), Some("12"));

        assert_eq!(
            h.solver.calls(),
            vec![(
                "6LfD3PIbAAAAAJs_eEHvoOl75_83eXSqpPSRFJ_u".to_string(),
                "https://challenge.blackscale.media/captcha_bot.php".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_missing_session_token_stops_immediately() {
        let h = harness(
            ScriptedTransport::new([r#"<form><input type="text" name="stoken" value="x"></form>"#]),
            FakeMailbox::with_messages(vec![code_mail()]),
            FakeSolver::returning("unused"),
        );

        let err = h.engine.run(identity()).await.unwrap_err();

        assert_eq!(err.stage, Stage::SessionTokenAcquired);
        assert!(matches!(err.source, FlowError::FieldNotFound(Field::SessionToken)));
        assert_eq!(h.transport.requests().len(), 1);
        assert_eq!(h.mailbox.provisions(), 0);
        assert!(h.solver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_site_key() {
        let h = harness(
            ScriptedTransport::new([FORM_PAGE, "<div class=\"verification-box\">no widget</div>"]),
            FakeMailbox::with_messages(vec![code_mail()]),
            FakeSolver::returning("unused"),
        );

        let err = h.engine.run(identity()).await.unwrap_err();

        assert_eq!(err.stage, Stage::CaptchaChallengeExtracted);
        assert!(matches!(err.source, FlowError::FieldNotFound(Field::SiteKey)));
        assert!(err.to_string().contains("siteKey"));
        assert!(h.solver.calls().is_empty());
        assert_eq!(h.transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_error_marker_beats_valid_fields() {
        let rejected = r#"
            <div class="error">Invalid session token</div>
            <div data-captcha-code="6LfD3PIbAAAAAJs"></div>
        "#;
        let h = harness(
            ScriptedTransport::new([FORM_PAGE, rejected]),
            FakeMailbox::with_messages(vec![code_mail()]),
            FakeSolver::returning("unused"),
        );

        let err = h.engine.run(identity()).await.unwrap_err();

        assert_eq!(err.stage, Stage::RegistrationSubmitted);
        match err.source {
            FlowError::RemoteRejection(message) => assert_eq!(message, "Invalid session token"),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(h.solver.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_email_never_arrives() {
        let h = harness(
            ScriptedTransport::new([FORM_PAGE, CAPTCHA_PAGE, VERIFIED_PAGE]),
            FakeMailbox::with_messages(vec![MailMessage::new(
                "newsletter@elsewhere.test",
                "Email Verification Code - K7P2QX",
            )]),
            FakeSolver::returning("03AGdBq25-solved"),
        );

        let started = Instant::now();
        let err = h.engine.run(identity()).await.unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(err.stage, Stage::EmailCodeReceived);
        assert!(matches!(err.source, FlowError::CodeTimeout { polls: 12, .. }));
        assert!(elapsed >= Duration::from_secs(60));
        assert!(elapsed < Duration::from_secs(65));
        assert_eq!(h.mailbox.polls(), 12);
        // nothing is posted after the wait gives up
        assert_eq!(h.transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_completion_token() {
        let h = harness(
            ScriptedTransport::new([
                FORM_PAGE,
                CAPTCHA_PAGE,
                VERIFIED_PAGE,
                MATH_PAGE,
                "<div class=\"verification-box\">Thanks</div>",
            ]),
            FakeMailbox::with_messages(vec![code_mail()]),
            FakeSolver::returning("03AGdBq25-solved"),
        );

        let err = h.engine.run(identity()).await.unwrap_err();
        assert_eq!(err.stage, Stage::Completed);
        assert!(matches!(err.source, FlowError::FieldNotFound(Field::CompletionToken)));
    }

    #[tokio::test]
    async fn test_blank_completion_token_is_missing() {
        let h = harness(
            ScriptedTransport::new([
                FORM_PAGE,
                CAPTCHA_PAGE,
                VERIFIED_PAGE,
                MATH_PAGE,
                r#"<div class="verification-box"><code class="token">  </code></div>"#,
            ]),
            FakeMailbox::with_messages(vec![code_mail()]),
            FakeSolver::returning("03AGdBq25-solved"),
        );

        let err = h.engine.run(identity()).await.unwrap_err();
        assert_eq!(err.stage, Stage::Completed);
        assert!(matches!(err.source, FlowError::FieldNotFound(Field::CompletionToken)));
        assert_eq!(h.transport.requests().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_mailbox_key_fails_without_waiting() {
        let h = harness(
            ScriptedTransport::new([FORM_PAGE, CAPTCHA_PAGE, VERIFIED_PAGE]),
            FakeMailbox::empty().failing_first(u32::MAX).failing_with(401),
            FakeSolver::returning("03AGdBq25-solved"),
        );

        let started = Instant::now();
        let err = h.engine.run(identity()).await.unwrap_err();

        assert_eq!(err.stage, Stage::EmailCodeReceived);
        assert!(matches!(err.source, FlowError::Mailbox(MailboxError::Status(401))));
        assert!(err.to_string().contains("HTTP 401"));
        assert_eq!(h.mailbox.polls(), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_solver_failure() {
        let h = harness(
            ScriptedTransport::new([FORM_PAGE, CAPTCHA_PAGE]),
            FakeMailbox::with_messages(vec![code_mail()]),
            FakeSolver::failing(),
        );

        let err = h.engine.run(identity()).await.unwrap_err();
        assert_eq!(err.stage, Stage::CaptchaSolved);
        assert!(matches!(err.source, FlowError::Solving(_)));
        assert_eq!(h.transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_retried() {
        let transport = ScriptedTransport::new([FORM_PAGE, CAPTCHA_PAGE]);
        transport.push_error(TransportError::Status {
            url: "https://challenge.blackscale.media/verify.php".into(),
            status: 502,
        });
        let h = harness(
            transport,
            FakeMailbox::with_messages(vec![code_mail()]),
            FakeSolver::returning("03AGdBq25-solved"),
        );

        let err = h.engine.run(identity()).await.unwrap_err();
        assert_eq!(err.stage, Stage::CaptchaVerified);
        assert!(matches!(
            err.source,
            FlowError::Transport(TransportError::Status { status: 502, .. })
        ));
        assert_eq!(h.transport.requests().len(), 3);
        assert_eq!(h.mailbox.polls(), 0);
    }

    #[tokio::test]
    async fn test_missing_math_operand() {
        let h = harness(
            ScriptedTransport::new([
                FORM_PAGE,
                CAPTCHA_PAGE,
                VERIFIED_PAGE,
                r#"<div class="verification-box"><b id="a">3</b>
                   <form><input type="hidden" name="ts" value="1"></form></div>"#,
            ]),
            FakeMailbox::with_messages(vec![code_mail()]),
            FakeSolver::returning("03AGdBq25-solved"),
        );

        let err = h.engine.run(identity()).await.unwrap_err();
        assert_eq!(err.stage, Stage::MathChallengeExtracted);
        assert!(matches!(err.source, FlowError::FieldNotFound(Field::OperandB)));
        assert_eq!(h.transport.requests().len(), 4);
    }
}
