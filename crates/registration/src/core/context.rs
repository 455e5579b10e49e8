use std::fmt;
use std::time::{Duration, Instant, SystemTime};

use regflow_core::{Identity, Mailbox};
use tracing::info;

use crate::{FlowError, MathChallenge, StageError};

/// Position in the registration workflow. Stages only move forward, one at a
/// time; `Failed` is reachable from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    SessionTokenAcquired,
    RegistrationSubmitted,
    CaptchaChallengeExtracted,
    CaptchaSolved,
    CaptchaVerified,
    EmailCodeReceived,
    EmailCodeSubmitted,
    MathChallengeExtracted,
    MathChallengeSolved,
    MathChallengeSubmitted,
    Completed,
    Failed,
}

impl Stage {
    /// The stage that follows this one on the happy path.
    pub fn next(self) -> Stage {
        use Stage::*;
        match self {
            Init => SessionTokenAcquired,
            SessionTokenAcquired => RegistrationSubmitted,
            RegistrationSubmitted => CaptchaChallengeExtracted,
            CaptchaChallengeExtracted => CaptchaSolved,
            CaptchaSolved => CaptchaVerified,
            CaptchaVerified => EmailCodeReceived,
            EmailCodeReceived => EmailCodeSubmitted,
            EmailCodeSubmitted => MathChallengeExtracted,
            MathChallengeExtracted => MathChallengeSolved,
            MathChallengeSolved => MathChallengeSubmitted,
            MathChallengeSubmitted => Completed,
            Completed | Failed => self,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Transition between stages with timestamp and detail
#[derive(Debug, Clone)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    pub timestamp: SystemTime,
    pub details: Option<String>,
}

/// State of one workflow run. Owned by that run only and never persisted.
///
/// Each captured field is written by exactly one stage.
#[derive(Debug)]
pub struct Session {
    pub identity: Identity,
    mailbox: Option<Mailbox>,
    session_token: Option<String>,
    site_key: Option<String>,
    captcha_solution: Option<String>,
    email_code: Option<String>,
    math: Option<MathChallenge>,
    math_answer: Option<String>,
    completion_token: Option<String>,
    stage: Stage,
    transitions: Vec<StageTransition>,
    started_at: Instant,
}

impl Session {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            mailbox: None,
            session_token: None,
            site_key: None,
            captcha_solution: None,
            email_code: None,
            math: None,
            math_answer: None,
            completion_token: None,
            stage: Stage::Init,
            transitions: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Move to the next stage on the happy path.
    pub fn advance(&mut self, details: Option<String>) {
        let next = self.stage.next();
        self.transition(next, details);
    }

    /// Move to `Failed`, tagging `error` with the stage that was being
    /// attempted.
    pub fn fail(&mut self, error: FlowError) -> StageError {
        let attempted = self.stage.next();
        self.transition(Stage::Failed, Some(error.to_string()));
        StageError {
            stage: attempted,
            source: error,
        }
    }

    fn transition(&mut self, to: Stage, details: Option<String>) {
        let from = std::mem::replace(&mut self.stage, to);
        info!(%from, %to, "stage transition");
        self.transitions.push(StageTransition {
            from,
            to,
            timestamp: SystemTime::now(),
            details,
        });
    }

    pub fn mailbox(&self) -> Option<&Mailbox> {
        self.mailbox.as_ref()
    }

    pub fn email(&self) -> Option<&str> {
        self.mailbox.as_ref().map(|m| m.address.as_str())
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    pub fn site_key(&self) -> Option<&str> {
        self.site_key.as_deref()
    }

    pub fn captcha_solution(&self) -> Option<&str> {
        self.captcha_solution.as_deref()
    }

    pub fn email_code(&self) -> Option<&str> {
        self.email_code.as_deref()
    }

    pub fn math(&self) -> Option<&MathChallenge> {
        self.math.as_ref()
    }

    pub fn math_answer(&self) -> Option<&str> {
        self.math_answer.as_deref()
    }

    pub fn completion_token(&self) -> Option<&str> {
        self.completion_token.as_deref()
    }

    pub(crate) fn set_mailbox(&mut self, mailbox: Mailbox) {
        debug_assert!(self.mailbox.is_none(), "mailbox assigned twice");
        self.mailbox = Some(mailbox);
    }

    pub(crate) fn set_session_token(&mut self, value: String) {
        capture(&mut self.session_token, value);
    }

    pub(crate) fn set_site_key(&mut self, value: String) {
        capture(&mut self.site_key, value);
    }

    pub(crate) fn set_captcha_solution(&mut self, value: String) {
        capture(&mut self.captcha_solution, value);
    }

    pub(crate) fn set_email_code(&mut self, value: String) {
        capture(&mut self.email_code, value);
    }

    pub(crate) fn set_math(&mut self, value: MathChallenge) {
        debug_assert!(self.math.is_none(), "math challenge captured twice");
        self.math = Some(value);
    }

    pub(crate) fn set_math_answer(&mut self, value: String) {
        capture(&mut self.math_answer, value);
    }

    pub(crate) fn set_completion_token(&mut self, value: String) {
        capture(&mut self.completion_token, value);
    }

    pub fn transitions(&self) -> &[StageTransition] {
        &self.transitions
    }

    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }
}

fn capture(slot: &mut Option<String>, value: String) {
    debug_assert!(slot.is_none(), "field captured twice");
    *slot = Some(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_are_linear() {
        let mut stage = Stage::Init;
        let mut seen = vec![stage];
        while !stage.is_terminal() {
            stage = stage.next();
            seen.push(stage);
        }
        assert_eq!(seen.len(), 12);
        assert_eq!(seen.last(), Some(&Stage::Completed));
        assert_eq!(Stage::Failed.next(), Stage::Failed);
    }

    #[test]
    fn test_fail_reports_attempted_stage() {
        let mut session = Session::new(Identity::new("quiet falcon"));
        session.advance(None);
        assert_eq!(session.stage(), Stage::SessionTokenAcquired);

        let err = session.fail(FlowError::RemoteRejection("bad token".into()));
        assert_eq!(err.stage, Stage::RegistrationSubmitted);
        assert_eq!(session.stage(), Stage::Failed);
        assert_eq!(session.transitions().len(), 2);
        assert!(err.to_string().starts_with("RegistrationSubmitted: "));
    }
}
