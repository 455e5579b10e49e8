use std::time::Duration;

use regex::Regex;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

/// Embedded copy of `config/default.toml`, used when no file is found on disk.
pub const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub mailbox: MailboxConfig,
    pub waiter: WaiterConfig,
    pub captcha: CaptchaConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub user_agent: String,
    pub connect_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailboxConfig {
    pub api_url: String,
    pub inbox_name: String,
    pub inbox_prefix: String,
    /// Sender address must match this regex.
    pub from_pattern: String,
    /// Subject must match this regex; capture group 1 is the code.
    pub subject_pattern: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WaiterConfig {
    pub timeout_seconds: u64,
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptchaConfig {
    pub api_url: String,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_seconds: u64,
    #[serde(default = "default_captcha_poll")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_captcha_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IdentityConfig {
    /// When set, names are random alphanumeric strings of this length
    /// instead of word pairs.
    pub name_length: Option<usize>,
}

fn default_initial_delay() -> u64 { 15 }
fn default_captcha_poll() -> u64 { 5 }
fn default_captcha_timeout() -> u64 { 180 }

impl AppConfig {
    /// Parse a TOML document into a config. Does not validate.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read a config file, falling back to the embedded default when the path
    /// does not exist.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(source) => Self::from_toml(&source),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path, "config file not found, using defaults");
                Self::from_toml(DEFAULT_CONFIG)
            }
            Err(e) => Err(ConfigError::Io {
                path: path.to_string(),
                source: e,
            }),
        }
    }

    /// Apply `REGFLOW_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let parse_secs = |v: String| v.parse::<u64>().ok().filter(|&n| n > 0);

        if let Some(n) = lookup("REGFLOW_WAIT_TIMEOUT").and_then(parse_secs) {
            self.waiter.timeout_seconds = n;
        }
        if let Some(n) = lookup("REGFLOW_POLL_INTERVAL").and_then(parse_secs) {
            self.waiter.poll_interval_seconds = n;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.waiter.timeout_seconds == 0 {
            return Err(invalid("waiter.timeout_seconds", "must be greater than zero"));
        }
        if self.waiter.poll_interval_seconds == 0 {
            return Err(invalid("waiter.poll_interval_seconds", "must be greater than zero"));
        }
        if self.waiter.poll_interval_seconds > self.waiter.timeout_seconds {
            return Err(invalid(
                "waiter.poll_interval_seconds",
                "must not exceed waiter.timeout_seconds",
            ));
        }
        if self.captcha.poll_interval_seconds == 0 || self.captcha.timeout_seconds == 0 {
            return Err(invalid("captcha", "poll interval and timeout must be greater than zero"));
        }
        if self.identity.name_length == Some(0) {
            return Err(invalid("identity.name_length", "must be greater than zero"));
        }

        Regex::new(&self.mailbox.from_pattern)
            .map_err(|e| invalid("mailbox.from_pattern", &e.to_string()))?;
        let subject = Regex::new(&self.mailbox.subject_pattern)
            .map_err(|e| invalid("mailbox.subject_pattern", &e.to_string()))?;
        if subject.captures_len() < 2 {
            return Err(invalid(
                "mailbox.subject_pattern",
                "must contain a capture group for the code",
            ));
        }

        for (key, value) in [
            ("mailbox.api_url", &self.mailbox.api_url),
            ("captcha.api_url", &self.captcha.api_url),
        ] {
            Url::parse(value).map_err(|e| invalid(key, &e.to_string()))?;
        }

        Ok(())
    }
}

impl WaiterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.to_string(),
    }
}

/// API keys for the external services. Read from the environment only and
/// handed to the adapters; the workflow never sees them.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub mailslurp_api_key: SecretString,
    pub twocaptcha_api_key: SecretString,
}

impl Secrets {
    pub const MAILSLURP_VAR: &'static str = "MAILSLURP_API_KEY";
    pub const TWOCAPTCHA_VAR: &'static str = "TWOCAPTCHA_API_KEY";

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from)
                .ok_or_else(|| ConfigError::MissingSecret(key.to_string()))
        };

        Ok(Self {
            mailslurp_api_key: require(Self::MAILSLURP_VAR)?,
            twocaptcha_api_key: require(Self::TWOCAPTCHA_VAR)?,
        })
    }
}

/// Fixed endpoints of the remote service. These belong to the deployment
/// target and are not runtime input.
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub base: Url,
    pub form_page: Url,
    pub register: Url,
    pub captcha_verify: Url,
    pub email_verify: Url,
    pub math_verify: Url,
}

impl ServiceEndpoints {
    pub const DOMAIN: &'static str = "https://challenge.blackscale.media/";
    pub const CAPTCHA_BOT: &'static str = "captcha_bot.php";
    pub const VERIFY_PAGE: &'static str = "verify.php";
    pub const EMAIL_VERIFY_PAGE: &'static str = "captcha_uman.php";

    /// Resolve every stage path against `base`.
    pub fn with_base(base: Url) -> Result<Self, url::ParseError> {
        Ok(Self {
            form_page: base.join(Self::CAPTCHA_BOT)?,
            register: base.join(Self::CAPTCHA_BOT)?,
            captcha_verify: base.join(Self::VERIFY_PAGE)?,
            email_verify: base.join(Self::EMAIL_VERIFY_PAGE)?,
            math_verify: base.join(Self::EMAIL_VERIFY_PAGE)?,
            base,
        })
    }
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        // Constant inputs; a failure here is a typo in the constants above.
        let base = Url::parse(Self::DOMAIN).expect("service domain is a valid URL");
        Self::with_base(base).expect("service paths are valid relative URLs")
    }
}
