//! 2Captcha adapter for reCAPTCHA v2 challenges
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::time::{self, Instant};
use tracing::{debug, info};
use url::Url;

use regflow_core::config::CaptchaConfig;

use crate::{ChallengeSolver, SolverError};

const NOT_READY: &str = "CAPCHA_NOT_READY";

pub struct TwoCaptchaSolver {
    http_client: reqwest::Client,
    api_url: Url,
    api_key: SecretString,
    schedule: Schedule,
}

/// When to ask `res.php` for the answer.
#[derive(Debug, Clone, Copy)]
struct Schedule {
    initial_delay: Duration,
    poll_interval: Duration,
    timeout: Duration,
}

impl TwoCaptchaSolver {
    pub fn new(config: &CaptchaConfig, api_key: SecretString) -> Result<Self, SolverError> {
        let api_url = Url::parse(&config.api_url).map_err(|e| SolverError::Request(e.to_string()))?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SolverError::Request(e.to_string()))?;

        Ok(Self {
            http_client,
            api_url,
            api_key,
            schedule: Schedule {
                initial_delay: Duration::from_secs(config.initial_delay_seconds),
                poll_interval: Duration::from_secs(config.poll_interval_seconds),
                timeout: Duration::from_secs(config.timeout_seconds),
            },
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, SolverError> {
        self.api_url
            .join(path)
            .map_err(|e| SolverError::Request(e.to_string()))
    }

    async fn call(&self, request: reqwest::RequestBuilder) -> Result<ApiResponse, SolverError> {
        let response = request
            .send()
            .await
            .map_err(|e| SolverError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SolverError::Status(response.status().as_u16()));
        }

        response
            .json::<ApiResponse>()
            .await
            .map_err(|e| SolverError::Request(format!("unexpected response: {e}")))
    }

    /// Submit the task, returning the 2Captcha task id.
    async fn submit(&self, site_key: &str, page_url: &Url) -> Result<String, SolverError> {
        let url = self.endpoint("in.php")?;
        let form = [
            ("key", self.api_key.expose_secret()),
            ("method", "userrecaptcha"),
            ("googlekey", site_key),
            ("pageurl", page_url.as_str()),
            ("json", "1"),
        ];

        match self.call(self.http_client.post(url).form(&form)).await?.into_poll() {
            Poll::Ready(id) => Ok(id),
            Poll::Pending => Err(SolverError::Rejected(NOT_READY.to_string())),
            Poll::Failed(code) => Err(SolverError::Rejected(code)),
        }
    }

    async fn fetch_result(&self, task_id: &str) -> Result<Poll, SolverError> {
        let mut url = self.endpoint("res.php")?;
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret())
            .append_pair("action", "get")
            .append_pair("id", task_id)
            .append_pair("json", "1");

        Ok(self.call(self.http_client.get(url)).await?.into_poll())
    }
}

#[async_trait]
impl ChallengeSolver for TwoCaptchaSolver {
    fn name(&self) -> &str {
        "2Captcha"
    }

    async fn solve(&self, site_key: &str, page_url: &Url) -> Result<String, SolverError> {
        info!("submitting reCAPTCHA to 2Captcha for {}", page_url);
        let started = Instant::now();
        let task_id = self.submit(site_key, page_url).await?;
        debug!(task_id = %task_id, "task accepted");

        let task_id = task_id.as_str();
        let token = wait_for_solution(self.schedule, started, || self.fetch_result(task_id)).await?;
        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "✓ CAPTCHA solved"
        );
        Ok(token)
    }
}

/// Poll `fetch` on `schedule` until the task is solved, the service reports
/// an error, or the timeout (counted from `started`) would be passed.
async fn wait_for_solution<F, Fut>(
    schedule: Schedule,
    started: Instant,
    mut fetch: F,
) -> Result<String, SolverError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll, SolverError>>,
{
    time::sleep(schedule.initial_delay).await;

    loop {
        match fetch().await? {
            Poll::Ready(token) => return Ok(token),
            Poll::Failed(code) => return Err(SolverError::Rejected(code)),
            Poll::Pending => debug!("solution not ready"),
        }

        if started.elapsed() + schedule.poll_interval > schedule.timeout {
            return Err(SolverError::Timeout(schedule.timeout.as_secs()));
        }
        time::sleep(schedule.poll_interval).await;
    }
}

/// Body of both `in.php` and `res.php` when called with `json=1`.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: i64,
    request: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Poll {
    Ready(String),
    Pending,
    Failed(String),
}

impl ApiResponse {
    fn into_poll(self) -> Poll {
        if self.status == 1 {
            Poll::Ready(self.request)
        } else if self.request == NOT_READY {
            Poll::Pending
        } else {
            Poll::Failed(self.request)
        }
    }
}
