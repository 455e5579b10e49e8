use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use regflow_core::config::HttpConfig;
use regflow_core::TransportError;

use crate::Transport;

/// reqwest-backed transport. Keeps cookies across requests because the
/// service ties its challenge state to the session cookie.
pub struct HttpTransport {
    client: reqwest::Client,
    request_timeout_seconds: u64,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                message: format!("cannot build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            request_timeout_seconds: config.request_timeout_seconds,
        })
    }

    async fn read(
        &self,
        url: &Url,
        request: reqwest::RequestBuilder,
    ) -> Result<String, TransportError> {
        let response = request.send().await.map_err(|e| self.map_error(url, e))?;

        let status = response.status();
        debug!(%url, status = status.as_u16(), "response received");
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| TransportError::Body {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    fn map_error(&self, url: &Url, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.request_timeout_seconds)
        } else {
            TransportError::Request {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<String, TransportError> {
        debug!(%url, "GET");
        self.read(url, self.client.get(url.clone())).await
    }

    async fn post_form(&self, url: &Url, fields: &[(&str, &str)]) -> Result<String, TransportError> {
        debug!(%url, fields = fields.len(), "POST");
        self.read(url, self.client.post(url.clone()).form(fields)).await
    }
}
