//! Relay client over the one-shot command endpoint.

use crate::error::{PageError, PageResult};
use crate::traits::RelayPort;
use async_trait::async_trait;
use burner_core::protocol::{Command, ContextId, Response};
use reqwest::Url;
use std::time::Duration;

/// Header naming the page context a command comes from.
const CONTEXT_HEADER: &str = "x-burner-context";

/// Posts commands to `POST /v1/commands` on a running relay.
#[derive(Clone)]
pub struct HttpRelayClient {
    http: reqwest::Client,
    endpoint: Url,
    context: ContextId,
}

impl HttpRelayClient {
    pub fn new(base_url: &str, context: ContextId, timeout: Duration) -> PageResult<Self> {
        let endpoint = Url::parse(base_url)
            .and_then(|base| base.join("/v1/commands"))
            .map_err(|e| PageError::Relay(format!("invalid relay URL {base_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PageError::Relay(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint,
            context,
        })
    }

    pub fn context(&self) -> &ContextId {
        &self.context
    }
}

#[async_trait]
impl RelayPort for HttpRelayClient {
    async fn send(&self, command: Command) -> PageResult<Response> {
        let name = command.name();
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(CONTEXT_HEADER, self.context.as_str())
            .json(&command)
            .send()
            .await
            .map_err(|e| PageError::Relay(format!("{name}: {e}")))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(PageError::Relay(format!("{name}: relay error ({status}): {body}")));
        }
        serde_json::from_str(&body)
            .map_err(|e| PageError::Relay(format!("{name}: invalid response: {e}")))
    }
}
