//! `reqwest`-backed fetch capability.

use crate::error::{RelayError, RelayResult};
use crate::traits::{CookieStore, Fetcher, HttpRequest, HttpResponse};
use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::{COOKIE, HeaderName, HeaderValue};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::instrument;

/// Fetcher over a shared `reqwest::Client`.
///
/// Requests marked with `credentials` carry the cookies the cookie store holds
/// for the target host.
#[derive(Clone)]
pub struct ReqwestFetcher {
    http: reqwest::Client,
    cookies: Option<Arc<dyn CookieStore>>,
}

impl ReqwestFetcher {
    pub fn new() -> RelayResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("burnerd/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            cookies: None,
        })
    }

    /// Attach credentials from `cookies` to requests that ask for them.
    pub fn with_cookies(mut self, cookies: Arc<dyn CookieStore>) -> Self {
        self.cookies = Some(cookies);
        self
    }

    async fn cookie_header(&self, url: &Url) -> Option<String> {
        let cookies = self.cookies.as_ref()?;
        let host = url.host_str()?;
        match cookies.get_all(host).await {
            Ok(found) if !found.is_empty() => Some(
                found
                    .iter()
                    .map(|c| format!("{}={}", c.name, c.value))
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(host = %host, error = %e, "Cookie lookup failed, sending without credentials");
                None
            }
        }
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    #[instrument(skip(self, request), fields(method = %request.method, url = %request.url))]
    async fn fetch(&self, request: HttpRequest) -> RelayResult<HttpResponse> {
        let url = Url::parse(&request.url)
            .map_err(|e| RelayError::InvalidRequest(format!("invalid URL {}: {e}", request.url)))?;
        let method = reqwest::Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| RelayError::InvalidRequest(format!("invalid method {}", request.method)))?;

        let mut builder = self.http.request(method, url.clone());
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| RelayError::InvalidRequest(format!("invalid header name {name}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| RelayError::InvalidRequest(format!("invalid value for header {name}")))?;
            builder = builder.header(name, value);
        }
        if request.credentials
            && request.header("cookie").is_none()
            && let Some(cookie) = self.cookie_header(&url).await
        {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RelayError::FetchFailed(e.to_string()))?;

        let status = response.status();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::FetchFailed(format!("failed to read body: {e}")))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }
}
