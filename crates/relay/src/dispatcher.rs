//! Command dispatch.
//!
//! [`RelayDispatcher::handle`] is the single entry point for page contexts.
//! Every command yields exactly one [`Response`]; handler errors are turned
//! into in-band failures here and never escape.

use crate::error::{RelayError, RelayResult};
use crate::metrics;
use crate::rules::RuleEngine;
use crate::sockets::SocketProxy;
use crate::traits::{CookieStore, Fetcher, HttpRequest, Notification, Notifier};
use crate::updater::UpdateCacheManager;
use burner_core::config::{AppConfig, NotificationConfig, PanelConfig};
use burner_core::flags::{ENABLED_KEY, OVERRIDE_SOURCE_KEY, QUIC_DISABLED_KEY};
use burner_core::protocol::{
    Command, ContextId, ExtensionUpdateReport, ProxyFetchRequest, ProxyFetchResponse,
    RefreshReport, Response, StatusReport,
};
use burner_core::rules::RuleGroup;
use burner_storage::KeyValueStore;
use percent_encoding::percent_decode_str;
use reqwest::Url;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// Notification type understood by the toast surface.
const NOTIFICATION_KIND: &str = "basic";

/// Routes commands to the component that owns them.
pub struct RelayDispatcher {
    panel: PanelConfig,
    notifications: NotificationConfig,
    fetch_timeout: Duration,
    synced: Arc<dyn KeyValueStore>,
    updater: Arc<UpdateCacheManager>,
    rules: Arc<RuleEngine>,
    sockets: Arc<SocketProxy>,
    fetcher: Arc<dyn Fetcher>,
    cookies: Arc<dyn CookieStore>,
    notifier: Arc<dyn Notifier>,
}

impl RelayDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &AppConfig,
        synced: Arc<dyn KeyValueStore>,
        updater: Arc<UpdateCacheManager>,
        rules: Arc<RuleEngine>,
        sockets: Arc<SocketProxy>,
        fetcher: Arc<dyn Fetcher>,
        cookies: Arc<dyn CookieStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            panel: config.panel.clone(),
            notifications: config.notifications.clone(),
            fetch_timeout: config.update.fetch_timeout(),
            synced,
            updater,
            rules,
            sockets,
            fetcher,
            cookies,
            notifier,
        }
    }

    /// Handle one command from `origin`.
    #[instrument(skip(self, command, origin), fields(command = command.name(), origin = %origin))]
    pub async fn handle(&self, command: Command, origin: &ContextId) -> Response {
        let name = command.name();
        metrics::COMMANDS_HANDLED.with_label_values(&[name]).inc();

        match self.dispatch(command, origin).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_command_failure(name, e.code());
                match &e {
                    RelayError::RuleInstallFailed(_) | RelayError::PeerUnreachable(_) => {
                        tracing::error!(error = %e, "Command failed")
                    }
                    _ => tracing::warn!(error = %e, "Command failed"),
                }
                e.to_response()
            }
        }
    }

    async fn dispatch(&self, command: Command, origin: &ContextId) -> RelayResult<Response> {
        match command {
            Command::GetStatus => self.status().await.map(Response::Status),
            Command::SetEnabled { enabled } => {
                let mut entries = HashMap::from([(ENABLED_KEY.to_string(), Value::Bool(enabled))]);
                if !enabled {
                    entries.insert(OVERRIDE_SOURCE_KEY.to_string(), Value::Bool(false));
                }
                self.synced.set(entries).await?;
                tracing::info!(enabled, "Extension toggled");
                self.require(self.rules.apply_all().await, "all groups")?;
                Ok(Response::ack())
            }
            Command::SetOverrideSource { enabled } => {
                self.set_flag(OVERRIDE_SOURCE_KEY, enabled).await?;
                self.require(
                    self.rules.apply_group(RuleGroup::OverrideRedirect).await,
                    RuleGroup::OverrideRedirect.as_str(),
                )?;
                Ok(Response::ack())
            }
            Command::SetQuicDisabled { disabled } => {
                self.set_flag(QUIC_DISABLED_KEY, disabled).await?;
                self.require(
                    self.rules.apply_group(RuleGroup::QuicSuppression).await,
                    RuleGroup::QuicSuppression.as_str(),
                )?;
                Ok(Response::ack())
            }
            Command::ForceUpdate => {
                let outcome = self.updater.force_refresh().await?;
                Ok(Response::Refresh(RefreshReport {
                    success: true,
                    update_available: outcome.update_available,
                    current_version: outcome.current_version,
                    latest_version: outcome.latest_version,
                }))
            }
            Command::CheckExtensionUpdate => {
                let update = self.updater.check_extension_update().await?;
                Ok(Response::ExtensionUpdate(ExtensionUpdateReport {
                    success: true,
                    package_version: self.updater.package_version().to_string(),
                    extension_update_available: update,
                }))
            }
            Command::InjectionComplete => {
                tracing::info!("Payload injected, enabling override rules");
                self.require(
                    self.rules.apply_group(RuleGroup::OverrideRedirect).await,
                    RuleGroup::OverrideRedirect.as_str(),
                )?;
                Ok(Response::ack())
            }
            Command::UpdateDetected { version } => {
                self.updater.update_detected(version.as_deref()).await?;
                Ok(Response::ack())
            }
            Command::SendNotification { title, message } => {
                self.notify(title, message).await;
                Ok(Response::ack())
            }
            Command::ProxyFetch(request) => self.proxy_fetch(request).await.map(Response::Fetch),
            Command::SocketAction(op) => {
                self.sockets.handle(origin, op).await?;
                Ok(Response::ack())
            }
        }
    }

    async fn status(&self) -> RelayResult<StatusReport> {
        let flags = self.rules.load_flags().await?;
        let record = self.updater.record().await?;
        Ok(StatusReport {
            enabled: flags.enabled,
            override_source_enabled: flags.override_source_enabled,
            quic_disabled: flags.quic_disabled,
            script_version: record.script_version,
            latest_script_version: record.latest_script_version,
            last_updated: record.last_check_timestamp,
            update_available: record.update_available,
            extension_update_available: record.extension_update_available,
            package_version: self.updater.package_version().to_string(),
        })
    }

    async fn set_flag(&self, key: &str, value: bool) -> RelayResult<()> {
        self.synced
            .set(HashMap::from([(key.to_string(), Value::Bool(value))]))
            .await?;
        tracing::info!(flag = key, value, "Flag updated");
        Ok(())
    }

    fn require(&self, installed: bool, what: &str) -> RelayResult<()> {
        if installed {
            Ok(())
        } else {
            Err(RelayError::RuleInstallFailed(format!(
                "{what} could not be installed"
            )))
        }
    }

    /// Show a toast, retrying once without the icon. Never fails.
    async fn notify(&self, title: Option<String>, message: Option<String>) {
        let mut notification = Notification {
            kind: NOTIFICATION_KIND.to_string(),
            icon: Some(self.notifications.icon.clone()),
            title: title.unwrap_or_else(|| self.notifications.default_title.clone()),
            message: message.unwrap_or_default(),
        };

        let Err(e) = self.notifier.create(&notification).await else {
            return;
        };
        tracing::warn!(error = %e, "Notification failed, retrying without icon");
        notification.icon = None;
        if let Err(e) = self.notifier.create(&notification).await {
            tracing::warn!(error = %e, "Fallback notification failed");
        }
    }

    async fn proxy_fetch(&self, request: ProxyFetchRequest) -> RelayResult<ProxyFetchResponse> {
        let url = Url::parse(&request.url)
            .map_err(|e| RelayError::InvalidRequest(format!("invalid URL {}: {e}", request.url)))?;

        let mut headers: Vec<(String, String)> = request.headers.into_iter().collect();
        if url.host_str().is_some_and(|host| self.panel.matches_host(host))
            && let Some(token) = self.xsrf_token().await
        {
            headers.retain(|(name, _)| !name.eq_ignore_ascii_case(&self.panel.xsrf_header));
            headers.push((self.panel.xsrf_header.clone(), token));
        }

        let response = self
            .fetcher
            .fetch(HttpRequest {
                method: request.method,
                url: url.to_string(),
                headers,
                body: request.body,
                credentials: true,
                timeout: Some(self.fetch_timeout),
            })
            .await?;

        let data = if response.is_json() {
            if response.body.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&response.body).map_err(|e| {
                    RelayError::FetchFailed(format!("invalid JSON body: {e}"))
                })?
            }
        } else {
            Value::String(response.body.clone())
        };

        Ok(ProxyFetchResponse {
            success: true,
            status: response.status,
            ok: response.is_success(),
            status_text: response.status_text,
            data,
        })
    }

    /// The panel's anti-forgery token, decoded from its cookie.
    async fn xsrf_token(&self) -> Option<String> {
        match self.cookies.get_all(&self.panel.domain).await {
            Ok(cookies) => cookies
                .into_iter()
                .find(|c| c.name == self.panel.xsrf_cookie)
                .map(|c| decode_cookie_value(&c.value)),
            Err(e) => {
                tracing::warn!(error = %e, "Cookie lookup failed, sending without XSRF token");
                None
            }
        }
    }
}

/// Cookie values arrive percent-encoded; malformed escapes are kept verbatim.
fn decode_cookie_value(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}
