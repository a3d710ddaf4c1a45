//! Remote payload cache with TTL-gated refresh.
//!
//! A refresh only fetches the small version marker and rewrites the version
//! bookkeeping as one field group. The payload itself is downloaded when it is
//! missing or when an update is forced. Failures never touch the stored record,
//! so stale-but-valid data always wins over no data.

use crate::error::{RelayError, RelayResult};
use crate::metrics;
use crate::traits::{Fetcher, HttpRequest, HttpResponse};
use burner_core::DEFAULT_SCRIPT_VERSION;
use burner_core::cache_record::{
    CacheRecord, EXTENSION_UPDATE_AVAILABLE_KEY, ExtensionUpdate, RECORD_KEYS, SCRIPT_PAYLOAD_KEY,
    SCRIPT_VERSION_KEY, UPDATE_AVAILABLE_KEY,
};
use burner_core::clock::Clock;
use burner_core::config::UpdateConfig;
use burner_core::version::{Version, is_newer};
use burner_storage::KeyValueStore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::instrument;

/// Result of a successful version-marker refresh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub update_available: bool,
    pub current_version: Option<String>,
    pub latest_version: String,
}

/// Owns refresh cadence, the payload cache and version bookkeeping.
pub struct UpdateCacheManager {
    config: UpdateConfig,
    local: Arc<dyn KeyValueStore>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    /// Serializes refreshes so concurrent stale readers trigger one fetch.
    refresh_lock: Mutex<()>,
}

impl UpdateCacheManager {
    pub fn new(
        config: UpdateConfig,
        local: Arc<dyn KeyValueStore>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            local,
            fetcher,
            clock,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Version of the running package.
    pub fn package_version(&self) -> &str {
        &self.config.package_version
    }

    /// Fetch the version marker and rewrite the version bookkeeping.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> RelayResult<RefreshOutcome> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> RelayResult<RefreshOutcome> {
        let latest = match self.fetch_text(&self.config.version_url).await {
            Ok(body) => body.trim().to_string(),
            Err(e) => {
                metrics::REFRESHES.with_label_values(&["fetch_failed"]).inc();
                tracing::warn!(error = %e, "Version marker fetch failed, keeping cached record");
                return Err(e);
            }
        };
        if Version::parse(&latest).is_err() {
            metrics::REFRESHES.with_label_values(&["fetch_failed"]).inc();
            return Err(RelayError::FetchFailed(format!(
                "version marker is not a version: {latest:?}"
            )));
        }

        let record = self.record_unchecked().await?;
        let current = record.script_version;
        let update_available = is_newer(current.as_deref(), Some(&latest));
        let now = self.clock.now_ms();

        self.local
            .set(CacheRecord::refresh_entries(&latest, now, update_available))
            .await?;
        metrics::REFRESHES.with_label_values(&["ok"]).inc();
        tracing::info!(
            current = current.as_deref().unwrap_or("none"),
            latest = %latest,
            update_available,
            "Version marker refreshed"
        );

        // Secondary check; its failure never affects the primary result.
        if let Err(e) = self.check_extension_update().await {
            tracing::debug!(error = %e, "Extension update check failed");
        }

        Ok(RefreshOutcome {
            update_available,
            current_version: current,
            latest_version: latest,
        })
    }

    /// Refresh, then re-download the payload regardless of version.
    ///
    /// The download does not depend on the marker: when the marker fetch
    /// fails the payload's banner supplies its version.
    #[instrument(skip(self))]
    pub async fn force_refresh(&self) -> RelayResult<RefreshOutcome> {
        let _guard = self.refresh_lock.lock().await;
        let latest = match self.refresh_locked().await {
            Ok(refreshed) => Some(refreshed.latest_version),
            Err(e) => {
                tracing::warn!(error = %e, "Forcing payload download without a version marker");
                None
            }
        };
        let version = self.download_payload(latest.as_deref()).await?;
        let record = self.record_unchecked().await?;
        Ok(RefreshOutcome {
            update_available: record.update_available,
            current_version: Some(version.clone()),
            latest_version: latest
                .or(record.latest_script_version)
                .unwrap_or(version),
        })
    }

    /// Compare the package version against upstream packaging metadata and
    /// persist the result.
    #[instrument(skip(self))]
    pub async fn check_extension_update(&self) -> RelayResult<ExtensionUpdate> {
        let body = self.fetch_text(&self.config.manifest_url).await?;
        let manifest: Value = serde_json::from_str(&body)
            .map_err(|e| RelayError::FetchFailed(format!("invalid packaging metadata: {e}")))?;
        let remote = manifest
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RelayError::FetchFailed("packaging metadata has no version".to_string())
            })?;

        let update = if is_newer(Some(&self.config.package_version), Some(remote)) {
            ExtensionUpdate::available(remote)
        } else {
            ExtensionUpdate::none()
        };
        self.local
            .set(HashMap::from([(
                EXTENSION_UPDATE_AVAILABLE_KEY.to_string(),
                update.to_value(),
            )]))
            .await?;
        Ok(update)
    }

    /// Whether the record is older than the TTL window.
    pub async fn is_stale(&self) -> RelayResult<bool> {
        let record = self.record_unchecked().await?;
        Ok(record.is_stale_at(self.clock.now_ms(), self.config.ttl_ms()))
    }

    /// Refresh first if stale. A failed refresh is logged; callers read
    /// whatever is cached.
    async fn ensure_fresh(&self) {
        match self.is_stale().await {
            Ok(false) => return,
            Ok(true) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Could not read cache record");
                return;
            }
        }

        let _guard = self.refresh_lock.lock().await;
        // Another reader may have refreshed while we waited.
        if matches!(self.is_stale().await, Ok(false)) {
            return;
        }
        if let Err(e) = self.refresh_locked().await {
            tracing::debug!(error = %e, "Refresh of stale cache failed");
        }
    }

    /// The cache record, refreshed first when stale.
    pub async fn record(&self) -> RelayResult<CacheRecord> {
        self.ensure_fresh().await;
        self.record_unchecked().await
    }

    async fn record_unchecked(&self) -> RelayResult<CacheRecord> {
        let entries = self.local.get(&RECORD_KEYS).await?;
        Ok(CacheRecord::from_entries(&entries))
    }

    /// The cached payload, downloading it if it was never fetched.
    ///
    /// Returns an empty string when nothing is cached and the download fails.
    #[instrument(skip(self))]
    pub async fn get_cached_payload(&self) -> String {
        self.ensure_fresh().await;

        match self.local.get(&[SCRIPT_PAYLOAD_KEY]).await {
            Ok(entries) => {
                if let Some(payload) = entries
                    .get(SCRIPT_PAYLOAD_KEY)
                    .and_then(Value::as_str)
                    .filter(|p| !p.is_empty())
                {
                    return payload.to_string();
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not read cached payload");
                return String::new();
            }
        }

        let _guard = self.refresh_lock.lock().await;
        let latest = match self.record_unchecked().await {
            Ok(record) => record.latest_script_version,
            Err(_) => None,
        };
        if let Err(e) = self.download_payload(latest.as_deref()).await {
            tracing::warn!(error = %e, "Payload download failed, nothing cached");
            return String::new();
        }
        match self.local.get(&[SCRIPT_PAYLOAD_KEY]).await {
            Ok(entries) => entries
                .get(SCRIPT_PAYLOAD_KEY)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Err(_) => String::new(),
        }
    }

    /// Download and store the payload, returning the version recorded for it.
    async fn download_payload(&self, latest: Option<&str>) -> RelayResult<String> {
        let payload = match self.fetch_text(&self.config.payload_url).await {
            Ok(payload) => payload,
            Err(e) => {
                metrics::PAYLOAD_DOWNLOADS
                    .with_label_values(&["fetch_failed"])
                    .inc();
                return Err(e);
            }
        };
        let version = latest
            .map(str::to_string)
            .unwrap_or_else(|| extract_banner_version(&payload));

        let record = self.record_unchecked().await?;
        let update_available =
            is_newer(Some(&version), record.latest_script_version.as_deref());
        tracing::info!(version = %version, bytes = payload.len(), "Payload downloaded");

        self.local
            .set(HashMap::from([
                (SCRIPT_PAYLOAD_KEY.to_string(), Value::String(payload)),
                (SCRIPT_VERSION_KEY.to_string(), Value::String(version.clone())),
                (UPDATE_AVAILABLE_KEY.to_string(), Value::Bool(update_available)),
            ]))
            .await?;
        metrics::PAYLOAD_DOWNLOADS.with_label_values(&["ok"]).inc();
        Ok(version)
    }

    /// The running payload reports its own version.
    pub async fn update_detected(&self, version: Option<&str>) -> RelayResult<()> {
        let Some(version) = version.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(());
        };
        Version::parse(version)?;

        let record = self.record_unchecked().await?;
        let update_available = is_newer(Some(version), record.latest_script_version.as_deref());
        self.local
            .set(HashMap::from([
                (SCRIPT_VERSION_KEY.to_string(), Value::String(version.to_string())),
                (UPDATE_AVAILABLE_KEY.to_string(), Value::Bool(update_available)),
            ]))
            .await?;
        tracing::info!(version = %version, update_available, "Payload reported its version");
        Ok(())
    }

    /// Refresh now and then every `period`, regardless of staleness.
    ///
    /// Aborting the returned handle stops the timer.
    pub fn spawn_refresh_loop(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.refresh().await {
                    tracing::warn!(error = %e, "Periodic refresh failed");
                }
            }
        })
    }

    async fn fetch_text(&self, url: &str) -> RelayResult<String> {
        let request = HttpRequest::get(cache_busted(url, self.clock.now_ms()))
            .with_timeout(self.config.fetch_timeout());
        let response = self.fetcher.fetch(request).await?;
        into_text(response)
    }
}

fn into_text(response: HttpResponse) -> RelayResult<String> {
    if !response.is_success() {
        return Err(RelayError::FetchFailed(format!(
            "HTTP {}: {}",
            response.status, response.status_text
        )));
    }
    if response.body.trim().is_empty() {
        return Err(RelayError::FetchFailed("empty body received".to_string()));
    }
    Ok(response.body)
}

/// Append a `t=<now>` query parameter so intermediate caches are bypassed.
pub fn cache_busted(url: &str, now_ms: i64) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}t={now_ms}")
}

/// The build number from a `BananaBurner <n>` banner, or the default version.
pub fn extract_banner_version(payload: &str) -> String {
    const MARKER: &str = "BananaBurner";
    let mut rest = payload;
    while let Some(pos) = rest.find(MARKER) {
        rest = &rest[pos + MARKER.len()..];
        let after_ws = rest.trim_start();
        if after_ws.len() == rest.len() {
            continue;
        }
        let digits: String = after_ws
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if !digits.is_empty() {
            return digits;
        }
    }
    DEFAULT_SCRIPT_VERSION.to_string()
}
