//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration of the background relay.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub panel: PanelConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub clearance: ClearanceConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sockets: SocketConfig,
}

impl AppConfig {
    /// Configuration for tests: in-memory storage, local-only URLs.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:0".to_string(),
                metrics_enabled: false,
            },
            update: UpdateConfig {
                version_url: "http://127.0.0.1:9/version.txt".to_string(),
                payload_url: "http://127.0.0.1:9/injected.js".to_string(),
                manifest_url: "http://127.0.0.1:9/manifest.json".to_string(),
                package_version: "1.0.0".to_string(),
                ..Default::default()
            },
            storage: StorageConfig::Memory,
            ..Default::default()
        }
    }

    /// Validate every section, returning the first error.
    pub fn validate(&self) -> Result<(), String> {
        self.panel.validate()?;
        self.update.validate()?;
        self.rules.validate()?;
        self.clearance.validate()?;
        self.storage.validate()?;
        Ok(())
    }
}

/// Listener configuration for the native relay endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8719").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Enable the /metrics endpoint (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8719".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// The third-party panel being augmented.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Registrable domain of the panel; also the cookie domain.
    #[serde(default = "default_panel_domain")]
    pub domain: String,
    /// Origin presented on rewritten requests.
    #[serde(default = "default_panel_origin")]
    pub origin: String,
    /// Referer presented on rewritten requests.
    #[serde(default = "default_panel_referer")]
    pub referer: String,
    /// Cookie carrying the anti-forgery token.
    #[serde(default = "default_xsrf_cookie")]
    pub xsrf_cookie: String,
    /// Header the anti-forgery token is sent in.
    #[serde(default = "default_xsrf_header")]
    pub xsrf_header: String,
    /// Path prefix identifying panel pages.
    #[serde(default = "default_panel_path")]
    pub panel_path: String,
}

fn default_panel_domain() -> String {
    "bot-hosting.net".to_string()
}

fn default_panel_origin() -> String {
    "https://bot-hosting.net".to_string()
}

fn default_panel_referer() -> String {
    "https://bot-hosting.net/panel/".to_string()
}

fn default_xsrf_cookie() -> String {
    "XSRF-TOKEN".to_string()
}

fn default_xsrf_header() -> String {
    "X-XSRF-TOKEN".to_string()
}

fn default_panel_path() -> String {
    "/panel/".to_string()
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            domain: default_panel_domain(),
            origin: default_panel_origin(),
            referer: default_panel_referer(),
            xsrf_cookie: default_xsrf_cookie(),
            xsrf_header: default_xsrf_header(),
            panel_path: default_panel_path(),
        }
    }
}

impl PanelConfig {
    /// Whether `host` is the panel domain or one of its subdomains.
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let domain = self.domain.to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{domain}"))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.domain.trim().is_empty() {
            return Err("panel.domain must not be empty".to_string());
        }
        if self.xsrf_header.trim().is_empty() {
            return Err("panel.xsrf_header must not be empty".to_string());
        }
        Ok(())
    }
}

/// Remote payload refresh configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Small text file holding the latest payload version.
    #[serde(default = "default_version_url")]
    pub version_url: String,
    /// The payload injected into panel pages.
    #[serde(default = "default_payload_url")]
    pub payload_url: String,
    /// Upstream packaging metadata (JSON with a `version` field).
    #[serde(default = "default_manifest_url")]
    pub manifest_url: String,
    /// Cache TTL in seconds (default: 1 hour).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Background refresh period in seconds (default: 60 minutes).
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Per-request timeout in seconds; the fetch capability has none of its own.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Version of the running package, compared against the manifest.
    #[serde(default = "default_package_version")]
    pub package_version: String,
}

fn default_version_url() -> String {
    "https://raw.githubusercontent.com/relentiousdragon/BananaBurner/main/version.txt".to_string()
}

fn default_payload_url() -> String {
    "https://raw.githubusercontent.com/relentiousdragon/BananaBurner/main/injected.js".to_string()
}

fn default_manifest_url() -> String {
    "https://raw.githubusercontent.com/relentiousdragon/BananaBurner/main/manifest.json"
        .to_string()
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_refresh_interval_secs() -> u64 {
    3600
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_package_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            version_url: default_version_url(),
            payload_url: default_payload_url(),
            manifest_url: default_manifest_url(),
            ttl_secs: default_ttl_secs(),
            refresh_interval_secs: default_refresh_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            package_version: default_package_version(),
        }
    }
}

impl UpdateConfig {
    /// TTL in milliseconds, saturating.
    pub fn ttl_ms(&self) -> i64 {
        i64::try_from(self.ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.version_url.trim().is_empty() || self.payload_url.trim().is_empty() {
            return Err("update.version_url and update.payload_url are required".to_string());
        }
        if self.ttl_secs == 0 {
            return Err("update.ttl_secs must be greater than 0".to_string());
        }
        if self.refresh_interval_secs == 0 {
            return Err("update.refresh_interval_secs must be greater than 0".to_string());
        }
        if self.fetch_timeout_secs == 0 {
            return Err("update.fetch_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Inputs to the rule groups that are data rather than logic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RulesConfig {
    /// URL filter of the panel asset replaced by the override source.
    #[serde(default = "default_override_url_filter")]
    pub override_url_filter: String,
    /// Where the overridden asset is redirected to.
    #[serde(default = "default_override_redirect_url")]
    pub override_redirect_url: String,
    /// Third-party assets blocked while the override is active.
    #[serde(default = "default_block_url_filters")]
    pub block_url_filters: Vec<String>,
    /// Domains whose requests get headers rewritten; empty means any initiator.
    #[serde(default)]
    pub initiator_domains: Vec<String>,
    /// Priority of header and QUIC rules.
    #[serde(default = "default_header_priority")]
    pub header_priority: u32,
    /// Shared priority tier of the redirect and block rules.
    #[serde(default = "default_override_priority")]
    pub override_priority: u32,
}

fn default_override_url_filter() -> String {
    "||bot-hosting.net/panel/_app/immutable/entry/app.*.js".to_string()
}

fn default_override_redirect_url() -> String {
    "https://raw.githubusercontent.com/relentiousdragon/BananaBurner/main/override/app.js"
        .to_string()
}

fn default_block_url_filters() -> Vec<String> {
    [
        "||google-analytics.com^",
        "||googletagmanager.com^",
        "||static.cloudflareinsights.com^",
        "||pagead2.googlesyndication.com^",
        "||doubleclick.net^",
        "||widget.trustpilot.com^",
        "||client.crisp.chat^",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_header_priority() -> u32 {
    1
}

fn default_override_priority() -> u32 {
    2
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            override_url_filter: default_override_url_filter(),
            override_redirect_url: default_override_redirect_url(),
            block_url_filters: default_block_url_filters(),
            initiator_domains: Vec::new(),
            header_priority: default_header_priority(),
            override_priority: default_override_priority(),
        }
    }
}

impl RulesConfig {
    pub fn validate(&self) -> Result<(), String> {
        // One id is taken by the redirect rule.
        if self.block_url_filters.len() > 99 {
            return Err(format!(
                "rules.block_url_filters has {} entries, at most 99 fit the override id range",
                self.block_url_filters.len()
            ));
        }
        if self.block_url_filters.iter().any(|f| f.trim().is_empty()) {
            return Err("rules.block_url_filters must not contain empty filters".to_string());
        }
        Ok(())
    }
}

/// Page-side challenge detection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClearanceConfig {
    /// Sampling period in milliseconds (default: 1 second).
    #[serde(default = "default_clearance_interval_ms")]
    pub interval_ms: u64,
    /// Hard deadline in milliseconds (default: 30 seconds).
    #[serde(default = "default_clearance_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default)]
    pub signatures: ChallengeSignatures,
}

fn default_clearance_interval_ms() -> u64 {
    1000
}

fn default_clearance_deadline_ms() -> u64 {
    30_000
}

impl Default for ClearanceConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_clearance_interval_ms(),
            deadline_ms: default_clearance_deadline_ms(),
            signatures: ChallengeSignatures::default(),
        }
    }
}

impl ClearanceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.interval_ms == 0 {
            return Err("clearance.interval_ms must be greater than 0".to_string());
        }
        if self.deadline_ms < self.interval_ms {
            return Err("clearance.deadline_ms must be at least clearance.interval_ms".to_string());
        }
        Ok(())
    }
}

/// Fingerprints of an anti-bot challenge page.
///
/// This list drifts as challenge vendors change their markup; it is data, not
/// protocol.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeSignatures {
    /// CSS selectors of challenge elements; only visible matches count.
    #[serde(default = "default_challenge_selectors")]
    pub selectors: Vec<String>,
    /// Substrings of challenge iframe `src` attributes.
    #[serde(default = "default_challenge_iframe_markers")]
    pub iframe_markers: Vec<String>,
    /// Substrings of challenge form `action` attributes.
    #[serde(default = "default_challenge_form_markers")]
    pub form_markers: Vec<String>,
    /// Case-insensitive phrases of challenge text.
    #[serde(default = "default_challenge_text_patterns")]
    pub text_patterns: Vec<String>,
}

fn default_challenge_selectors() -> Vec<String> {
    [
        "#cf-content",
        ".cf-browser-verification",
        "#challenge-form",
        ".cf-im-under-attack",
        "#cf-challenge-running",
        "#challenge-stage",
        "#turnstile-wrapper",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_challenge_iframe_markers() -> Vec<String> {
    ["challenges.cloudflare.com", "/cdn-cgi/challenge-platform/"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_challenge_form_markers() -> Vec<String> {
    ["__cf_chl_f_tk", "/cdn-cgi/challenge-platform/"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_challenge_text_patterns() -> Vec<String> {
    [
        "checking your browser",
        "just a moment...",
        "verify you are human",
        "needs to review the security of your connection",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for ChallengeSignatures {
    fn default() -> Self {
        Self {
            selectors: default_challenge_selectors(),
            iframe_markers: default_challenge_iframe_markers(),
            form_markers: default_challenge_form_markers(),
            text_patterns: default_challenge_text_patterns(),
        }
    }
}

/// Toast surface defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Icon resource attached to toasts.
    #[serde(default = "default_notification_icon")]
    pub icon: String,
    /// Title used when a request does not carry one.
    #[serde(default = "default_notification_title")]
    pub default_title: String,
}

fn default_notification_icon() -> String {
    "icons/icon128.png".to_string()
}

fn default_notification_title() -> String {
    "Banana Burner".to_string()
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            icon: default_notification_icon(),
            default_title: default_notification_title(),
        }
    }
}

/// Key-value store backend configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Process-local maps; nothing survives a restart.
    #[default]
    Memory,
    /// One JSON document per namespace under `path`.
    Filesystem {
        /// Directory holding `synced.json` and `local.json`.
        path: PathBuf,
    },
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("storage.path must not be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Proxied socket configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Time allowed for a proxied connection to open, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl SocketConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }
}
