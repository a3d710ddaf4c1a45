//! Shared fixture values.

use burner_core::config::AppConfig;
use std::time::Duration;

#[allow(dead_code)]
pub const VERSION_URL: &str = "https://cdn.test/version.txt";
#[allow(dead_code)]
pub const PAYLOAD_URL: &str = "https://cdn.test/injected.js";
#[allow(dead_code)]
pub const MANIFEST_URL: &str = "https://cdn.test/manifest.json";

/// Start of the mock clock, in epoch milliseconds.
#[allow(dead_code)]
pub const START_MS: i64 = 1_700_000_000_000;

/// One hour in milliseconds.
#[allow(dead_code)]
pub const HOUR_MS: i64 = 3_600_000;

/// Test configuration pointing the updater at the mock CDN.
#[allow(dead_code)]
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::for_testing();
    config.update.version_url = VERSION_URL.to_string();
    config.update.payload_url = PAYLOAD_URL.to_string();
    config.update.manifest_url = MANIFEST_URL.to_string();
    config.update.package_version = "1.0.0".to_string();
    config.sockets.connect_timeout_secs = 5;
    config
}

/// A payload whose banner carries `build`.
#[allow(dead_code)]
pub fn payload_with_banner(build: u32) -> String {
    format!("// ==UserScript==\n// BananaBurner {build}\nconsole.log('burner');\n")
}

/// Wait for `f` to hold, polling the runtime in between.
#[allow(dead_code)]
pub async fn eventually(mut f: impl FnMut() -> bool) {
    for _ in 0..200 {
        if f() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
