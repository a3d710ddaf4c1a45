//! Recording stand-ins for the page's host environment.

use async_trait::async_trait;
use burner_core::ExtensionUpdate;
use burner_core::config::ChallengeSignatures;
use burner_core::protocol::{Command, Response, StatusReport};
use burner_page::{
    ClearancePoller, InjectionSink, PageError, PageProbe, PageResult, PageSnapshot, RelayPort,
    SignatureMatcher,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Relay answering `getStatus` with a fixed switch and acking the rest.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingRelay {
    pub disabled: AtomicBool,
    pub unreachable: AtomicBool,
    commands: Mutex<Vec<Command>>,
}

#[allow(dead_code)]
impl RecordingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands.lock().unwrap().clone()
    }

    pub fn count(&self, command: &Command) -> usize {
        self.commands().iter().filter(|c| *c == command).count()
    }
}

#[allow(dead_code)]
pub fn status(enabled: bool) -> StatusReport {
    StatusReport {
        enabled,
        override_source_enabled: enabled,
        quic_disabled: false,
        script_version: Some("2981".to_string()),
        latest_script_version: Some("2981".to_string()),
        last_updated: Some(1_700_000_000_000),
        update_available: false,
        extension_update_available: ExtensionUpdate::none(),
        package_version: "1.0.0".to_string(),
    }
}

#[async_trait]
impl RelayPort for RecordingRelay {
    async fn send(&self, command: Command) -> PageResult<Response> {
        self.commands.lock().unwrap().push(command.clone());
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(PageError::Relay("relay went away".to_string()));
        }
        Ok(match command {
            Command::GetStatus => Response::Status(status(!self.disabled.load(Ordering::SeqCst))),
            _ => Response::ack(),
        })
    }
}

/// Injection sink counting calls, optionally failing them.
#[allow(dead_code)]
#[derive(Default)]
pub struct CountingInjector {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    resources: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl CountingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn resources(&self) -> Vec<String> {
        self.resources.lock().unwrap().clone()
    }
}

#[async_trait]
impl InjectionSink for CountingInjector {
    async fn inject(&self, resource: &str) -> PageResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(PageError::Injection("document has no head".to_string()));
        }
        self.resources.lock().unwrap().push(resource.to_string());
        Ok(())
    }
}

/// Probe whose challenge can be switched on and off.
#[allow(dead_code)]
#[derive(Default)]
pub struct SwitchProbe {
    pub challenged: AtomicBool,
}

#[allow(dead_code)]
impl SwitchProbe {
    pub fn challenged() -> Self {
        Self {
            challenged: AtomicBool::new(true),
        }
    }

    pub fn lift(&self) {
        self.challenged.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl PageProbe for SwitchProbe {
    async fn sample(&self, _selectors: &[String]) -> PageResult<PageSnapshot> {
        if self.challenged.load(Ordering::SeqCst) {
            return Ok(PageSnapshot {
                iframe_sources: vec![
                    "https://challenges.cloudflare.com/cdn-cgi/challenge-platform/h/b".to_string(),
                ],
                ..Default::default()
            });
        }
        Ok(PageSnapshot::default())
    }
}

/// Poller with the default signature library, 1 s ticks and a 30 s deadline.
#[allow(dead_code)]
pub fn default_poller(probe: Arc<dyn PageProbe>) -> Arc<ClearancePoller> {
    Arc::new(ClearancePoller::new(
        probe,
        SignatureMatcher::new(&ChallengeSignatures::default()).unwrap(),
        Duration::from_secs(1),
        Duration::from_secs(30),
    ))
}
