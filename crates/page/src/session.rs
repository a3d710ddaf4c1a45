//! One page load: check status, wait for clearance, inject once.

use crate::error::{PageError, PageResult};
use crate::gate::InjectionGate;
use crate::poller::{ClearanceOutcome, ClearancePoller};
use crate::traits::{InjectionSink, RelayPort};
use burner_core::protocol::{Command, Response, StatusReport};
use std::sync::Arc;

/// Resource handed to the injection sink.
pub const PAYLOAD_RESOURCE: &str = "injected.js";

/// How a session run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The master switch is off; nothing was watched or injected.
    Disabled,
    /// This run injected the payload.
    Injected(ClearanceOutcome),
    /// Clearance was reached but the payload had already been injected.
    AlreadyInjected(ClearanceOutcome),
}

/// Drives the page side of one page load.
pub struct PageSession {
    relay: Arc<dyn RelayPort>,
    injector: Arc<dyn InjectionSink>,
    poller: Arc<ClearancePoller>,
    gate: InjectionGate,
}

impl PageSession {
    pub fn new(
        relay: Arc<dyn RelayPort>,
        injector: Arc<dyn InjectionSink>,
        poller: Arc<ClearancePoller>,
    ) -> Self {
        Self {
            relay,
            injector,
            poller,
            gate: InjectionGate::new(),
        }
    }

    pub fn poller(&self) -> &Arc<ClearancePoller> {
        &self.poller
    }

    pub fn is_injected(&self) -> bool {
        self.gate.is_released()
    }

    /// Ask the relay for status, then watch and inject unless disabled.
    pub async fn run(&self) -> PageResult<SessionOutcome> {
        let status = self.status().await?;
        if !status.enabled {
            tracing::info!("Extension disabled, not injecting");
            return Ok(SessionOutcome::Disabled);
        }

        tracing::info!("Starting injection process");
        let clearance = self.poller.watch().await;
        if self.inject().await? {
            Ok(SessionOutcome::Injected(clearance))
        } else {
            Ok(SessionOutcome::AlreadyInjected(clearance))
        }
    }

    /// Inject now without waiting for clearance. Returns false if the payload
    /// was already injected.
    pub async fn force_inject(&self) -> PageResult<bool> {
        tracing::info!("Forced injection requested");
        self.inject().await
    }

    async fn status(&self) -> PageResult<StatusReport> {
        match self.relay.send(Command::GetStatus).await? {
            Response::Status(status) => Ok(status),
            Response::Failure(f) => Err(PageError::Relay(f.error)),
            _ => Err(PageError::UnexpectedResponse {
                command: "getStatus",
            }),
        }
    }

    async fn inject(&self) -> PageResult<bool> {
        if !self.gate.try_release() {
            tracing::debug!("Payload already injected");
            return Ok(false);
        }
        if let Err(e) = self.injector.inject(PAYLOAD_RESOURCE).await {
            self.gate.rearm();
            tracing::error!(error = %e, "Payload injection failed");
            return Err(e);
        }
        tracing::info!("Payload injected");

        match self.relay.send(Command::InjectionComplete).await {
            Ok(response) if !response.is_success() => tracing::warn!(
                error = response.error().unwrap_or_default(),
                "Relay rejected injection report"
            ),
            Err(e) => tracing::warn!(error = %e, "Could not report injection"),
            Ok(_) => {}
        }
        Ok(true)
    }
}
