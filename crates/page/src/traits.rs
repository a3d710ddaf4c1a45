//! What the page context consumes from its host environment.

use crate::error::PageResult;
use async_trait::async_trait;
use burner_core::protocol::{Command, Response};

/// One look at the page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PageSnapshot {
    /// The queried selectors that match at least one visible element.
    pub visible_selectors: Vec<String>,
    /// `src` of every iframe.
    pub iframe_sources: Vec<String>,
    /// `action` of every form.
    pub form_actions: Vec<String>,
    /// Rendered text of the document body.
    pub visible_text: String,
}

/// Reads page structure.
#[async_trait]
pub trait PageProbe: Send + Sync + 'static {
    /// Sample the page, checking visibility of `selectors`.
    async fn sample(&self, selectors: &[String]) -> PageResult<PageSnapshot>;
}

/// Loads a resource into the page's top-level execution context.
///
/// Not idempotent: guard calls with [`crate::InjectionGate`].
#[async_trait]
pub trait InjectionSink: Send + Sync + 'static {
    async fn inject(&self, resource: &str) -> PageResult<()>;
}

/// Sends one command to the relay and waits for its response.
#[async_trait]
pub trait RelayPort: Send + Sync + 'static {
    async fn send(&self, command: Command) -> PageResult<Response>;
}
