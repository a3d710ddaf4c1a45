//! Page-context side of burner.
//!
//! A page context cannot touch the network or storage itself. This crate holds
//! what runs there:
//! - The clearance poller deciding when a challenge overlay has gone away
//! - The challenge signature matcher it samples with
//! - The injection latch and the page session that ties them to the relay
//! - An HTTP client speaking the relay's one-shot command endpoint

pub mod client;
pub mod error;
pub mod gate;
pub mod poller;
pub mod session;
pub mod signatures;
pub mod traits;

pub use client::HttpRelayClient;
pub use error::{PageError, PageResult};
pub use gate::InjectionGate;
pub use poller::{ClearanceOutcome, ClearancePoller, ClearanceState};
pub use session::{PAYLOAD_RESOURCE, PageSession, SessionOutcome};
pub use signatures::{Detection, SignatureMatcher};
pub use traits::{InjectionSink, PageProbe, PageSnapshot, RelayPort};
