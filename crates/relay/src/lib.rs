//! Background relay for the burner browser add-on.
//!
//! This crate provides the privileged side of the add-on:
//! - Remote payload cache with TTL-gated refresh and version bookkeeping
//! - Declarative rule groups recomputed from the configuration flags
//! - The command dispatcher answering page contexts
//! - A socket proxy multiplexing duplex connections per page context
//! - An HTTP/WebSocket surface serving all of the above

pub mod adapters;
pub mod bootstrap;
pub mod contexts;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod rules;
pub mod sockets;
pub mod state;
pub mod traits;
pub mod updater;

pub use contexts::ContextRegistry;
pub use dispatcher::RelayDispatcher;
pub use error::{ApiError, RelayError, RelayResult};
pub use routes::create_router;
pub use rules::RuleEngine;
pub use sockets::{SocketProxy, SocketState};
pub use state::{AppState, Substrate};
pub use updater::UpdateCacheManager;
