//! HTTP and WebSocket request handlers.

pub mod commands;
pub mod health;
pub mod payload;
pub mod relay;

pub use commands::*;
pub use health::*;
pub use payload::*;
pub use relay::*;
