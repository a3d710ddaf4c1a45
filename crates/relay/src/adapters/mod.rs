//! Default implementations of the substrate interfaces.

pub mod http;
pub mod memory;
pub mod notify;
pub mod websocket;

pub use http::ReqwestFetcher;
pub use memory::{MemoryCookieJar, MemoryRuleSink};
pub use notify::LogNotifier;
pub use websocket::TungsteniteConnector;
