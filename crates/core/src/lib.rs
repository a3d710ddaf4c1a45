//! Core domain types shared by the burner relay and page contexts.
//!
//! This crate defines the data model every other crate speaks:
//! - Dotted-numeric version comparison
//! - Configuration flags and cache bookkeeping persisted in the key-value store
//! - Declarative network rules and their id partitions
//! - The command/response protocol between page contexts and the relay

pub mod cache_record;
pub mod clock;
pub mod config;
pub mod error;
pub mod flags;
pub mod protocol;
pub mod rules;
pub mod version;

pub use cache_record::{CacheRecord, ExtensionUpdate};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use flags::ConfigFlags;
pub use protocol::{Command, ContextId, Response, SocketEvent, SocketOp};
pub use rules::{Rule, RuleAction, RuleDiff, RuleGroup};
pub use version::{Version, is_newer};

/// Version advertised when no payload version has ever been recorded.
pub const DEFAULT_SCRIPT_VERSION: &str = "2979.0.2";
