//! Shared test utilities for page-side integration tests.

pub mod mocks;

#[allow(unused_imports)]
pub use mocks::*;
