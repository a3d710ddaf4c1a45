pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{Backend, open_backends};
