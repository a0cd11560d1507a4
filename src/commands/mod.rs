//! CLI command implementations.

pub mod migrate;
pub mod serve;
pub mod sync;

mod stack;

pub use stack::{build_data_service, open_data_service};
