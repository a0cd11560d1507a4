//! Command-line interface.
//!
//! - `serve` - start the HTTP server
//! - `migrate` - schema management for the MySQL or hosted tier
//! - `sync` - offline change log status and replay

pub mod args;

pub use args::{Cli, Commands};
