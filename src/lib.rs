//! Invoice Desk - invoice management over tiered storage.
//!
//! Invoices and users live in the first reachable of MySQL, a hosted SQL
//! database, a companion REST API, or a local document store. Writes made
//! while only the local store is reachable are logged and replayed once a
//! remote tier comes back.
//!
//! # Layers
//!
//! - **cli** / **commands**: `serve`, `migrate`, `sync`
//! - **config**: environment configuration and constants
//! - **domain**: users, invoices, totals, reset tokens, exchange rates
//! - **infra**: SQL and REST stores, local store, Redis, notifiers
//! - **services**: tier failover, auth, invoices, rates, password reset
//! - **api**: axum handlers, middleware, OpenAPI
//! - **types**: pagination and response envelopes
//! - **errors**: the application error type

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod infra;
pub mod services;
pub mod types;

pub use api::AppState;
pub use config::Config;
pub use domain::{Invoice, User, UserRole};
pub use errors::{AppError, AppResult};
pub use services::{DataService, Services};
