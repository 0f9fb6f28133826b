//! Domain layer: entities, ports, and pure business logic.
//!
//! This crate has no dependency on any infrastructure concern (no sqlx, no
//! reqwest, no axum). External-crate error conversions are implemented in
//! `relayboard-infrastructure`, not here.

#[macro_use]
mod macros;

pub mod backoff;
pub mod entities;
pub mod error;
pub mod ports;
pub mod value_objects;

pub use error::{Error, Result};
