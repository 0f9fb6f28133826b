//! Infrastructure layer: Postgres repositories, HTTP adapters, configuration,
//! logging, and the error conversions that keep `relayboard-domain` free of
//! external-crate dependencies.

pub mod adapters;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod repositories;
