//! Application layer: use-case services orchestrating domain ports.

pub mod use_cases;

pub use use_cases::*;
