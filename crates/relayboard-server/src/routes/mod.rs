//! Route handlers, grouped by the collaborator that calls them (spec §6).

pub mod admin;
pub mod cron;
pub mod webhooks;
