//! External systems touched by the built-in periodic handlers (spec §4.1
//! table: Jira-refresh, Directory-group sync). Neither system has its own
//! durable entity in this crate; handlers carry what they need in the
//! job's opaque payload/result, per spec §3 "Job" fields.

use async_trait::async_trait;

use crate::error::Result;

/// Read-only access to Jira issue status, for refreshing cached links.
#[async_trait]
pub trait JiraClient: Send + Sync {
    /// Fetch the current status label for `issue_key` (e.g. `"PROJ-123"`).
    async fn fetch_status(&self, issue_key: &str) -> Result<String>;
}

/// Read-only access to a directory's group membership, for team-sync.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// List member identifiers belonging to `group_id`.
    async fn list_group_members(&self, group_id: &str) -> Result<Vec<String>>;
}
