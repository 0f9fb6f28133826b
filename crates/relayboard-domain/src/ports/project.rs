//! Project persistence port (spec §3 "Project", used by bulk-import and
//! Jira-refresh handlers).

use async_trait::async_trait;

use crate::entities::Project;
use crate::error::Result;
use crate::value_objects::ProjectId;

/// Write-side persistence for [`Project`] rows. The read/ranked side lives
/// on [`super::search::SearchIndex`]; this port covers the plain
/// get/upsert operations handlers need.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Fetch a project by id.
    async fn get(&self, id: ProjectId) -> Result<Project>;
    /// Persist a project (insert or update by id), including its tag set.
    async fn upsert(&self, project: &Project) -> Result<()>;
}
