//! Tag and synonym persistence ports (spec §4.8).

use async_trait::async_trait;

use crate::entities::{Tag, TagSynonym};
use crate::error::Result;
use crate::value_objects::{ProjectId, TagId};

/// Persistence port for tags and the synonym graph.
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Fetch a tag by id.
    async fn get(&self, id: TagId) -> Result<Tag>;
    /// All synonym edges touching `id`, in either direction.
    async fn edges_touching(&self, id: TagId) -> Result<Vec<TagSynonym>>;
    /// Persist a new synonym edge.
    async fn insert_edge(&self, edge: &TagSynonym) -> Result<()>;
    /// Remove a synonym edge between two tags, in either direction.
    async fn delete_edge(&self, a: TagId, b: TagId) -> Result<()>;
    /// Delete a tag outright (used by `merge_tags` after edges are moved).
    async fn delete_tag(&self, id: TagId) -> Result<()>;
    /// Project ids currently associated with `tag_id`.
    async fn project_ids_for_tag(&self, tag_id: TagId) -> Result<Vec<ProjectId>>;
    /// Reassign a project's association from `source` to `target`, skipping
    /// if `target` is already associated (spec §4.8 `merge_tags`).
    async fn reassign_project_tag(&self, project_id: ProjectId, source: TagId, target: TagId) -> Result<()>;
}
