//! Hybrid search ports (spec §4.6).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::Project;
use crate::error::Result;
use crate::value_objects::{OrganizationId, ProjectId, TagId};

/// How fused results should be ordered (spec §4.6 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    /// Sort by descending RRF score.
    Relevance,
    /// Sort alphabetically by name.
    Name,
    /// Sort by `start_date`.
    StartDate,
    /// Sort by `updated_at`.
    UpdatedAt,
}

/// Filter predicates common to both the filter-only and ranked paths
/// (spec §4.6 step 2).
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Restrict to these statuses, if given.
    pub statuses: Option<Vec<String>>,
    /// Restrict to this organization.
    pub organization_id: Option<OrganizationId>,
    /// Restrict to this owner.
    pub owner_id: Option<String>,
    /// Restrict to projects starting on/after this instant.
    pub start_date_from: Option<DateTime<Utc>>,
    /// Restrict to projects starting on/before this instant.
    pub start_date_to: Option<DateTime<Utc>>,
    /// Restrict to projects tagged with every one of these ids (AND semantics).
    pub tag_ids: Vec<TagId>,
}

/// A ranked list of project ids, in ascending rank order (position 1 = best).
pub type RankedIds = Vec<ProjectId>;

/// Port exposing the three independent rankings fused by hybrid search,
/// plus the plain filtered listing (spec §4.6).
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Plain filtered listing with DB-level pagination, no ranking
    /// (spec §4.6 step 1: the empty-query path).
    async fn list_filtered(
        &self,
        filters: &SearchFilters,
        sort_by: SortBy,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Project>>;

    /// Project-level full-text rank against `query` (spec §4.6 `rankP`).
    async fn rank_by_project_text(&self, query: &str, filters: &SearchFilters) -> Result<RankedIds>;

    /// Document-level full-text rank, summed per project (spec §4.6 `rankD`).
    async fn rank_by_document_text(&self, query: &str, filters: &SearchFilters) -> Result<RankedIds>;

    /// Whether any document chunk anywhere has an embedding at all. Used as
    /// the short-circuit check before calling the embedding service
    /// (spec §4.6 step 3 `rankV`, spec §8 boundary behavior).
    async fn any_chunk_embedded(&self) -> Result<bool>;

    /// Vector-similarity rank: nearest chunk per project to `query_embedding`,
    /// ascending distance, intersected with `filters` (spec §4.6 `rankV`).
    async fn rank_by_vector_similarity(
        &self,
        query_embedding: &[f32],
        filters: &SearchFilters,
    ) -> Result<RankedIds>;

    /// Fetch projects by id, in the given order (used to materialize a
    /// fused, paginated id window into entities).
    async fn fetch_by_ids_in_order(&self, ids: &[ProjectId]) -> Result<Vec<Project>>;

    /// Fetch projects whose id is in `ids`, DB-sorted by `sort_by` and
    /// paginated (spec §4.6 step 5, non-relevance sort orders).
    async fn fetch_by_ids_sorted(
        &self,
        ids: &[ProjectId],
        sort_by: SortBy,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Project>>;
}
