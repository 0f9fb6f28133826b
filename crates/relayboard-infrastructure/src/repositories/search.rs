//! Postgres-backed hybrid-search index (spec §4.6).
//!
//! Full-text ranking rides Postgres's `tsvector`/`ts_rank`; vector ranking
//! rides `pgvector`'s `<->` cosine-distance operator. Filters are built
//! dynamically with [`sqlx::QueryBuilder`] since callers supply any subset.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use uuid::Uuid;

use relayboard_domain::entities::Project;
use relayboard_domain::error::Result;
use relayboard_domain::ports::{RankedIds, SearchFilters, SearchIndex, SortBy};
use relayboard_domain::value_objects::{OrganizationId, ProjectId, TagId};

use crate::error::from_sqlx;
use crate::repositories::document_queue::pgvector_literal;

/// Concrete `projects`/`documents`/`document_chunks` full-text and vector index.
pub struct PgSearchIndex {
    pool: PgPool,
}

impl PgSearchIndex {
    /// Construct an index over the shared connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
    status: Option<String>,
    organization_id: Option<Uuid>,
    owner_id: Option<String>,
    start_date: Option<DateTime<Utc>>,
    tag_ids: Vec<Uuid>,
    updated_at: DateTime<Utc>,
    has_search_vector: bool,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: ProjectId::from_uuid(row.id),
            name: row.name,
            status: row.status,
            organization_id: row.organization_id.map(OrganizationId::from_uuid),
            owner_id: row.owner_id,
            start_date: row.start_date,
            tag_ids: row.tag_ids.into_iter().map(TagId::from_uuid).collect(),
            updated_at: row.updated_at,
            has_search_vector: row.has_search_vector,
        }
    }
}

const PROJECT_SELECT: &str = r"
    SELECT p.id, p.name, p.status, p.organization_id, p.owner_id, p.start_date,
           COALESCE(array_agg(pt.tag_id) FILTER (WHERE pt.tag_id IS NOT NULL), '{}') AS tag_ids,
           p.updated_at, p.has_search_vector
    FROM projects p
    LEFT JOIN project_tags pt ON pt.project_id = p.id
";

fn push_filters<'a>(qb: &mut QueryBuilder<'a, sqlx::Postgres>, filters: &'a SearchFilters, first: &mut bool) {
    let mut clause = |qb: &mut QueryBuilder<'a, sqlx::Postgres>, first: &mut bool| {
        if *first {
            qb.push(" WHERE ");
            *first = false;
        } else {
            qb.push(" AND ");
        }
    };

    if let Some(statuses) = &filters.statuses {
        clause(qb, first);
        qb.push("p.status = ANY(");
        qb.push_bind(statuses.clone());
        qb.push(")");
    }
    if let Some(org) = filters.organization_id {
        clause(qb, first);
        qb.push("p.organization_id = ");
        qb.push_bind(org.inner());
    }
    if let Some(owner) = &filters.owner_id {
        clause(qb, first);
        qb.push("p.owner_id = ");
        qb.push_bind(owner.clone());
    }
    if let Some(from) = filters.start_date_from {
        clause(qb, first);
        qb.push("p.start_date >= ");
        qb.push_bind(from);
    }
    if let Some(to) = filters.start_date_to {
        clause(qb, first);
        qb.push("p.start_date <= ");
        qb.push_bind(to);
    }
    if !filters.tag_ids.is_empty() {
        clause(qb, first);
        let ids: Vec<Uuid> = filters.tag_ids.iter().map(|t| t.inner()).collect();
        qb.push(
            "p.id IN (SELECT project_id FROM project_tags WHERE tag_id = ANY(",
        );
        qb.push_bind(ids);
        qb.push(r") GROUP BY project_id HAVING COUNT(DISTINCT tag_id) = ");
        qb.push_bind(filters.tag_ids.len() as i64);
        qb.push(")");
    }
}

fn sort_clause(sort_by: SortBy) -> &'static str {
    match sort_by {
        SortBy::Relevance | SortBy::UpdatedAt => " ORDER BY p.updated_at DESC",
        SortBy::Name => " ORDER BY p.name ASC",
        SortBy::StartDate => " ORDER BY p.start_date ASC NULLS LAST",
    }
}

#[async_trait]
impl SearchIndex for PgSearchIndex {
    async fn list_filtered(
        &self,
        filters: &SearchFilters,
        sort_by: SortBy,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Project>> {
        let mut qb = QueryBuilder::new(PROJECT_SELECT);
        let mut first = true;
        push_filters(&mut qb, filters, &mut first);
        qb.push(" GROUP BY p.id");
        qb.push(sort_clause(sort_by));
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(limit));
        qb.push(" OFFSET ");
        qb.push_bind(i64::from(offset));

        let rows = qb
            .build_query_as::<ProjectRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| from_sqlx("listing filtered projects", e))?;
        Ok(rows.into_iter().map(Project::from).collect())
    }

    async fn rank_by_project_text(&self, query: &str, filters: &SearchFilters) -> Result<RankedIds> {
        let mut qb = QueryBuilder::new(
            r"
            SELECT p.id FROM projects p
            WHERE p.search_vector @@ websearch_to_tsquery('english',
            ",
        );
        qb.push_bind(query.to_owned());
        qb.push(")");
        push_filters_and(&mut qb, filters);
        qb.push(" ORDER BY ts_rank(p.search_vector, websearch_to_tsquery('english', ");
        qb.push_bind(query.to_owned());
        qb.push(")) DESC");

        let rows: Vec<(Uuid,)> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| from_sqlx("ranking projects by text", e))?;
        Ok(rows.into_iter().map(|(id,)| ProjectId::from_uuid(id)).collect())
    }

    async fn rank_by_document_text(&self, query: &str, filters: &SearchFilters) -> Result<RankedIds> {
        let mut qb = QueryBuilder::new(
            r"
            SELECT p.id, SUM(ts_rank(d.search_vector, websearch_to_tsquery('english',
            ",
        );
        qb.push_bind(query.to_owned());
        qb.push("))) AS score FROM documents d JOIN projects p ON p.id = d.project_id");
        qb.push(" WHERE d.search_vector @@ websearch_to_tsquery('english', ");
        qb.push_bind(query.to_owned());
        qb.push(")");
        push_filters_and(&mut qb, filters);
        qb.push(" GROUP BY p.id ORDER BY score DESC");

        let rows: Vec<(Uuid, f64)> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| from_sqlx("ranking documents by text", e))?;
        Ok(rows.into_iter().map(|(id, _)| ProjectId::from_uuid(id)).collect())
    }

    async fn any_chunk_embedded(&self) -> Result<bool> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM document_chunks WHERE embedding IS NOT NULL)")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| from_sqlx("checking for embedded chunks", e))?;
        Ok(exists)
    }

    async fn rank_by_vector_similarity(
        &self,
        query_embedding: &[f32],
        filters: &SearchFilters,
    ) -> Result<RankedIds> {
        let literal = pgvector_literal(query_embedding);
        let mut qb = QueryBuilder::new("SELECT id FROM (SELECT DISTINCT ON (p.id) p.id AS id, c.embedding <-> ");
        qb.push_bind(literal);
        qb.push(
            "::vector AS distance FROM document_chunks c \
             JOIN documents d ON d.id = c.document_id \
             JOIN projects p ON p.id = d.project_id \
             WHERE c.embedding IS NOT NULL",
        );
        push_filters_and(&mut qb, filters);
        qb.push(" ORDER BY p.id, distance ASC) nearest ORDER BY distance ASC");

        let rows: Vec<(Uuid,)> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| from_sqlx("ranking projects by vector similarity", e))?;
        Ok(rows.into_iter().map(|(id,)| ProjectId::from_uuid(id)).collect())
    }

    async fn fetch_by_ids_in_order(&self, ids: &[ProjectId]) -> Result<Vec<Project>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.inner()).collect();
        let rows = sqlx::query_as::<_, ProjectRow>(&format!(
            "{PROJECT_SELECT} WHERE p.id = ANY($1) GROUP BY p.id"
        ))
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| from_sqlx("fetching projects by id", e))?;

        let mut by_id: std::collections::HashMap<Uuid, Project> =
            rows.into_iter().map(|r| (r.id, Project::from(r))).collect();
        Ok(uuids.into_iter().filter_map(|id| by_id.remove(&id)).collect())
    }

    async fn fetch_by_ids_sorted(
        &self,
        ids: &[ProjectId],
        sort_by: SortBy,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Project>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.inner()).collect();
        let mut qb = QueryBuilder::new(PROJECT_SELECT);
        qb.push(" WHERE p.id = ANY(");
        qb.push_bind(uuids);
        qb.push(")");
        qb.push(" GROUP BY p.id");
        qb.push(sort_clause(sort_by));
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(limit));
        qb.push(" OFFSET ");
        qb.push_bind(i64::from(offset));

        let rows = qb
            .build_query_as::<ProjectRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| from_sqlx("fetching projects by id, sorted", e))?;
        Ok(rows.into_iter().map(Project::from).collect())
    }
}

fn push_filters_and<'a>(qb: &mut QueryBuilder<'a, sqlx::Postgres>, filters: &'a SearchFilters) {
    if let Some(statuses) = &filters.statuses {
        qb.push(" AND p.status = ANY(");
        qb.push_bind(statuses.clone());
        qb.push(")");
    }
    if let Some(org) = filters.organization_id {
        qb.push(" AND p.organization_id = ");
        qb.push_bind(org.inner());
    }
    if let Some(owner) = &filters.owner_id {
        qb.push(" AND p.owner_id = ");
        qb.push_bind(owner.clone());
    }
    if let Some(from) = filters.start_date_from {
        qb.push(" AND p.start_date >= ");
        qb.push_bind(from);
    }
    if let Some(to) = filters.start_date_to {
        qb.push(" AND p.start_date <= ");
        qb.push_bind(to);
    }
    if !filters.tag_ids.is_empty() {
        let ids: Vec<Uuid> = filters.tag_ids.iter().map(|t| t.inner()).collect();
        qb.push(" AND p.id IN (SELECT project_id FROM project_tags WHERE tag_id = ANY(");
        qb.push_bind(ids);
        qb.push(") GROUP BY project_id HAVING COUNT(DISTINCT tag_id) = ");
        qb.push_bind(filters.tag_ids.len() as i64);
        qb.push("))");
    }
}
