//! Postgres-backed tag and synonym-graph repository (spec §4.8).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use relayboard_domain::entities::{Tag, TagSynonym};
use relayboard_domain::error::Result;
use relayboard_domain::ports::TagRepository;
use relayboard_domain::value_objects::{ProjectId, TagId};

use crate::error::from_sqlx;

/// Concrete `tags` / `tag_synonyms` table persistence.
pub struct PgTagRepository {
    pool: PgPool,
}

impl PgTagRepository {
    /// Construct a repository over the shared connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TagRow {
    id: Uuid,
    name: String,
    tag_type: String,
}

impl From<TagRow> for Tag {
    fn from(row: TagRow) -> Self {
        Tag { id: TagId::from_uuid(row.id), name: row.name, tag_type: row.tag_type }
    }
}

#[derive(sqlx::FromRow)]
struct SynonymRow {
    tag_id: Uuid,
    synonym_tag_id: Uuid,
    confidence: f64,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<SynonymRow> for TagSynonym {
    fn from(row: SynonymRow) -> Self {
        TagSynonym {
            tag_id: TagId::from_uuid(row.tag_id),
            synonym_tag_id: TagId::from_uuid(row.synonym_tag_id),
            confidence: row.confidence,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl TagRepository for PgTagRepository {
    async fn get(&self, id: TagId) -> Result<Tag> {
        let row = sqlx::query_as::<_, TagRow>("SELECT * FROM tags WHERE id = $1")
            .bind(id.inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| from_sqlx("fetching tag", e))?
            .ok_or_else(|| relayboard_domain::Error::not_found(format!("tag {id}")))?;
        Ok(row.into())
    }

    async fn edges_touching(&self, id: TagId) -> Result<Vec<TagSynonym>> {
        let rows = sqlx::query_as::<_, SynonymRow>(
            "SELECT * FROM tag_synonyms WHERE tag_id = $1 OR synonym_tag_id = $1",
        )
        .bind(id.inner())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| from_sqlx("fetching synonym edges", e))?;
        Ok(rows.into_iter().map(TagSynonym::from).collect())
    }

    async fn insert_edge(&self, edge: &TagSynonym) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO tag_synonyms (tag_id, synonym_tag_id, confidence, created_by, created_at)
            VALUES ($1,$2,$3,$4,$5)
            ON CONFLICT (tag_id, synonym_tag_id) DO NOTHING
            ",
        )
        .bind(edge.tag_id.inner())
        .bind(edge.synonym_tag_id.inner())
        .bind(edge.confidence)
        .bind(&edge.created_by)
        .bind(edge.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| from_sqlx("inserting synonym edge", e))?;
        Ok(())
    }

    async fn delete_edge(&self, a: TagId, b: TagId) -> Result<()> {
        sqlx::query(
            r"
            DELETE FROM tag_synonyms
            WHERE (tag_id = $1 AND synonym_tag_id = $2) OR (tag_id = $2 AND synonym_tag_id = $1)
            ",
        )
        .bind(a.inner())
        .bind(b.inner())
        .execute(&self.pool)
        .await
        .map_err(|e| from_sqlx("deleting synonym edge", e))?;
        Ok(())
    }

    async fn delete_tag(&self, id: TagId) -> Result<()> {
        sqlx::query("DELETE FROM tags WHERE id = $1")
            .bind(id.inner())
            .execute(&self.pool)
            .await
            .map_err(|e| from_sqlx("deleting tag", e))?;
        Ok(())
    }

    async fn project_ids_for_tag(&self, tag_id: TagId) -> Result<Vec<ProjectId>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT project_id FROM project_tags WHERE tag_id = $1")
            .bind(tag_id.inner())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| from_sqlx("listing projects for tag", e))?;
        Ok(rows.into_iter().map(|(id,)| ProjectId::from_uuid(id)).collect())
    }

    async fn reassign_project_tag(&self, project_id: ProjectId, source: TagId, target: TagId) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO project_tags (project_id, tag_id)
            VALUES ($1, $2)
            ON CONFLICT (project_id, tag_id) DO NOTHING
            ",
        )
        .bind(project_id.inner())
        .bind(target.inner())
        .execute(&self.pool)
        .await
        .map_err(|e| from_sqlx("reassigning project tag", e))?;

        sqlx::query("DELETE FROM project_tags WHERE project_id = $1 AND tag_id = $2")
            .bind(project_id.inner())
            .bind(source.inner())
            .execute(&self.pool)
            .await
            .map_err(|e| from_sqlx("clearing source project tag", e))?;
        Ok(())
    }
}
