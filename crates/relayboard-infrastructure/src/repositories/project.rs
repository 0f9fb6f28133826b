//! Postgres-backed project persistence (spec §3 "Project").

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use relayboard_domain::entities::Project;
use relayboard_domain::error::Result;
use relayboard_domain::ports::ProjectRepository;
use relayboard_domain::value_objects::{OrganizationId, ProjectId, TagId};

use crate::error::from_sqlx;

/// Concrete `projects`/`project_tags` table persistence.
pub struct PgProjectRepository {
    pool: PgPool,
}

impl PgProjectRepository {
    /// Construct a repository over the shared connection pool.
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
    updated_at: DateTime<Utc>,
    has_search_vector: bool,
}

#[async_trait]
impl ProjectRepository for PgProjectRepository {
    async fn get(&self, id: ProjectId) -> Result<Project> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT id, name, status, organization_id, owner_id, start_date, updated_at, has_search_vector \
             FROM projects WHERE id = $1",
        )
        .bind(id.inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| from_sqlx("fetching project", e))?
        .ok_or_else(|| relayboard_domain::Error::not_found(format!("project {id}")))?;

        let tag_ids: Vec<Uuid> = sqlx::query_scalar("SELECT tag_id FROM project_tags WHERE project_id = $1")
            .bind(id.inner())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| from_sqlx("fetching project tags", e))?;

        Ok(Project {
            id: ProjectId::from_uuid(row.id),
            name: row.name,
            status: row.status,
            organization_id: row.organization_id.map(OrganizationId::from_uuid),
            owner_id: row.owner_id,
            start_date: row.start_date,
            tag_ids: tag_ids.into_iter().map(TagId::from_uuid).collect(),
            updated_at: row.updated_at,
            has_search_vector: row.has_search_vector,
        })
    }

    async fn upsert(&self, project: &Project) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| from_sqlx("starting project upsert transaction", e))?;

        sqlx::query(
            r"
            INSERT INTO projects (id, name, status, organization_id, owner_id, start_date, updated_at)
            VALUES ($1,$2,$3,$4,$5,$6,$7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                status = EXCLUDED.status,
                organization_id = EXCLUDED.organization_id,
                owner_id = EXCLUDED.owner_id,
                start_date = EXCLUDED.start_date,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(project.id.inner())
        .bind(&project.name)
        .bind(&project.status)
        .bind(project.organization_id.map(|id| id.inner()))
        .bind(&project.owner_id)
        .bind(project.start_date)
        .bind(project.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| from_sqlx("upserting project", e))?;

        sqlx::query("DELETE FROM project_tags WHERE project_id = $1")
            .bind(project.id.inner())
            .execute(&mut *tx)
            .await
            .map_err(|e| from_sqlx("clearing project tags", e))?;

        for tag_id in &project.tag_ids {
            sqlx::query("INSERT INTO project_tags (project_id, tag_id) VALUES ($1, $2)")
                .bind(project.id.inner())
                .bind(tag_id.inner())
                .execute(&mut *tx)
                .await
                .map_err(|e| from_sqlx("inserting project tag", e))?;
        }

        tx.commit().await.map_err(|e| from_sqlx("committing project upsert transaction", e))?;
        Ok(())
    }
}
