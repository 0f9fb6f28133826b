//! Postgres-backed contact/organization repositories (spec §4.3, §4.4).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use relayboard_domain::entities::{Contact, Organization, SyncDirection, SyncMetadata, SyncStatus};
use relayboard_domain::error::Result;
use relayboard_domain::ports::{ContactRepository, OrganizationRepository};
use relayboard_domain::value_objects::{ContactId, OrganizationId};

use crate::error::from_sqlx;

fn sync_metadata(
    external_id: Option<String>,
    external_last_synced_at: Option<DateTime<Utc>>,
    sync_status: &str,
    sync_direction: &str,
    sync_enabled: bool,
) -> SyncMetadata {
    SyncMetadata {
        external_id,
        external_last_synced_at,
        sync_status: SyncStatus::from_str(sync_status).unwrap_or(SyncStatus::Pending),
        sync_direction: SyncDirection::from_str(sync_direction).unwrap_or(SyncDirection::Bidirectional),
        sync_enabled,
    }
}

/// Concrete `contacts` table persistence.
pub struct PgContactRepository {
    pool: PgPool,
}

impl PgContactRepository {
    /// Construct a repository over the shared connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ContactRow {
    id: Uuid,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    phone_country: Option<String>,
    status: Option<String>,
    updated_at: DateTime<Utc>,
    external_id: Option<String>,
    external_last_synced_at: Option<DateTime<Utc>>,
    sync_status: String,
    sync_direction: String,
    sync_enabled: bool,
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Contact {
            id: ContactId::from_uuid(row.id),
            name: row.name,
            email: row.email,
            phone: row.phone,
            phone_country: row.phone_country,
            status: row.status,
            updated_at: row.updated_at,
            sync: sync_metadata(
                row.external_id,
                row.external_last_synced_at,
                &row.sync_status,
                &row.sync_direction,
                row.sync_enabled,
            ),
        }
    }
}

#[async_trait]
impl ContactRepository for PgContactRepository {
    async fn get(&self, id: ContactId) -> Result<Contact> {
        let row = sqlx::query_as::<_, ContactRow>("SELECT * FROM contacts WHERE id = $1")
            .bind(id.inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| from_sqlx("fetching contact", e))?
            .ok_or_else(|| relayboard_domain::Error::not_found(format!("contact {id}")))?;
        Ok(row.into())
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Contact>> {
        let row = sqlx::query_as::<_, ContactRow>("SELECT * FROM contacts WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| from_sqlx("finding contact by external id", e))?;
        Ok(row.map(Contact::from))
    }

    async fn upsert(&self, contact: &Contact) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO contacts (
                id, name, email, phone, phone_country, status, updated_at,
                external_id, external_last_synced_at, sync_status, sync_direction, sync_enabled
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name, email = EXCLUDED.email, phone = EXCLUDED.phone,
                phone_country = EXCLUDED.phone_country, status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at, external_id = EXCLUDED.external_id,
                external_last_synced_at = EXCLUDED.external_last_synced_at,
                sync_status = EXCLUDED.sync_status, sync_direction = EXCLUDED.sync_direction,
                sync_enabled = EXCLUDED.sync_enabled
            ",
        )
        .bind(contact.id.inner())
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(&contact.phone_country)
        .bind(&contact.status)
        .bind(contact.updated_at)
        .bind(&contact.sync.external_id)
        .bind(contact.sync.external_last_synced_at)
        .bind(contact.sync.sync_status.to_string())
        .bind(contact.sync.sync_direction.to_string())
        .bind(contact.sync.sync_enabled)
        .execute(&self.pool)
        .await
        .map_err(|e| from_sqlx("upserting contact", e))?;
        Ok(())
    }

    async fn list_pending_egress(&self, limit: u32) -> Result<Vec<Contact>> {
        let rows = sqlx::query_as::<_, ContactRow>(
            "SELECT * FROM contacts WHERE sync_status = 'PENDING' AND sync_enabled AND sync_direction != 'NONE' LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| from_sqlx("listing contacts pending egress", e))?;
        Ok(rows.into_iter().map(Contact::from).collect())
    }
}

/// Concrete `organizations` table persistence.
pub struct PgOrganizationRepository {
    pool: PgPool,
}

impl PgOrganizationRepository {
    /// Construct a repository over the shared connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrganizationRow {
    id: Uuid,
    name: String,
    status: Option<String>,
    updated_at: DateTime<Utc>,
    external_id: Option<String>,
    external_last_synced_at: Option<DateTime<Utc>>,
    sync_status: String,
    sync_direction: String,
    sync_enabled: bool,
}

impl From<OrganizationRow> for Organization {
    fn from(row: OrganizationRow) -> Self {
        Organization {
            id: OrganizationId::from_uuid(row.id),
            name: row.name,
            status: row.status,
            updated_at: row.updated_at,
            sync: sync_metadata(
                row.external_id,
                row.external_last_synced_at,
                &row.sync_status,
                &row.sync_direction,
                row.sync_enabled,
            ),
        }
    }
}

#[async_trait]
impl OrganizationRepository for PgOrganizationRepository {
    async fn get(&self, id: OrganizationId) -> Result<Organization> {
        let row = sqlx::query_as::<_, OrganizationRow>("SELECT * FROM organizations WHERE id = $1")
            .bind(id.inner())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| from_sqlx("fetching organization", e))?
            .ok_or_else(|| relayboard_domain::Error::not_found(format!("organization {id}")))?;
        Ok(row.into())
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Organization>> {
        let row = sqlx::query_as::<_, OrganizationRow>("SELECT * FROM organizations WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| from_sqlx("finding organization by external id", e))?;
        Ok(row.map(Organization::from))
    }

    async fn upsert(&self, organization: &Organization) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO organizations (
                id, name, status, updated_at, external_id, external_last_synced_at,
                sync_status, sync_direction, sync_enabled
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name, status = EXCLUDED.status, updated_at = EXCLUDED.updated_at,
                external_id = EXCLUDED.external_id,
                external_last_synced_at = EXCLUDED.external_last_synced_at,
                sync_status = EXCLUDED.sync_status, sync_direction = EXCLUDED.sync_direction,
                sync_enabled = EXCLUDED.sync_enabled
            ",
        )
        .bind(organization.id.inner())
        .bind(&organization.name)
        .bind(&organization.status)
        .bind(organization.updated_at)
        .bind(&organization.sync.external_id)
        .bind(organization.sync.external_last_synced_at)
        .bind(organization.sync.sync_status.to_string())
        .bind(organization.sync.sync_direction.to_string())
        .bind(organization.sync.sync_enabled)
        .execute(&self.pool)
        .await
        .map_err(|e| from_sqlx("upserting organization", e))?;
        Ok(())
    }

    async fn list_pending_egress(&self, limit: u32) -> Result<Vec<Organization>> {
        let rows = sqlx::query_as::<_, OrganizationRow>(
            "SELECT * FROM organizations WHERE sync_status = 'PENDING' AND sync_enabled AND sync_direction != 'NONE' LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| from_sqlx("listing organizations pending egress", e))?;
        Ok(rows.into_iter().map(Organization::from).collect())
    }
}
