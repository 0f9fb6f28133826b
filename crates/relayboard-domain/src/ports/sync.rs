//! Sync egress/ingress ports and the external board client (spec §4.3, §4.4, §6).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::entities::{Contact, Organization};
use crate::error::Result;
use crate::value_objects::{ContactId, OrganizationId};

/// A board column value, typed per spec §4.3 "Column-value formatting".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnValue {
    /// `{email, text}` object.
    Email {
        /// The email address.
        email: String,
        /// Display text, conventionally identical to `email`.
        text: String,
    },
    /// `{phone, countryShortName}` object.
    Phone {
        /// The phone number.
        phone: String,
        /// Uppercased ISO country code, e.g. "US".
        #[serde(rename = "countryShortName")]
        country_short_name: String,
    },
    /// `{label}` object.
    Status {
        /// The status label.
        label: String,
    },
    /// `YYYY-MM-DD` date string.
    Date(String),
    /// Plain text.
    Text(String),
}

/// Contact repository (application-level persistence, spec §3 "Entity (Contact...)").
#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// Fetch a contact by id.
    async fn get(&self, id: ContactId) -> Result<Contact>;
    /// Find a contact by its board item id.
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Contact>>;
    /// Persist a contact (insert or update by id).
    async fn upsert(&self, contact: &Contact) -> Result<()>;
    /// List contacts whose `sync_status = PENDING` and sync is active,
    /// i.e. candidates for an egress retry tick.
    async fn list_pending_egress(&self, limit: u32) -> Result<Vec<Contact>>;
}

/// Organization repository, mirroring [`ContactRepository`].
#[async_trait]
pub trait OrganizationRepository: Send + Sync {
    /// Fetch an organization by id.
    async fn get(&self, id: OrganizationId) -> Result<Organization>;
    /// Find an organization by its board item id.
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Organization>>;
    /// Persist an organization (insert or update by id).
    async fn upsert(&self, organization: &Organization) -> Result<()>;
    /// List organizations whose `sync_status = PENDING` and sync is active.
    async fn list_pending_egress(&self, limit: u32) -> Result<Vec<Organization>>;
}

/// A board item returned by [`BoardClient::create_item`]/`update_item`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardItem {
    /// The board's id for this item.
    pub id: String,
    /// The item's display name on the board.
    pub name: String,
}

/// A page of items returned by a cursored board walk.
#[derive(Debug, Clone)]
pub struct BoardItemPage {
    /// Items in this page.
    pub items: Vec<Json>,
    /// Opaque cursor for the next page, if any remain.
    pub next_cursor: Option<String>,
}

/// Outcome of a contact search against the board.
#[derive(Debug, Clone)]
pub struct BoardSearchResult {
    /// Matching items.
    pub items: Vec<Json>,
    /// Cursor for continuing the search.
    pub cursor: Option<String>,
    /// Whether more results remain beyond this page.
    pub has_more: bool,
}

/// Error surfaced by [`BoardClient`] calls (spec §6: "may raise `RateLimit`,
/// `AuthError`, `NotFound`, or a generic API error").
#[derive(Debug, thiserror::Error)]
pub enum BoardApiError {
    /// The board rejected the call due to rate limiting.
    #[error("board rate limit exceeded")]
    RateLimit,
    /// The board rejected the call's credentials.
    #[error("board authentication failed")]
    AuthError,
    /// The referenced item/board does not exist.
    #[error("board item not found: {0}")]
    NotFound(String),
    /// Any other API error.
    #[error("board API error: {0}")]
    Api(String),
}

/// The external collaboration service holding items that mirror local
/// entities (spec §6 "External board client").
#[async_trait]
pub trait BoardClient: Send + Sync {
    /// Create a new item on `board`, returning its id and name.
    async fn create_item(
        &self,
        board: &str,
        name: &str,
        column_values: Option<&Json>,
        group: Option<&str>,
    ) -> std::result::Result<BoardItem, BoardApiError>;

    /// Update an existing item's column values.
    async fn update_item(
        &self,
        board: &str,
        item: &str,
        column_values: &Json,
    ) -> std::result::Result<(), BoardApiError>;

    /// Delete an item.
    async fn delete_item(&self, item: &str) -> std::result::Result<(), BoardApiError>;

    /// Walk a board's items via cursored pagination.
    async fn get_board_items(
        &self,
        board: &str,
        cursor: Option<&str>,
    ) -> std::result::Result<BoardItemPage, BoardApiError>;

    /// Search a board's contacts.
    async fn search_contacts(
        &self,
        board: &str,
        query: &str,
        columns: Option<&[String]>,
        limit: Option<u32>,
    ) -> std::result::Result<BoardSearchResult, BoardApiError>;
}

/// Verifies webhook signatures for the sync ingress endpoint (spec §4.4 step 3).
pub trait WebhookVerifier: Send + Sync {
    /// Verify `signature` over `payload` using the configured shared secret.
    /// Returns `true` if valid, `false` if invalid/expired. If no secret is
    /// configured, callers should log a warning and treat this as `true`
    /// (spec §4.4: "If no secret is configured, logs a warning but proceeds").
    fn verify(&self, payload: &[u8], signature: &str) -> bool;
}
