//! Contact/Organization sync metadata (spec §3 "Entity (Contact, Organization)").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ContactId, OrganizationId};

/// Where a synced entity currently stands relative to the external board.
///
/// Stored as uppercase symbol names per spec §6 enum storage convention.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::AsRefStr,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum SyncStatus {
    /// Local and board copies agree as of the last successful sync.
    Synced,
    /// A push/pull is outstanding (e.g. after egress failure).
    Pending,
    /// A divergence is awaiting resolution; see [`super::conflict::SyncConflict`].
    Conflict,
    /// Sync has been turned off for this entity.
    Disabled,
}

/// Which direction(s) sync is allowed to flow for an entity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::AsRefStr,
    strum_macros::Display,
    strum_macros::EnumString,
)]
pub enum SyncDirection {
    /// Changes flow both ways.
    #[strum(serialize = "BIDIRECTIONAL")]
    Bidirectional,
    /// Local changes push out; board changes are ignored.
    #[strum(serialize = "NPD_TO_EXT")]
    NpdToExt,
    /// Board changes pull in; local changes are not pushed.
    #[strum(serialize = "EXT_TO_NPD")]
    ExtToNpd,
    /// No sync traffic at all.
    #[strum(serialize = "NONE")]
    None,
}

/// Sync bookkeeping fields shared by every entity kind that mirrors a board
/// item (spec §3 invariants on `Entity (Contact, Organization)`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Board item id once first outbound sync has succeeded; null until then.
    pub external_id: Option<String>,
    /// When the entity was last confirmed in sync with the board.
    pub external_last_synced_at: Option<DateTime<Utc>>,
    /// Current sync status.
    pub sync_status: SyncStatus,
    /// Allowed sync direction(s).
    pub sync_direction: SyncDirection,
    /// Master on/off switch, independent of direction.
    pub sync_enabled: bool,
}

impl SyncMetadata {
    /// Fresh, never-synced metadata with sync enabled bidirectionally.
    #[must_use]
    pub fn new_unsynced() -> Self {
        Self {
            external_id: None,
            external_last_synced_at: None,
            sync_status: SyncStatus::Pending,
            sync_direction: SyncDirection::Bidirectional,
            sync_enabled: true,
        }
    }

    /// Whether egress/ingress sync should run at all for this entity
    /// (spec §3 invariant: `sync_enabled=false` OR `sync_direction=NONE`
    /// implies no sync occurs in either direction).
    #[must_use]
    pub fn sync_is_active(&self) -> bool {
        self.sync_enabled && self.sync_direction != SyncDirection::None
    }

    /// Whether egress (local → board) is permitted by direction.
    #[must_use]
    pub fn egress_allowed(&self) -> bool {
        self.sync_is_active()
            && matches!(
                self.sync_direction,
                SyncDirection::Bidirectional | SyncDirection::NpdToExt
            )
    }

    /// Whether ingress (board → local) is permitted by direction.
    #[must_use]
    pub fn ingress_allowed(&self) -> bool {
        self.sync_is_active()
            && matches!(
                self.sync_direction,
                SyncDirection::Bidirectional | SyncDirection::ExtToNpd
            )
    }

    /// Record a successful outbound sync.
    pub fn mark_synced(&mut self, external_id: impl Into<String>, now: DateTime<Utc>) {
        self.external_id = Some(external_id.into());
        self.external_last_synced_at = Some(now);
        self.sync_status = SyncStatus::Synced;
    }
}

/// A contact record kept in sync with the external board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Unique identifier.
    pub id: ContactId,
    /// Display name.
    pub name: String,
    /// Email address. Required for board-originated creation (spec §4.4).
    pub email: Option<String>,
    /// Phone number, if known.
    pub phone: Option<String>,
    /// ISO country code for `phone`, e.g. "US".
    pub phone_country: Option<String>,
    /// Free-text status label.
    pub status: Option<String>,
    /// When the local record last changed, independent of sync bookkeeping.
    pub updated_at: DateTime<Utc>,
    /// Sync bookkeeping.
    pub sync: SyncMetadata,
}

/// An organization (CRM entity, not a tenant) kept in sync with the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    /// Unique identifier.
    pub id: OrganizationId,
    /// Display name.
    pub name: String,
    /// Free-text status label.
    pub status: Option<String>,
    /// When the local record last changed, independent of sync bookkeeping.
    pub updated_at: DateTime<Utc>,
    /// Sync bookkeeping.
    pub sync: SyncMetadata,
}
