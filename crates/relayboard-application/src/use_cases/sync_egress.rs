//! Sync egress: push local entity state to the external board (spec §4.3).

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value as Json};
use tracing::warn;

use relayboard_domain::entities::sync_entity::{SyncDirection, SyncStatus};
use relayboard_domain::entities::{Contact, Organization};
use relayboard_domain::error::Result;
use relayboard_domain::ports::{BoardClient, ColumnValue, ContactRepository, OrganizationRepository};

/// Board identifiers the integration is configured against. Empty/missing
/// values gate off egress entirely (spec §4.3 "Gating").
#[derive(Debug, Clone, Default)]
pub struct BoardTargets {
    /// Board id contacts are synced to, if configured.
    pub contacts_board: Option<String>,
    /// Board id organizations are synced to, if configured.
    pub organizations_board: Option<String>,
}

/// Pushes dirty local entities to the external board (spec §4.3).
#[derive(Clone)]
pub struct SyncEgressService {
    board: Arc<dyn BoardClient>,
    contacts: Arc<dyn ContactRepository>,
    organizations: Arc<dyn OrganizationRepository>,
    targets: BoardTargets,
}

impl SyncEgressService {
    /// Construct the service with its board target configuration.
    #[must_use]
    pub fn new(
        board: Arc<dyn BoardClient>,
        contacts: Arc<dyn ContactRepository>,
        organizations: Arc<dyn OrganizationRepository>,
        targets: BoardTargets,
    ) -> Self {
        Self {
            board,
            contacts,
            organizations,
            targets,
        }
    }

    /// Push a contact's state to the board. Never raises: failures are
    /// absorbed and leave the entity `PENDING` for a later retry tick
    /// (spec §4.3 "Exceptions from egress must not propagate to callers").
    pub async fn push_contact(&self, contact: &Contact) {
        let Some(board) = self.targets.contacts_board.as_deref() else {
            return;
        };
        if !gated_in(&contact.sync) {
            return;
        }

        let column_values = contact_column_values(contact);
        let result = match &contact.sync.external_id {
            None => self.board.create_item(board, &contact.name, Some(&column_values), None).await,
            Some(external_id) => self
                .board
                .update_item(board, external_id, &column_values)
                .await
                .map(|()| relayboard_domain::ports::BoardItem {
                    id: external_id.clone(),
                    name: contact.name.clone(),
                }),
        };

        match result {
            Ok(item) => {
                let mut updated = contact.clone();
                updated.sync.mark_synced(item.id, Utc::now());
                if let Err(e) = self.contacts.upsert(&updated).await {
                    warn!(contact_id = %contact.id, error = %e, "failed to persist successful egress");
                }
            }
            Err(err) => {
                warn!(contact_id = %contact.id, error = %err, "contact egress failed, marking pending for retry");
                let mut updated = contact.clone();
                updated.sync.sync_status = SyncStatus::Pending;
                if let Err(e) = self.contacts.upsert(&updated).await {
                    warn!(contact_id = %contact.id, error = %e, "failed to persist egress-failure bookkeeping");
                }
            }
        }
    }

    /// Push an organization's state to the board. Same absorb-all-errors
    /// contract as [`Self::push_contact`].
    pub async fn push_organization(&self, organization: &Organization) {
        let Some(board) = self.targets.organizations_board.as_deref() else {
            return;
        };
        if !gated_in(&organization.sync) {
            return;
        }

        let column_values = organization_column_values(organization);
        let result = match &organization.sync.external_id {
            None => {
                self.board
                    .create_item(board, &organization.name, Some(&column_values), None)
                    .await
            }
            Some(external_id) => self
                .board
                .update_item(board, external_id, &column_values)
                .await
                .map(|()| relayboard_domain::ports::BoardItem {
                    id: external_id.clone(),
                    name: organization.name.clone(),
                }),
        };

        match result {
            Ok(item) => {
                let mut updated = organization.clone();
                updated.sync.mark_synced(item.id, Utc::now());
                if let Err(e) = self.organizations.upsert(&updated).await {
                    warn!(org_id = %organization.id, error = %e, "failed to persist successful egress");
                }
            }
            Err(err) => {
                warn!(org_id = %organization.id, error = %err, "organization egress failed, marking pending for retry");
                let mut updated = organization.clone();
                updated.sync.sync_status = SyncStatus::Pending;
                if let Err(e) = self.organizations.upsert(&updated).await {
                    warn!(org_id = %organization.id, error = %e, "failed to persist egress-failure bookkeeping");
                }
            }
        }
    }

    /// Process one egress-retry tick: push every entity currently `PENDING`
    /// (spec §6 `/cron/sync-queue`).
    pub async fn process_retry_queue(&self, limit: u32) -> Result<(u32, u32)> {
        let pending_contacts = self.contacts.list_pending_egress(limit).await?;
        let contacts_count = pending_contacts.len() as u32;
        for contact in &pending_contacts {
            self.push_contact(contact).await;
        }

        let pending_orgs = self.organizations.list_pending_egress(limit).await?;
        let orgs_count = pending_orgs.len() as u32;
        for org in &pending_orgs {
            self.push_organization(org).await;
        }

        Ok((contacts_count, orgs_count))
    }
}

fn gated_in(sync: &relayboard_domain::entities::sync_entity::SyncMetadata) -> bool {
    sync.egress_allowed()
}

/// Build the board column-value projection for a contact (spec §4.3
/// "Column-value formatting").
#[must_use]
pub fn contact_column_values(contact: &Contact) -> Json {
    let mut map = serde_json::Map::new();
    if let Some(email) = &contact.email {
        map.insert(
            "email".to_owned(),
            json!(ColumnValue::Email {
                email: email.clone(),
                text: email.clone(),
            }),
        );
    }
    if let Some(phone) = &contact.phone {
        let country = contact
            .phone_country
            .clone()
            .unwrap_or_else(|| "US".to_owned())
            .to_uppercase();
        map.insert(
            "phone".to_owned(),
            json!(ColumnValue::Phone {
                phone: phone.clone(),
                country_short_name: country,
            }),
        );
    }
    if let Some(status) = &contact.status {
        map.insert("status".to_owned(), json!(ColumnValue::Status { label: status.clone() }));
    }
    Json::Object(map)
}

/// Build the board column-value projection for an organization.
#[must_use]
pub fn organization_column_values(organization: &Organization) -> Json {
    let mut map = serde_json::Map::new();
    if let Some(status) = &organization.status {
        map.insert("status".to_owned(), json!(ColumnValue::Status { label: status.clone() }));
    }
    Json::Object(map)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use relayboard_domain::ports::{BoardApiError, BoardItemPage};
    use relayboard_domain::value_objects::{ContactId, OrganizationId};

    use super::*;

    struct FakeBoard {
        fail_creates: bool,
        created: Mutex<Vec<(String, String)>>,
        updated: Mutex<Vec<(String, String)>>,
    }

    impl FakeBoard {
        fn new(fail_creates: bool) -> Self {
            Self {
                fail_creates,
                created: Mutex::new(Vec::new()),
                updated: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BoardClient for FakeBoard {
        async fn create_item(
            &self,
            board: &str,
            name: &str,
            _column_values: Option<&Json>,
            _group: Option<&str>,
        ) -> std::result::Result<relayboard_domain::ports::BoardItem, BoardApiError> {
            if self.fail_creates {
                return Err(BoardApiError::RateLimit);
            }
            self.created.lock().unwrap().push((board.to_owned(), name.to_owned()));
            Ok(relayboard_domain::ports::BoardItem {
                id: "new-external-id".to_owned(),
                name: name.to_owned(),
            })
        }

        async fn update_item(&self, board: &str, item: &str, _column_values: &Json) -> std::result::Result<(), BoardApiError> {
            self.updated.lock().unwrap().push((board.to_owned(), item.to_owned()));
            Ok(())
        }

        async fn delete_item(&self, _item: &str) -> std::result::Result<(), BoardApiError> {
            Ok(())
        }

        async fn get_board_items(&self, _board: &str, _cursor: Option<&str>) -> std::result::Result<BoardItemPage, BoardApiError> {
            unimplemented!("not exercised by this test")
        }

        async fn search_contacts(
            &self,
            _board: &str,
            _query: &str,
            _columns: Option<&[String]>,
            _limit: Option<u32>,
        ) -> std::result::Result<relayboard_domain::ports::BoardSearchResult, BoardApiError> {
            unimplemented!("not exercised by this test")
        }
    }

    struct FakeContactRepo {
        contacts: Mutex<Vec<Contact>>,
    }

    #[async_trait]
    impl ContactRepository for FakeContactRepo {
        async fn get(&self, id: ContactId) -> Result<Contact> {
            self.contacts
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| relayboard_domain::error::Error::not_found(format!("contact {id}")))
        }

        async fn find_by_external_id(&self, _external_id: &str) -> Result<Option<Contact>> {
            unimplemented!("not exercised by this test")
        }

        async fn upsert(&self, contact: &Contact) -> Result<()> {
            let mut guard = self.contacts.lock().unwrap();
            if let Some(slot) = guard.iter_mut().find(|c| c.id == contact.id) {
                *slot = contact.clone();
            } else {
                guard.push(contact.clone());
            }
            Ok(())
        }

        async fn list_pending_egress(&self, _limit: u32) -> Result<Vec<Contact>> {
            unimplemented!("not exercised by this test")
        }
    }

    struct NullOrgRepo;

    #[async_trait]
    impl OrganizationRepository for NullOrgRepo {
        async fn get(&self, _id: OrganizationId) -> Result<Organization> {
            unimplemented!("not exercised by this test")
        }
        async fn find_by_external_id(&self, _external_id: &str) -> Result<Option<Organization>> {
            unimplemented!("not exercised by this test")
        }
        async fn upsert(&self, _organization: &Organization) -> Result<()> {
            unimplemented!("not exercised by this test")
        }
        async fn list_pending_egress(&self, _limit: u32) -> Result<Vec<Organization>> {
            unimplemented!("not exercised by this test")
        }
    }

    fn unsynced_contact() -> Contact {
        Contact {
            id: ContactId::new(),
            name: "Ada".into(),
            email: Some("ada@example.com".into()),
            phone: None,
            phone_country: None,
            status: None,
            updated_at: Utc::now(),
            sync: relayboard_domain::entities::sync_entity::SyncMetadata::new_unsynced(),
        }
    }

    #[tokio::test]
    async fn push_contact_with_no_board_configured_is_a_no_op() {
        let board = Arc::new(FakeBoard::new(false));
        let contacts = Arc::new(FakeContactRepo { contacts: Mutex::new(Vec::new()) });
        let svc = SyncEgressService::new(board.clone(), contacts.clone(), Arc::new(NullOrgRepo), BoardTargets::default());

        svc.push_contact(&unsynced_contact()).await;

        assert!(board.created.lock().unwrap().is_empty());
        assert!(contacts.contacts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn push_contact_with_sync_disabled_does_not_reach_the_board() {
        let board = Arc::new(FakeBoard::new(false));
        let contacts = Arc::new(FakeContactRepo { contacts: Mutex::new(Vec::new()) });
        let targets = BoardTargets { contacts_board: Some("contacts-board".to_owned()), organizations_board: None };
        let svc = SyncEgressService::new(board.clone(), contacts.clone(), Arc::new(NullOrgRepo), targets);

        let mut contact = unsynced_contact();
        contact.sync.sync_enabled = false;
        svc.push_contact(&contact).await;

        assert!(board.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn push_contact_without_external_id_creates_then_marks_synced() {
        let board = Arc::new(FakeBoard::new(false));
        let contacts = Arc::new(FakeContactRepo { contacts: Mutex::new(Vec::new()) });
        let targets = BoardTargets { contacts_board: Some("contacts-board".to_owned()), organizations_board: None };
        let svc = SyncEgressService::new(board.clone(), contacts.clone(), Arc::new(NullOrgRepo), targets);

        let contact = unsynced_contact();
        svc.push_contact(&contact).await;

        assert_eq!(board.created.lock().unwrap().len(), 1);
        let stored = contacts.get(contact.id).await.unwrap();
        assert_eq!(stored.sync.external_id.as_deref(), Some("new-external-id"));
        assert_eq!(stored.sync.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn push_contact_with_external_id_updates_instead_of_creating() {
        let board = Arc::new(FakeBoard::new(false));
        let contacts = Arc::new(FakeContactRepo { contacts: Mutex::new(Vec::new()) });
        let targets = BoardTargets { contacts_board: Some("contacts-board".to_owned()), organizations_board: None };
        let svc = SyncEgressService::new(board.clone(), contacts.clone(), Arc::new(NullOrgRepo), targets);

        let mut contact = unsynced_contact();
        contact.sync.mark_synced("already-linked", Utc::now());
        contact.sync.sync_status = SyncStatus::Pending;
        svc.push_contact(&contact).await;

        assert!(board.created.lock().unwrap().is_empty());
        assert_eq!(board.updated.lock().unwrap(), vec![("contacts-board".to_owned(), "already-linked".to_owned())]);
        let stored = contacts.get(contact.id).await.unwrap();
        assert_eq!(stored.sync.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn push_contact_absorbs_board_errors_and_marks_pending_for_retry() {
        let board = Arc::new(FakeBoard::new(true));
        let contacts = Arc::new(FakeContactRepo { contacts: Mutex::new(Vec::new()) });
        let targets = BoardTargets { contacts_board: Some("contacts-board".to_owned()), organizations_board: None };
        let svc = SyncEgressService::new(board, contacts.clone(), Arc::new(NullOrgRepo), targets);

        let contact = unsynced_contact();
        svc.push_contact(&contact).await;

        let stored = contacts.get(contact.id).await.unwrap();
        assert_eq!(stored.sync.sync_status, SyncStatus::Pending);
        assert!(stored.sync.external_id.is_none());
    }

    #[test]
    fn column_values_are_stable_across_builds() {
        let contact = Contact {
            id: relayboard_domain::value_objects::ContactId::new(),
            name: "Ada".into(),
            email: Some("ada@example.com".into()),
            phone: Some("5551234".into()),
            phone_country: None,
            status: Some("active".into()),
            updated_at: Utc::now(),
            sync: relayboard_domain::entities::sync_entity::SyncMetadata::new_unsynced(),
        };
        assert_eq!(contact_column_values(&contact), contact_column_values(&contact));
    }

    #[test]
    fn phone_defaults_country_to_us() {
        let contact = Contact {
            id: relayboard_domain::value_objects::ContactId::new(),
            name: "Ada".into(),
            email: None,
            phone: Some("5551234".into()),
            phone_country: None,
            status: None,
            updated_at: Utc::now(),
            sync: relayboard_domain::entities::sync_entity::SyncMetadata::new_unsynced(),
        };
        let values = contact_column_values(&contact);
        assert_eq!(values["phone"]["countryShortName"], "US");
    }
}
