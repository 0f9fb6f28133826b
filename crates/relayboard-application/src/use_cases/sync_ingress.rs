//! Sync ingress: dispatch board webhook events into local state, opening
//! conflicts on divergence (spec §4.4).

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as Json;
use tracing::{info, warn};

use relayboard_domain::entities::conflict::ConflictEntityType;
use relayboard_domain::entities::sync_entity::SyncMetadata;
use relayboard_domain::entities::{Contact, Organization, SyncConflict};
use relayboard_domain::error::Result;
use relayboard_domain::ports::{ConflictRepository, ContactRepository, OrganizationRepository};
use relayboard_domain::value_objects::ContactId;

use super::conflict_service::{apply_field_to_contact, apply_field_to_organization, AppliedChanges, ConflictService};

/// Which board an ingress event targets (spec §4.4 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardKind {
    /// The board carrying contact items.
    Contacts,
    /// The board carrying organization items.
    Organizations,
}

/// A single inbound webhook event, already classified by board and type.
#[derive(Debug, Clone)]
pub struct IngressEvent {
    /// Which board the event came from.
    pub board: BoardKind,
    /// The kind of change.
    pub kind: IngressEventKind,
    /// The board's id for the affected item.
    pub item_id: String,
    /// The item's column data, present for create/update.
    pub item_data: Option<Json>,
}

/// The change an [`IngressEvent`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressEventKind {
    /// A new item was created on the board.
    Create,
    /// An existing item's columns changed.
    Update,
    /// The item was deleted from the board.
    Delete,
}

/// Outcome of dispatching one ingress event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressOutcome {
    /// A new local record was created.
    Created,
    /// The local record was updated and marked synced.
    Updated,
    /// The local record was unlinked from the board (delete; spec §4.4 step
    /// 5 "mark local record as unlinked ... or cascade per policy" — this
    /// system never cascades).
    Unlinked,
    /// A divergence was detected; a conflict was opened instead of applying
    /// the change.
    ConflictOpened,
    /// The event was a no-op (e.g. contact create with no email).
    Skipped,
}

/// Dispatches board webhook events to local entity state (spec §4.4 step 5).
#[derive(Clone)]
pub struct SyncIngressService {
    contacts: Arc<dyn ContactRepository>,
    organizations: Arc<dyn OrganizationRepository>,
    conflicts: Arc<dyn ConflictRepository>,
    conflict_service: Arc<ConflictService>,
}

impl SyncIngressService {
    /// Construct the service over its repositories and the conflict service
    /// it uses for auto-resolution.
    #[must_use]
    pub fn new(
        contacts: Arc<dyn ContactRepository>,
        organizations: Arc<dyn OrganizationRepository>,
        conflicts: Arc<dyn ConflictRepository>,
        conflict_service: Arc<ConflictService>,
    ) -> Self {
        Self {
            contacts,
            organizations,
            conflicts,
            conflict_service,
        }
    }

    /// Dispatch one event (spec §4.4 step 5).
    pub async fn dispatch(&self, event: &IngressEvent) -> Result<IngressOutcome> {
        match event.board {
            BoardKind::Contacts => self.dispatch_contact(event).await,
            BoardKind::Organizations => self.dispatch_organization(event).await,
        }
    }

    async fn dispatch_contact(&self, event: &IngressEvent) -> Result<IngressOutcome> {
        match event.kind {
            IngressEventKind::Create => {
                if let Some(existing) = self.contacts.find_by_external_id(&event.item_id).await? {
                    return self.apply_contact_update(existing, event).await;
                }
                let Some(data) = &event.item_data else {
                    return Ok(IngressOutcome::Skipped);
                };
                let Some(email) = data.get("email").and_then(Json::as_str) else {
                    info!(item_id = %event.item_id, "contact create skipped: no email");
                    return Ok(IngressOutcome::Skipped);
                };
                let now = Utc::now();
                let mut sync = SyncMetadata::new_unsynced();
                sync.mark_synced(event.item_id.clone(), now);
                let contact = Contact {
                    id: ContactId::new(),
                    name: data.get("name").and_then(Json::as_str).unwrap_or_default().to_owned(),
                    email: Some(email.to_owned()),
                    phone: data.get("phone").and_then(Json::as_str).map(ToOwned::to_owned),
                    phone_country: None,
                    status: data.get("status").and_then(Json::as_str).map(ToOwned::to_owned),
                    updated_at: now,
                    sync,
                };
                self.contacts.upsert(&contact).await?;
                Ok(IngressOutcome::Created)
            }
            IngressEventKind::Update => {
                let Some(existing) = self.contacts.find_by_external_id(&event.item_id).await? else {
                    warn!(item_id = %event.item_id, "contact update for unknown external_id");
                    return Ok(IngressOutcome::Skipped);
                };
                self.apply_contact_update(existing, event).await
            }
            IngressEventKind::Delete => {
                let Some(mut existing) = self.contacts.find_by_external_id(&event.item_id).await? else {
                    return Ok(IngressOutcome::Skipped);
                };
                existing.sync.external_id = None;
                existing.sync.sync_status = relayboard_domain::entities::sync_entity::SyncStatus::Disabled;
                self.contacts.upsert(&existing).await?;
                Ok(IngressOutcome::Unlinked)
            }
        }
    }

    async fn apply_contact_update(&self, existing: Contact, event: &IngressEvent) -> Result<IngressOutcome> {
        let Some(data) = &event.item_data else {
            return Ok(IngressOutcome::Skipped);
        };

        let locally_modified = existing
            .sync
            .external_last_synced_at
            .is_none_or(|last_synced| existing.updated_at > last_synced);

        let mut diverging = Vec::new();
        if let Some(name) = data.get("name").and_then(Json::as_str) {
            if name != existing.name {
                diverging.push("name".to_owned());
            }
        }
        if let Some(email) = data.get("email").and_then(Json::as_str) {
            if Some(email) != existing.email.as_deref() {
                diverging.push("email".to_owned());
            }
        }
        if diverging.is_empty() {
            return Ok(IngressOutcome::Skipped);
        }

        if !locally_modified {
            let mut updated = existing;
            apply_contact_fields(&mut updated, data);
            updated.sync.mark_synced(event.item_id.clone(), Utc::now());
            self.contacts.upsert(&updated).await?;
            return Ok(IngressOutcome::Updated);
        }

        match self
            .evaluate_conflict(
                ConflictEntityType::Contact,
                existing.id.to_string(),
                serde_json::to_value(&existing).unwrap_or(Json::Null),
                data.clone(),
                diverging,
            )
            .await?
        {
            ConflictOutcome::AutoResolved(applied) => {
                let mut updated = existing;
                for (field, value) in &applied {
                    apply_field_to_contact(&mut updated, field, value);
                }
                updated.sync.mark_synced(event.item_id.clone(), Utc::now());
                self.contacts.upsert(&updated).await?;
                Ok(IngressOutcome::Updated)
            }
            ConflictOutcome::Opened => Ok(IngressOutcome::ConflictOpened),
        }
    }

    async fn dispatch_organization(&self, event: &IngressEvent) -> Result<IngressOutcome> {
        match event.kind {
            IngressEventKind::Create => {
                if let Some(existing) = self.organizations.find_by_external_id(&event.item_id).await? {
                    return self.apply_organization_update(existing, event).await;
                }
                let Some(data) = &event.item_data else {
                    return Ok(IngressOutcome::Skipped);
                };
                let now = Utc::now();
                let mut sync = SyncMetadata::new_unsynced();
                sync.mark_synced(event.item_id.clone(), now);
                let organization = Organization {
                    id: relayboard_domain::value_objects::OrganizationId::new(),
                    name: data.get("name").and_then(Json::as_str).unwrap_or_default().to_owned(),
                    status: data.get("status").and_then(Json::as_str).map(ToOwned::to_owned),
                    updated_at: now,
                    sync,
                };
                self.organizations.upsert(&organization).await?;
                Ok(IngressOutcome::Created)
            }
            IngressEventKind::Update => {
                let Some(existing) = self.organizations.find_by_external_id(&event.item_id).await? else {
                    warn!(item_id = %event.item_id, "organization update for unknown external_id");
                    return Ok(IngressOutcome::Skipped);
                };
                self.apply_organization_update(existing, event).await
            }
            IngressEventKind::Delete => {
                let Some(mut existing) = self.organizations.find_by_external_id(&event.item_id).await? else {
                    return Ok(IngressOutcome::Skipped);
                };
                existing.sync.external_id = None;
                existing.sync.sync_status = relayboard_domain::entities::sync_entity::SyncStatus::Disabled;
                self.organizations.upsert(&existing).await?;
                Ok(IngressOutcome::Unlinked)
            }
        }
    }

    async fn apply_organization_update(&self, existing: Organization, event: &IngressEvent) -> Result<IngressOutcome> {
        let Some(data) = &event.item_data else {
            return Ok(IngressOutcome::Skipped);
        };

        let locally_modified = existing
            .sync
            .external_last_synced_at
            .is_none_or(|last_synced| existing.updated_at > last_synced);

        let mut diverging = Vec::new();
        if let Some(name) = data.get("name").and_then(Json::as_str) {
            if name != existing.name {
                diverging.push("name".to_owned());
            }
        }
        if diverging.is_empty() {
            return Ok(IngressOutcome::Skipped);
        }

        if !locally_modified {
            let mut updated = existing;
            if let Some(name) = data.get("name").and_then(Json::as_str) {
                updated.name = name.to_owned();
            }
            updated.sync.mark_synced(event.item_id.clone(), Utc::now());
            self.organizations.upsert(&updated).await?;
            return Ok(IngressOutcome::Updated);
        }

        match self
            .evaluate_conflict(
                ConflictEntityType::Organization,
                existing.id.to_string(),
                serde_json::to_value(&existing).unwrap_or(Json::Null),
                data.clone(),
                diverging,
            )
            .await?
        {
            ConflictOutcome::AutoResolved(applied) => {
                let mut updated = existing;
                for (field, value) in &applied {
                    apply_field_to_organization(&mut updated, field, value);
                }
                updated.sync.mark_synced(event.item_id.clone(), Utc::now());
                self.organizations.upsert(&updated).await?;
                Ok(IngressOutcome::Updated)
            }
            ConflictOutcome::Opened => Ok(IngressOutcome::ConflictOpened),
        }
    }

    /// Evaluate auto-resolution rules first; only open a conflict record for
    /// whatever fields remain unresolved (spec §4.5 "Auto-resolution"). The
    /// caller applies `AutoResolved`'s changes to its own copy of the entity.
    async fn evaluate_conflict(
        &self,
        entity_type: ConflictEntityType,
        entity_id: String,
        npd_data: Json,
        external_data: Json,
        conflict_fields: Vec<String>,
    ) -> Result<ConflictOutcome> {
        let (unresolved, auto_applied) = self
            .conflict_service
            .auto_resolve(entity_type, &conflict_fields, &npd_data, &external_data)
            .await?;

        if unresolved.is_empty() {
            return Ok(ConflictOutcome::AutoResolved(auto_applied));
        }

        let conflict = SyncConflict::new_detected(entity_type, entity_id, npd_data, external_data, unresolved, Utc::now());
        self.conflicts.insert(&conflict).await?;
        Ok(ConflictOutcome::Opened)
    }
}

/// Result of [`SyncIngressService::evaluate_conflict`].
enum ConflictOutcome {
    /// Every conflicting field was settled by an auto-resolution rule.
    AutoResolved(AppliedChanges),
    /// Fields remain unresolved; a [`SyncConflict`] record was opened.
    Opened,
}

fn apply_contact_fields(contact: &mut Contact, data: &Json) {
    if let Some(name) = data.get("name").and_then(Json::as_str) {
        contact.name = name.to_owned();
    }
    if let Some(email) = data.get("email").and_then(Json::as_str) {
        contact.email = Some(email.to_owned());
    }
    if let Some(phone) = data.get("phone").and_then(Json::as_str) {
        contact.phone = Some(phone.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relayboard_domain::entities::conflict::AutoResolutionRule;
    use relayboard_domain::ports::AutoResolutionRuleRepository;
    use relayboard_domain::value_objects::ConflictId;
    use serde_json::json;
    use std::sync::Mutex;

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
                .ok_or_else(|| relayboard_domain::Error::not_found(format!("contact {id}")))
        }

        async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Contact>> {
            Ok(self
                .contacts
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.sync.external_id.as_deref() == Some(external_id))
                .cloned())
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
            Ok(Vec::new())
        }
    }

    struct FakeOrgRepo {
        organizations: Mutex<Vec<Organization>>,
    }

    #[async_trait]
    impl OrganizationRepository for FakeOrgRepo {
        async fn get(&self, id: relayboard_domain::value_objects::OrganizationId) -> Result<Organization> {
            self.organizations
                .lock()
                .unwrap()
                .iter()
                .find(|o| o.id == id)
                .cloned()
                .ok_or_else(|| relayboard_domain::Error::not_found(format!("organization {id}")))
        }
        async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Organization>> {
            Ok(self
                .organizations
                .lock()
                .unwrap()
                .iter()
                .find(|o| o.sync.external_id.as_deref() == Some(external_id))
                .cloned())
        }
        async fn upsert(&self, organization: &Organization) -> Result<()> {
            let mut guard = self.organizations.lock().unwrap();
            if let Some(slot) = guard.iter_mut().find(|o| o.id == organization.id) {
                *slot = organization.clone();
            } else {
                guard.push(organization.clone());
            }
            Ok(())
        }
        async fn list_pending_egress(&self, _limit: u32) -> Result<Vec<Organization>> {
            Ok(Vec::new())
        }
    }

    struct FakeConflictRepo {
        conflicts: Mutex<Vec<SyncConflict>>,
    }

    #[async_trait]
    impl ConflictRepository for FakeConflictRepo {
        async fn get(&self, id: ConflictId) -> Result<SyncConflict> {
            self.conflicts
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or_else(|| relayboard_domain::Error::not_found(format!("conflict {id}")))
        }
        async fn insert(&self, conflict: &SyncConflict) -> Result<()> {
            self.conflicts.lock().unwrap().push(conflict.clone());
            Ok(())
        }
        async fn update(&self, conflict: &SyncConflict) -> Result<()> {
            let mut guard = self.conflicts.lock().unwrap();
            if let Some(slot) = guard.iter_mut().find(|c| c.id == conflict.id) {
                *slot = conflict.clone();
            }
            Ok(())
        }
        async fn list_unresolved(&self, _entity_type: Option<ConflictEntityType>) -> Result<Vec<SyncConflict>> {
            Ok(Vec::new())
        }
    }

    struct FakeRuleRepo {
        rules: Vec<AutoResolutionRule>,
    }

    #[async_trait]
    impl AutoResolutionRuleRepository for FakeRuleRepo {
        async fn list_enabled_for_entity(&self, entity_type: ConflictEntityType) -> Result<Vec<AutoResolutionRule>> {
            Ok(self.rules.iter().filter(|r| r.entity_type == entity_type && r.is_enabled).cloned().collect())
        }
        async fn list_all(&self) -> Result<Vec<AutoResolutionRule>> {
            Ok(Vec::new())
        }
        async fn insert(&self, _rule: &AutoResolutionRule) -> Result<()> {
            Ok(())
        }
        async fn update(&self, _rule: &AutoResolutionRule) -> Result<()> {
            Ok(())
        }
        async fn delete(&self, _id: relayboard_domain::value_objects::RuleId) -> Result<()> {
            Ok(())
        }
    }

    struct NoopBoard;

    #[async_trait]
    impl relayboard_domain::ports::BoardClient for NoopBoard {
        async fn create_item(
            &self,
            _board: &str,
            name: &str,
            _column_values: Option<&Json>,
            _group: Option<&str>,
        ) -> std::result::Result<relayboard_domain::ports::BoardItem, relayboard_domain::ports::BoardApiError> {
            Ok(relayboard_domain::ports::BoardItem { id: "noop".to_owned(), name: name.to_owned() })
        }
        async fn update_item(
            &self,
            _board: &str,
            _item: &str,
            _column_values: &Json,
        ) -> std::result::Result<(), relayboard_domain::ports::BoardApiError> {
            Ok(())
        }
        async fn delete_item(&self, _item: &str) -> std::result::Result<(), relayboard_domain::ports::BoardApiError> {
            Ok(())
        }
        async fn get_board_items(
            &self,
            _board: &str,
            _cursor: Option<&str>,
        ) -> std::result::Result<relayboard_domain::ports::BoardItemPage, relayboard_domain::ports::BoardApiError> {
            unimplemented!("not exercised by these tests")
        }
        async fn search_contacts(
            &self,
            _board: &str,
            _query: &str,
            _columns: Option<&[String]>,
            _limit: Option<u32>,
        ) -> std::result::Result<relayboard_domain::ports::BoardSearchResult, relayboard_domain::ports::BoardApiError> {
            unimplemented!("not exercised by these tests")
        }
    }

    /// Build a service whose `ConflictService` has no board configured, so
    /// egress is a no-op but auto-resolution still runs for real.
    fn service(contact_repo: Arc<FakeContactRepo>, conflict_repo: Arc<FakeConflictRepo>) -> SyncIngressService {
        service_with_rules(contact_repo, conflict_repo, Vec::new())
    }

    fn service_with_rules(
        contact_repo: Arc<FakeContactRepo>,
        conflict_repo: Arc<FakeConflictRepo>,
        rules: Vec<AutoResolutionRule>,
    ) -> SyncIngressService {
        let organizations = Arc::new(FakeOrgRepo { organizations: Mutex::new(Vec::new()) });
        let egress = Arc::new(super::super::sync_egress::SyncEgressService::new(
            Arc::new(NoopBoard),
            contact_repo.clone(),
            organizations.clone(),
            super::super::sync_egress::BoardTargets::default(),
        ));
        let conflict_service = Arc::new(ConflictService::new(
            conflict_repo.clone(),
            Arc::new(FakeRuleRepo { rules }),
            contact_repo.clone(),
            organizations,
            egress,
        ));
        SyncIngressService::new(contact_repo, Arc::new(FakeOrgRepo { organizations: Mutex::new(Vec::new()) }), conflict_repo, conflict_service)
    }

    #[tokio::test]
    async fn create_without_email_is_skipped() {
        let contacts = Arc::new(FakeContactRepo { contacts: Mutex::new(Vec::new()) });
        let conflicts = Arc::new(FakeConflictRepo { conflicts: Mutex::new(Vec::new()) });
        let svc = service(contacts, conflicts);

        let event = IngressEvent {
            board: BoardKind::Contacts,
            kind: IngressEventKind::Create,
            item_id: "item-1".into(),
            item_data: Some(json!({ "name": "Ada" })),
        };
        let outcome = svc.dispatch(&event).await.unwrap();
        assert_eq!(outcome, IngressOutcome::Skipped);
    }

    #[tokio::test]
    async fn update_on_locally_modified_record_opens_conflict() {
        let now = Utc::now();
        let mut sync = SyncMetadata::new_unsynced();
        sync.mark_synced("item-1".into(), now - chrono::Duration::hours(1));
        let existing = Contact {
            id: ContactId::new(),
            name: "Old Name".into(),
            email: Some("old@example.com".into()),
            phone: None,
            phone_country: None,
            status: None,
            updated_at: now, // modified after last sync
            sync,
        };
        let contacts = Arc::new(FakeContactRepo {
            contacts: Mutex::new(vec![existing]),
        });
        let conflicts = Arc::new(FakeConflictRepo { conflicts: Mutex::new(Vec::new()) });
        let svc = service(contacts, conflicts.clone());

        let event = IngressEvent {
            board: BoardKind::Contacts,
            kind: IngressEventKind::Update,
            item_id: "item-1".into(),
            item_data: Some(json!({ "name": "New Name" })),
        };
        let outcome = svc.dispatch(&event).await.unwrap();
        assert_eq!(outcome, IngressOutcome::ConflictOpened);
        assert_eq!(conflicts.conflicts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_auto_resolved_by_rule_is_applied_to_the_stored_contact() {
        let now = Utc::now();
        let mut sync = SyncMetadata::new_unsynced();
        sync.mark_synced("item-1".into(), now - chrono::Duration::hours(1));
        let contact_id = ContactId::new();
        let existing = Contact {
            id: contact_id,
            name: "Old Name".into(),
            email: Some("old@example.com".into()),
            phone: None,
            phone_country: None,
            status: None,
            updated_at: now, // modified after last sync, so this would normally open a conflict
            sync,
        };
        let contacts = Arc::new(FakeContactRepo {
            contacts: Mutex::new(vec![existing]),
        });
        let conflicts = Arc::new(FakeConflictRepo { conflicts: Mutex::new(Vec::new()) });
        let rule = AutoResolutionRule {
            id: relayboard_domain::value_objects::RuleId::new(),
            name: "prefer external name".into(),
            entity_type: ConflictEntityType::Contact,
            field_name: "name".into(),
            preferred_source: relayboard_domain::entities::conflict::PreferredSource::External,
            is_enabled: true,
            priority: 0,
            created_by_id: None,
        };
        let svc = service_with_rules(contacts.clone(), conflicts.clone(), vec![rule]);

        let event = IngressEvent {
            board: BoardKind::Contacts,
            kind: IngressEventKind::Update,
            item_id: "item-1".into(),
            item_data: Some(json!({ "name": "New Name" })),
        };
        let outcome = svc.dispatch(&event).await.unwrap();

        assert_eq!(outcome, IngressOutcome::Updated);
        assert!(conflicts.conflicts.lock().unwrap().is_empty(), "no conflict should be opened");
        let stored = contacts.get(contact_id).await.unwrap();
        assert_eq!(stored.name, "New Name", "the rule's resolved value must be written back, not just returned");
    }

    #[tokio::test]
    async fn delete_unlinks_without_cascading() {
        let mut sync = SyncMetadata::new_unsynced();
        sync.mark_synced("item-1".into(), Utc::now());
        let existing = Contact {
            id: ContactId::new(),
            name: "Ada".into(),
            email: Some("ada@example.com".into()),
            phone: None,
            phone_country: None,
            status: None,
            updated_at: Utc::now(),
            sync,
        };
        let contacts = Arc::new(FakeContactRepo {
            contacts: Mutex::new(vec![existing]),
        });
        let conflicts = Arc::new(FakeConflictRepo { conflicts: Mutex::new(Vec::new()) });
        let svc = service(contacts.clone(), conflicts);

        let event = IngressEvent {
            board: BoardKind::Contacts,
            kind: IngressEventKind::Delete,
            item_id: "item-1".into(),
            item_data: None,
        };
        let outcome = svc.dispatch(&event).await.unwrap();
        assert_eq!(outcome, IngressOutcome::Unlinked);

        let stored = contacts.contacts.lock().unwrap();
        assert!(stored[0].sync.external_id.is_none());
        assert_eq!(stored.len(), 1, "record must still be present, not cascaded");
    }
}
