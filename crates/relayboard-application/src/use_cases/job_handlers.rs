//! Concrete [`JobHandler`] implementations for the handlers this system
//! ships with (spec §4.1 "Handlers specified by this system"). Document
//! processing is not among them — it runs its own lifecycle through
//! [`super::document_queue::DocumentQueueService`], not the generic job queue.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value as Json};

use relayboard_domain::entities::{DocumentChunk, Job, Project};
use relayboard_domain::error::{Error, Result};
use relayboard_domain::ports::{
    BoardClient, DirectoryClient, DocumentRepository, EmbeddingService, JiraClient, JobHandler, ProjectRepository,
};
use relayboard_domain::value_objects::{ChunkId, ProjectId, TagId};

use super::sync_ingress::{BoardKind, IngressEvent, IngressEventKind, SyncIngressService};

/// Walks a board's items via cursored pagination and upserts them locally
/// by replaying each page through [`SyncIngressService`] as a synthetic
/// create event (spec §4.1 table "Board sync (contacts / organizations)",
/// spec §4.4 ingress semantics).
pub struct BoardSyncHandler {
    board_client: Arc<dyn BoardClient>,
    ingress: Arc<SyncIngressService>,
    board_id: String,
    kind: BoardKind,
}

impl BoardSyncHandler {
    /// Construct a handler that walks `board_id`, dispatching events of `kind`.
    #[must_use]
    pub fn new(board_client: Arc<dyn BoardClient>, ingress: Arc<SyncIngressService>, board_id: String, kind: BoardKind) -> Self {
        Self { board_client, ingress, board_id, kind }
    }
}

#[async_trait::async_trait]
impl JobHandler for BoardSyncHandler {
    async fn handle(&self, _job: &Job) -> Result<Option<Json>> {
        let mut cursor = None;
        let mut walked = 0u32;
        loop {
            let page = self
                .board_client
                .get_board_items(&self.board_id, cursor.as_deref())
                .await
                .map_err(|e| Error::network(format!("board sync: {e}")))?;

            for item in &page.items {
                let Some(item_id) = item.get("id").and_then(Json::as_str) else {
                    continue;
                };
                let event = IngressEvent {
                    board: self.kind,
                    kind: IngressEventKind::Create,
                    item_id: item_id.to_owned(),
                    item_data: Some(item.clone()),
                };
                self.ingress.dispatch(&event).await?;
                walked += 1;
            }

            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        Ok(Some(json!({ "items_walked": walked })))
    }
}

/// For documents with extracted text but no chunks yet, chunk and embed
/// them (spec §4.1 table "Embedding generation").
pub struct EmbeddingGenerationHandler {
    documents: Arc<dyn DocumentRepository>,
    embeddings: Arc<dyn EmbeddingService>,
}

impl EmbeddingGenerationHandler {
    /// Default batch size when the job payload doesn't specify one.
    const DEFAULT_BATCH: u32 = 50;

    /// Construct a handler over the document repository and embedding service.
    #[must_use]
    pub fn new(documents: Arc<dyn DocumentRepository>, embeddings: Arc<dyn EmbeddingService>) -> Self {
        Self { documents, embeddings }
    }
}

#[async_trait::async_trait]
impl JobHandler for EmbeddingGenerationHandler {
    async fn handle(&self, job: &Job) -> Result<Option<Json>> {
        let limit = job.payload.get("limit").and_then(Json::as_u64).map_or(Self::DEFAULT_BATCH, |n| n as u32);
        let documents = self.documents.list_pending_embedding(limit).await?;

        let mut embedded = 0u32;
        for document in &documents {
            let Some(text) = document.extracted_text.as_deref() else {
                continue;
            };
            let chunk_texts = self.embeddings.chunk_text(text).await?;
            let mut chunks = Vec::with_capacity(chunk_texts.len());
            for (index, content) in chunk_texts.into_iter().enumerate() {
                let embedding = self.embeddings.embed(&content).await.unwrap_or(None);
                chunks.push(DocumentChunk {
                    id: ChunkId::new(),
                    document_id: document.id,
                    chunk_index: index as u32,
                    content,
                    embedding,
                });
            }
            self.documents.replace_chunks(document.id, &chunks).await?;
            embedded += 1;
        }

        Ok(Some(json!({ "documents_embedded": embedded })))
    }
}

/// A single row of a bulk-import request, as supplied in the job payload.
#[derive(Debug, Clone, serde::Deserialize)]
struct ImportRow {
    name: String,
    status: Option<String>,
    organization_id: Option<uuid::Uuid>,
    owner_id: Option<String>,
    start_date: Option<chrono::DateTime<Utc>>,
    #[serde(default)]
    tag_ids: Vec<uuid::Uuid>,
}

/// Validates and materializes a list of import rows into projects,
/// returning a per-row result (spec §4.1 table "Bulk-import").
pub struct BulkImportHandler {
    projects: Arc<dyn ProjectRepository>,
}

impl BulkImportHandler {
    /// Construct a handler over the project repository.
    #[must_use]
    pub fn new(projects: Arc<dyn ProjectRepository>) -> Self {
        Self { projects }
    }
}

#[async_trait::async_trait]
impl JobHandler for BulkImportHandler {
    async fn handle(&self, job: &Job) -> Result<Option<Json>> {
        let rows: Vec<Json> = job
            .payload
            .get("rows")
            .and_then(Json::as_array)
            .cloned()
            .ok_or_else(|| Error::invalid_argument("bulk-import payload missing \"rows\" array"))?;

        let mut results = Vec::with_capacity(rows.len());
        for raw in rows {
            let parsed: std::result::Result<ImportRow, _> = serde_json::from_value(raw);
            let row = match parsed {
                Ok(row) => row,
                Err(e) => {
                    results.push(json!({ "ok": false, "error": format!("invalid row: {e}") }));
                    continue;
                }
            };
            if row.name.trim().is_empty() {
                results.push(json!({ "ok": false, "error": "name is required" }));
                continue;
            }

            let now = Utc::now();
            let project = Project {
                id: ProjectId::new(),
                name: row.name,
                status: row.status,
                organization_id: row.organization_id.map(relayboard_domain::value_objects::OrganizationId::from_uuid),
                owner_id: row.owner_id,
                start_date: row.start_date,
                tag_ids: row.tag_ids.into_iter().map(TagId::from_uuid).collect(),
                updated_at: now,
                has_search_vector: false,
            };
            let project_id = project.id;
            match self.projects.upsert(&project).await {
                Ok(()) => results.push(json!({ "ok": true, "project_id": project_id })),
                Err(e) => results.push(json!({ "ok": false, "error": e.to_string() })),
            }
        }

        Ok(Some(json!({ "results": results })))
    }
}

/// A single cached Jira link to refresh, as supplied in the job payload.
#[derive(Debug, Clone, serde::Deserialize)]
struct JiraLink {
    issue_key: String,
    project_id: uuid::Uuid,
}

/// Refreshes stale cached Jira statuses onto their linked projects'
/// `status` field (spec §4.1 table "Jira-refresh"). The set of links to
/// refresh — i.e. which ones have exceeded the cache TTL — is computed by
/// the caller enqueueing this job; this crate has no durable Jira-link
/// table of its own.
pub struct JiraRefreshHandler {
    jira: Arc<dyn JiraClient>,
    projects: Arc<dyn ProjectRepository>,
}

impl JiraRefreshHandler {
    /// Construct a handler over the Jira client and project repository.
    #[must_use]
    pub fn new(jira: Arc<dyn JiraClient>, projects: Arc<dyn ProjectRepository>) -> Self {
        Self { jira, projects }
    }
}

#[async_trait::async_trait]
impl JobHandler for JiraRefreshHandler {
    async fn handle(&self, job: &Job) -> Result<Option<Json>> {
        let links: Vec<JiraLink> = job
            .payload
            .get("links")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| Error::invalid_argument(format!("jira-refresh payload malformed: {e}")))?
            .unwrap_or_default();

        let mut refreshed = 0u32;
        let mut results = Vec::with_capacity(links.len());
        for link in links {
            let status = match self.jira.fetch_status(&link.issue_key).await {
                Ok(status) => status,
                Err(e) => {
                    results.push(json!({ "issue_key": link.issue_key, "ok": false, "error": e.to_string() }));
                    continue;
                }
            };

            let project_id = ProjectId::from_uuid(link.project_id);
            let mut project = self.projects.get(project_id).await?;
            project.status = Some(status.clone());
            project.updated_at = Utc::now();
            self.projects.upsert(&project).await?;

            refreshed += 1;
            results.push(json!({ "issue_key": link.issue_key, "ok": true, "status": status }));
        }

        Ok(Some(json!({ "links_refreshed": refreshed, "results": results })))
    }
}

/// For a single team, reconciles its locally-recorded members against a
/// directory group's membership (spec §4.1 table "Directory-group sync").
/// Team/member persistence is out of scope for this system's implemented
/// entities, so the diff is returned as the job result for the caller to
/// apply, rather than written back here.
pub struct DirectoryGroupSyncHandler {
    directory: Arc<dyn DirectoryClient>,
}

impl DirectoryGroupSyncHandler {
    /// Construct a handler over the directory client.
    #[must_use]
    pub fn new(directory: Arc<dyn DirectoryClient>) -> Self {
        Self { directory }
    }
}

#[async_trait::async_trait]
impl JobHandler for DirectoryGroupSyncHandler {
    async fn handle(&self, job: &Job) -> Result<Option<Json>> {
        let group_id = job
            .payload
            .get("group_id")
            .and_then(Json::as_str)
            .ok_or_else(|| Error::invalid_argument("directory-group-sync payload missing \"group_id\""))?;
        let current: Vec<String> = job
            .payload
            .get("current_member_ids")
            .and_then(Json::as_array)
            .map(|arr| arr.iter().filter_map(Json::as_str).map(ToOwned::to_owned).collect())
            .unwrap_or_default();

        let directory_members = self.directory.list_group_members(group_id).await?;

        let added: Vec<&String> = directory_members.iter().filter(|m| !current.contains(m)).collect();
        let removed: Vec<&String> = current.iter().filter(|m| !directory_members.contains(m)).collect();

        Ok(Some(json!({
            "group_id": group_id,
            "added": added,
            "removed": removed,
            "member_count": directory_members.len(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use relayboard_domain::entities::conflict::ConflictEntityType;
    use relayboard_domain::entities::{AutoResolutionRule, Contact, Document, Organization, SyncConflict};
    use relayboard_domain::ports::{
        AutoResolutionRuleRepository, BoardApiError, BoardItemPage, ConflictRepository, ContactRepository,
        OrganizationRepository,
    };
    use relayboard_domain::value_objects::{ConflictId, ContactId, DocumentId, OrganizationId};

    use super::*;

    struct FakeContactRepo {
        contacts: Mutex<Vec<Contact>>,
    }

    #[async_trait]
    impl ContactRepository for FakeContactRepo {
        async fn get(&self, id: ContactId) -> Result<Contact> {
            self.contacts.lock().unwrap().iter().find(|c| c.id == id).cloned().ok_or_else(|| Error::not_found(format!("contact {id}")))
        }
        async fn find_by_external_id(&self, external_id: &str) -> Result<Option<Contact>> {
            Ok(self.contacts.lock().unwrap().iter().find(|c| c.sync.external_id.as_deref() == Some(external_id)).cloned())
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

    struct FakeOrgRepo;

    #[async_trait]
    impl OrganizationRepository for FakeOrgRepo {
        async fn get(&self, id: OrganizationId) -> Result<Organization> {
            Err(Error::not_found(format!("organization {id}")))
        }
        async fn find_by_external_id(&self, _external_id: &str) -> Result<Option<Organization>> {
            Ok(None)
        }
        async fn upsert(&self, _organization: &Organization) -> Result<()> {
            Ok(())
        }
        async fn list_pending_egress(&self, _limit: u32) -> Result<Vec<Organization>> {
            Ok(Vec::new())
        }
    }

    struct FakeConflictRepo;

    #[async_trait]
    impl ConflictRepository for FakeConflictRepo {
        async fn insert(&self, _conflict: &SyncConflict) -> Result<()> {
            Ok(())
        }
        async fn get(&self, id: ConflictId) -> Result<SyncConflict> {
            Err(Error::not_found(format!("conflict {id}")))
        }
        async fn list_unresolved(&self, _entity_type: Option<ConflictEntityType>) -> Result<Vec<SyncConflict>> {
            Ok(Vec::new())
        }
        async fn update(&self, _conflict: &SyncConflict) -> Result<()> {
            Ok(())
        }
    }

    struct FakeRuleRepo;

    #[async_trait]
    impl AutoResolutionRuleRepository for FakeRuleRepo {
        async fn list_enabled_for_entity(&self, _entity_type: ConflictEntityType) -> Result<Vec<AutoResolutionRule>> {
            Ok(Vec::new())
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

    struct FakeBoardClient {
        pages: Mutex<std::collections::VecDeque<BoardItemPage>>,
    }

    #[async_trait]
    impl BoardClient for FakeBoardClient {
        async fn create_item(
            &self,
            _board: &str,
            _name: &str,
            _column_values: Option<&Json>,
            _group: Option<&str>,
        ) -> std::result::Result<relayboard_domain::ports::BoardItem, BoardApiError> {
            unimplemented!("not exercised by board-sync")
        }
        async fn update_item(&self, _board: &str, _item: &str, _column_values: &Json) -> std::result::Result<(), BoardApiError> {
            unimplemented!("not exercised by board-sync")
        }
        async fn delete_item(&self, _item: &str) -> std::result::Result<(), BoardApiError> {
            unimplemented!("not exercised by board-sync")
        }
        async fn get_board_items(&self, _board: &str, _cursor: Option<&str>) -> std::result::Result<BoardItemPage, BoardApiError> {
            self.pages.lock().unwrap().pop_front().ok_or(BoardApiError::NotFound("no more pages".to_owned()))
        }
        async fn search_contacts(
            &self,
            _board: &str,
            _query: &str,
            _columns: Option<&[String]>,
            _limit: Option<u32>,
        ) -> std::result::Result<relayboard_domain::ports::BoardSearchResult, BoardApiError> {
            unimplemented!("not exercised by board-sync")
        }
    }

    #[tokio::test]
    async fn board_sync_walks_every_page_and_upserts_via_ingress() {
        let board = Arc::new(FakeBoardClient {
            pages: Mutex::new(std::collections::VecDeque::from([
                BoardItemPage {
                    items: vec![json!({ "id": "item-1", "name": "Ada", "email": "ada@example.com" })],
                    next_cursor: Some("cursor-2".to_owned()),
                },
                BoardItemPage {
                    items: vec![json!({ "id": "item-2", "name": "No Email" })],
                    next_cursor: None,
                },
            ])),
        });
        let contacts = Arc::new(FakeContactRepo { contacts: Mutex::new(Vec::new()) });
        let egress = Arc::new(super::super::sync_egress::SyncEgressService::new(
            Arc::new(FakeBoardClient { pages: Mutex::new(std::collections::VecDeque::new()) }),
            contacts.clone(),
            Arc::new(FakeOrgRepo),
            super::super::sync_egress::BoardTargets::default(),
        ));
        let conflict_service = Arc::new(ConflictService::new(
            Arc::new(FakeConflictRepo),
            Arc::new(FakeRuleRepo),
            contacts.clone(),
            Arc::new(FakeOrgRepo),
            egress,
        ));
        let ingress = Arc::new(SyncIngressService::new(contacts.clone(), Arc::new(FakeOrgRepo), Arc::new(FakeConflictRepo), conflict_service));
        let handler = BoardSyncHandler::new(board, ingress, "board-1".to_owned(), BoardKind::Contacts);

        let job = job_with_payload(json!({}));
        let result = handler.handle(&job).await.unwrap().unwrap();

        assert_eq!(result["items_walked"], json!(2));
        let stored = contacts.contacts.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].email.as_deref(), Some("ada@example.com"));
    }

    struct FakeProjectRepo {
        projects: Mutex<Vec<Project>>,
    }

    #[async_trait]
    impl ProjectRepository for FakeProjectRepo {
        async fn get(&self, id: ProjectId) -> Result<Project> {
            self.projects
                .lock()
                .unwrap()
                .iter()
                .find(|p| p.id == id)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("project {id}")))
        }

        async fn upsert(&self, project: &Project) -> Result<()> {
            let mut guard = self.projects.lock().unwrap();
            if let Some(slot) = guard.iter_mut().find(|p| p.id == project.id) {
                *slot = project.clone();
            } else {
                guard.push(project.clone());
            }
            Ok(())
        }
    }

    struct FakeJiraClient {
        status: &'static str,
    }

    #[async_trait]
    impl JiraClient for FakeJiraClient {
        async fn fetch_status(&self, _issue_key: &str) -> Result<String> {
            Ok(self.status.to_owned())
        }
    }

    struct FakeDirectoryClient {
        members: Vec<String>,
    }

    #[async_trait]
    impl DirectoryClient for FakeDirectoryClient {
        async fn list_group_members(&self, _group_id: &str) -> Result<Vec<String>> {
            Ok(self.members.clone())
        }
    }

    fn new_project(name: &str) -> Project {
        Project {
            id: ProjectId::new(),
            name: name.to_owned(),
            status: None,
            organization_id: None,
            owner_id: None,
            start_date: None,
            tag_ids: Vec::new(),
            updated_at: Utc::now(),
            has_search_vector: false,
        }
    }

    fn job_with_payload(payload: Json) -> Job {
        Job::new_pending(
            relayboard_domain::entities::JobType::BulkImport,
            None,
            payload,
            0,
            5,
            None,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn bulk_import_rejects_blank_name_but_keeps_other_rows() {
        let projects = Arc::new(FakeProjectRepo { projects: Mutex::new(Vec::new()) });
        let handler = BulkImportHandler::new(projects.clone());

        let job = job_with_payload(json!({
            "rows": [
                { "name": "" },
                { "name": "Valid Project" },
            ]
        }));

        let result = handler.handle(&job).await.unwrap().unwrap();
        let results = result["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["ok"], json!(false));
        assert_eq!(results[1]["ok"], json!(true));
        assert_eq!(projects.projects.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn jira_refresh_writes_status_onto_linked_project() {
        let project = new_project("Migrate billing");
        let project_id = project.id;
        let projects = Arc::new(FakeProjectRepo { projects: Mutex::new(vec![project]) });
        let jira = Arc::new(FakeJiraClient { status: "In Progress" });
        let handler = JiraRefreshHandler::new(jira, projects.clone());

        let job = job_with_payload(json!({
            "links": [{ "issue_key": "PROJ-1", "project_id": project_id.inner() }]
        }));

        let result = handler.handle(&job).await.unwrap().unwrap();
        assert_eq!(result["links_refreshed"], json!(1));
        let updated = projects.get(project_id).await.unwrap();
        assert_eq!(updated.status.as_deref(), Some("In Progress"));
    }

    #[tokio::test]
    async fn directory_group_sync_returns_added_and_removed_diff_without_persisting() {
        let directory = Arc::new(FakeDirectoryClient {
            members: vec!["alice".to_owned(), "bob".to_owned()],
        });
        let handler = DirectoryGroupSyncHandler::new(directory);

        let job = job_with_payload(json!({
            "group_id": "eng",
            "current_member_ids": ["bob", "carol"],
        }));

        let result = handler.handle(&job).await.unwrap().unwrap();
        assert_eq!(result["added"], json!(["alice"]));
        assert_eq!(result["removed"], json!(["carol"]));
        assert_eq!(result["member_count"], json!(2));
    }

    struct FakeDocumentRepo {
        documents: Vec<Document>,
        chunks_written: Mutex<Vec<(DocumentId, usize)>>,
    }

    #[async_trait]
    impl DocumentRepository for FakeDocumentRepo {
        async fn get(&self, id: DocumentId) -> Result<Document> {
            self.documents.iter().find(|d| d.id == id).cloned().ok_or_else(|| Error::not_found(format!("document {id}")))
        }

        async fn save_extracted_text(&self, _id: DocumentId, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn replace_chunks(&self, document_id: DocumentId, chunks: &[DocumentChunk]) -> Result<()> {
            self.chunks_written.lock().unwrap().push((document_id, chunks.len()));
            Ok(())
        }

        async fn list_pending_embedding(&self, limit: u32) -> Result<Vec<Document>> {
            Ok(self.documents.iter().take(limit as usize).cloned().collect())
        }
    }

    struct FakeEmbeddingService;

    #[async_trait]
    impl EmbeddingService for FakeEmbeddingService {
        async fn embed(&self, _text: &str) -> Result<Option<Vec<f32>>> {
            Ok(Some(vec![0.1, 0.2]))
        }

        async fn chunk_text(&self, text: &str) -> Result<Vec<String>> {
            Ok(text.split(". ").map(ToOwned::to_owned).collect())
        }
    }

    #[tokio::test]
    async fn embedding_generation_chunks_and_embeds_pending_documents() {
        use relayboard_domain::value_objects::ProjectId as PId;

        let document = Document {
            id: DocumentId::new(),
            project_id: PId::new(),
            filename: "notes.txt".to_owned(),
            mime_type: "text/plain".to_owned(),
            storage_id: "proj/abc".to_owned(),
            extracted_text: Some("First sentence. Second sentence.".to_owned()),
            created_at: Utc::now(),
            has_search_vector: false,
        };
        let document_id = document.id;
        let documents = Arc::new(FakeDocumentRepo {
            documents: vec![document],
            chunks_written: Mutex::new(Vec::new()),
        });
        let handler = EmbeddingGenerationHandler::new(documents.clone(), Arc::new(FakeEmbeddingService));

        let job = job_with_payload(json!({}));
        let result = handler.handle(&job).await.unwrap().unwrap();

        assert_eq!(result["documents_embedded"], json!(1));
        let written = documents.chunks_written.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0], (document_id, 2));
    }
}
