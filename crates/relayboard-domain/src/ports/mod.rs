//! Ports (traits) implemented by the infrastructure layer, consumed by
//! the application layer (hexagonal boundary).

pub mod conflict;
pub mod document_queue;
pub mod integrations;
pub mod job_queue;
pub mod project;
pub mod search;
pub mod sync;
pub mod tag;

pub use conflict::{AutoResolutionRuleRepository, ConflictRepository};
pub use document_queue::{DocumentRepository, DocumentTaskRepository, EmbeddingService, StorageAdapter, TextExtractor};
pub use integrations::{DirectoryClient, JiraClient};
pub use job_queue::{HandlerResult, JobDedupKey, JobHandler, JobRepository, TickReport};
pub use project::ProjectRepository;
pub use search::{RankedIds, SearchFilters, SearchIndex, SortBy};
pub use sync::{
    BoardApiError, BoardClient, BoardItem, BoardItemPage, BoardSearchResult, ColumnValue, ContactRepository,
    OrganizationRepository, WebhookVerifier,
};
pub use tag::TagRepository;
