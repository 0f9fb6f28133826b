//! Use-case services: the application layer's orchestration over domain ports.

pub mod conflict_service;
pub mod document_queue;
pub mod handler_registry;
pub mod hybrid_search;
pub mod job_handlers;
pub mod job_queue;
pub mod sync_egress;
pub mod sync_ingress;
pub mod tag_synonym;

pub use conflict_service::ConflictService;
pub use document_queue::DocumentQueueService;
pub use handler_registry::HandlerRegistry;
pub use hybrid_search::HybridSearchService;
pub use job_handlers::{
    BoardSyncHandler, BulkImportHandler, DirectoryGroupSyncHandler, EmbeddingGenerationHandler, JiraRefreshHandler,
};
pub use job_queue::JobQueueService;
pub use sync_egress::SyncEgressService;
pub use sync_ingress::SyncIngressService;
pub use tag_synonym::TagSynonymService;
