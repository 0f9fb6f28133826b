//! Postgres implementations of every domain repository port (spec §6).

pub mod conflict;
pub mod document_queue;
pub mod jobs;
pub mod project;
pub mod search;
pub mod sync;
pub mod tag;

pub use conflict::{PgAutoResolutionRuleRepository, PgConflictRepository};
pub use document_queue::{PgDocumentRepository, PgDocumentTaskRepository};
pub use jobs::PgJobRepository;
pub use project::PgProjectRepository;
pub use search::PgSearchIndex;
pub use sync::{PgContactRepository, PgOrganizationRepository};
pub use tag::PgTagRepository;
