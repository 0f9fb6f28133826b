//! Searchable entities: projects, documents, and document chunks
//! (spec §3 "Project, Document, DocumentChunk", §4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ChunkId, DocumentId, OrganizationId, ProjectId, TagId};

/// A searchable project. `search_vector` is a precomputed full-text
/// document maintained by the infrastructure layer on write; the domain
/// only knows whether one is present, not its tsvector representation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier.
    pub id: ProjectId,
    /// Display name.
    pub name: String,
    /// Free-text status label, used as a search filter facet.
    pub status: Option<String>,
    /// Owning organization, if any.
    pub organization_id: Option<OrganizationId>,
    /// Owning user/contact identifier, as an opaque string.
    pub owner_id: Option<String>,
    /// Project start date, if scheduled.
    pub start_date: Option<DateTime<Utc>>,
    /// Tags attached to this project.
    pub tag_ids: Vec<TagId>,
    /// When the project was last modified.
    pub updated_at: DateTime<Utc>,
    /// Whether a full-text search vector has been computed for this row.
    pub has_search_vector: bool,
}

/// A document attached to a project, processed by the document-processing
/// queue (spec §4.2) into searchable chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier.
    pub id: DocumentId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Original filename, as supplied on upload.
    pub filename: String,
    /// MIME type, used to select a text extractor.
    pub mime_type: String,
    /// Opaque storage-adapter handle for the raw bytes.
    pub storage_id: String,
    /// Extracted plain text, set once the extract stage completes.
    pub extracted_text: Option<String>,
    /// When the document was uploaded.
    pub created_at: DateTime<Utc>,
    /// Whether a full-text search vector has been computed for this row.
    pub has_search_vector: bool,
}

/// A chunk of a document's extracted text, optionally embedded.
///
/// Invariant: chunks for a document are consecutively indexed from 0; the
/// embedding is absent iff the chunk has not yet been embedded (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Unique identifier.
    pub id: ChunkId,
    /// Owning document.
    pub document_id: DocumentId,
    /// Zero-based position of this chunk within the document.
    pub chunk_index: u32,
    /// The chunk's text content.
    pub content: String,
    /// Vector embedding, if embedding succeeded.
    pub embedding: Option<Vec<f32>>,
}

impl DocumentChunk {
    /// Whether this chunk participates in vector ranking (spec §4.2 step 5:
    /// failed embeddings persist as chunks without vectors, remaining
    /// full-text searchable but excluded from vector ranking).
    #[must_use]
    pub fn is_vector_searchable(&self) -> bool {
        self.embedding.is_some()
    }
}

/// Target chunk size in characters (spec §4.2: ≈512 tokens, ~4 chars/token).
pub const TARGET_CHUNK_CHARS: usize = 512 * 4;

/// Chunk overlap in characters (spec §4.2: ≈12% overlap).
pub const CHUNK_OVERLAP_CHARS: usize = TARGET_CHUNK_CHARS * 12 / 100;
