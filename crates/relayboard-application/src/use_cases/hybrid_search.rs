//! Hybrid search: RRF fusion over full-text and vector rankings, with
//! synonym-expanded tag filters (spec §4.6).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use relayboard_domain::entities::Project;
use relayboard_domain::error::Result;
use relayboard_domain::ports::{RankedIds, SearchFilters, SearchIndex, SortBy};
use relayboard_domain::value_objects::{ProjectId, TagId};

use super::tag_synonym::TagSynonymService;

/// RRF constant (spec §4.6 step 4, GLOSSARY "RRF").
const RRF_K: f64 = 60.0;

/// Metadata describing a synonym-expanded tag filter (spec §4.6 step 6).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SynonymMetadata {
    /// The tag ids the caller originally requested.
    pub original_tags: Vec<TagId>,
    /// The full expanded set actually used to filter.
    pub expanded_tags: Vec<TagId>,
    /// Which synonyms each original tag contributed.
    pub synonym_matches: HashMap<TagId, Vec<TagId>>,
}

/// A caller-supplied search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Full-text query. Empty triggers the filter-only path.
    pub query: String,
    /// Filter predicates.
    pub filters: SearchFilters,
    /// Whether to include document-text ranking and vector ranking.
    pub include_documents: bool,
    /// Whether to expand the tag filter through the synonym graph.
    pub expand_synonyms: bool,
    /// Result ordering.
    pub sort_by: SortBy,
    /// Page size.
    pub limit: u32,
    /// Page offset.
    pub offset: u32,
}

/// Search results plus synonym-expansion metadata, if applicable.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    /// Matching projects, in final sorted order.
    pub projects: Vec<Project>,
    /// Present only when synonym expansion ran (spec §4.6 step 6).
    pub synonym_metadata: Option<SynonymMetadata>,
}

/// Orchestrates the hybrid search algorithm (spec §4.6).
#[derive(Clone)]
pub struct HybridSearchService {
    index: Arc<dyn SearchIndex>,
    tags: Arc<TagSynonymService>,
    embed_query: Arc<dyn Fn(&str) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<Vec<f32>>>> + Send>> + Send + Sync>,
}

impl HybridSearchService {
    /// Construct the service. `embed_query` embeds the search string for
    /// vector ranking; it is a thin closure over the embedding-service port
    /// so this module does not depend on the document-queue port directly.
    #[must_use]
    pub fn new(
        index: Arc<dyn SearchIndex>,
        tags: Arc<TagSynonymService>,
        embed_query: Arc<
            dyn Fn(&str) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<Vec<f32>>>> + Send>> + Send + Sync,
        >,
    ) -> Self {
        Self { index, tags, embed_query }
    }

    /// Run a search request end to end (spec §4.6 steps 1-6).
    pub async fn search(&self, mut request: SearchRequest) -> Result<SearchResponse> {
        let mut synonym_metadata = None;

        if request.expand_synonyms && !request.filters.tag_ids.is_empty() {
            let (expanded, origin) = self.tags.expand_with_synonyms(&request.filters.tag_ids).await?;
            synonym_metadata = Some(SynonymMetadata {
                original_tags: request.filters.tag_ids.clone(),
                expanded_tags: expanded.iter().copied().collect(),
                synonym_matches: origin,
            });
            request.filters.tag_ids = expanded.into_iter().collect();
        }

        if request.query.trim().is_empty() {
            // Filter-only path (spec §4.6 step 1, spec §8 boundary behavior).
            let projects = self
                .index
                .list_filtered(&request.filters, request.sort_by, request.limit, request.offset)
                .await?;
            return Ok(SearchResponse {
                projects,
                synonym_metadata,
            });
        }

        let rank_p_fut = self.index.rank_by_project_text(&request.query, &request.filters);
        let rank_d_fut = self.rank_documents(&request);
        let rank_v_fut = self.rank_vectors(&request);

        let (rank_p, rank_d, rank_v) = tokio::try_join!(rank_p_fut, rank_d_fut, rank_v_fut)?;

        let fused = fuse_rrf(&[rank_p, rank_d, rank_v]);

        let projects = match request.sort_by {
            SortBy::Relevance => {
                let mut ids: Vec<ProjectId> = fused.iter().map(|(id, _)| *id).collect();
                ids.sort_by(|a, b| {
                    let score_a = fused.iter().find(|(id, _)| id == a).map(|(_, s)| *s).unwrap_or(0.0);
                    let score_b = fused.iter().find(|(id, _)| id == b).map(|(_, s)| *s).unwrap_or(0.0);
                    score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
                });
                let window: Vec<ProjectId> = ids
                    .into_iter()
                    .skip(request.offset as usize)
                    .take(request.limit as usize)
                    .collect();
                self.index.fetch_by_ids_in_order(&window).await?
            }
            other => {
                let ids: Vec<ProjectId> = fused.iter().map(|(id, _)| *id).collect();
                self.index.fetch_by_ids_sorted(&ids, other, request.limit, request.offset).await?
            }
        };

        Ok(SearchResponse {
            projects,
            synonym_metadata,
        })
    }

    async fn rank_documents(&self, request: &SearchRequest) -> Result<RankedIds> {
        if !request.include_documents {
            return Ok(Vec::new());
        }
        self.index.rank_by_document_text(&request.query, &request.filters).await
    }

    async fn rank_vectors(&self, request: &SearchRequest) -> Result<RankedIds> {
        if !request.include_documents {
            return Ok(Vec::new());
        }
        // Short-circuit: never call the embedding service if nothing is
        // embedded yet (spec §4.6 step 3, spec §8 boundary behavior).
        if !self.index.any_chunk_embedded().await? {
            return Ok(Vec::new());
        }
        let Some(embedding) = (self.embed_query)(&request.query).await? else {
            return Ok(Vec::new());
        };
        self.index.rank_by_vector_similarity(&embedding, &request.filters).await
    }
}

/// Fuse multiple rankings by reciprocal rank (spec §4.6 step 4,
/// GLOSSARY "RRF"): `score = Σ 1/(K + rank)`, missing rankings contribute 0.
fn fuse_rrf(rankings: &[RankedIds]) -> Vec<(ProjectId, f64)> {
    let mut scores: HashMap<ProjectId, f64> = HashMap::new();
    let mut order: Vec<ProjectId> = Vec::new();
    let mut seen: HashSet<ProjectId> = HashSet::new();

    for ranking in rankings {
        for (idx, &id) in ranking.iter().enumerate() {
            let rank = idx + 1;
            *scores.entry(id).or_insert(0.0) += 1.0 / (RRF_K + rank as f64);
            if seen.insert(id) {
                order.push(id);
            }
        }
    }

    order.into_iter().map(|id| (id, scores[&id])).collect()
}
