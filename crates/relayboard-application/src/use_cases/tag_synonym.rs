//! Tag synonym graph closure and merge (spec §4.8).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use relayboard_domain::entities::TagSynonym;
use relayboard_domain::error::Result;
use relayboard_domain::ports::TagRepository;
use relayboard_domain::value_objects::TagId;

/// Which originally-requested tag contributed each synonym, for search
/// metadata (spec §4.8 `expandTagIdsWithSynonyms`).
pub type OriginMap = HashMap<TagId, Vec<TagId>>;

/// Computes and mutates the undirected tag synonym graph (spec §4.8).
#[derive(Clone)]
pub struct TagSynonymService {
    tags: Arc<dyn TagRepository>,
}

impl TagSynonymService {
    /// Construct the service over its repository.
    #[must_use]
    pub fn new(tags: Arc<dyn TagRepository>) -> Self {
        Self { tags }
    }

    /// Return the synonym closure of `tag`, minus `tag` itself, via
    /// cycle-safe BFS over edges in either direction (spec §4.8 `getSynonyms`).
    pub async fn get_synonyms(&self, tag: TagId) -> Result<HashSet<TagId>> {
        let mut visited = HashSet::from([tag]);
        let mut queue = VecDeque::from([tag]);

        while let Some(current) = queue.pop_front() {
            for edge in self.tags.edges_touching(current).await? {
                if let Some(neighbor) = edge.neighbor_of(current) {
                    if visited.insert(neighbor) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        visited.remove(&tag);
        Ok(visited)
    }

    /// Expand `ids` to their full synonym closure, recording which of the
    /// originally-requested ids contributed each synonym
    /// (spec §4.8 `expandTagIdsWithSynonyms`).
    pub async fn expand_with_synonyms(&self, ids: &[TagId]) -> Result<(HashSet<TagId>, OriginMap)> {
        let mut expanded: HashSet<TagId> = ids.iter().copied().collect();
        let mut origin: OriginMap = HashMap::new();

        for &id in ids {
            let synonyms = self.get_synonyms(id).await?;
            if !synonyms.is_empty() {
                origin.insert(id, synonyms.iter().copied().collect());
            }
            expanded.extend(synonyms);
        }

        Ok((expanded, origin))
    }

    /// Merge `source` into `target`: transfer source's synonym edges
    /// (skipping duplicates), reassign project associations (skipping ones
    /// target already has), then delete source. Returns the count of
    /// projects whose association was moved (spec §4.8 `merge_tags`).
    ///
    /// # Errors
    ///
    /// Returns [`relayboard_domain::Error::invalid_argument`] if `source == target`.
    pub async fn merge_tags(&self, source: TagId, target: TagId) -> Result<u32> {
        if source == target {
            return Err(relayboard_domain::Error::invalid_argument(
                "merge source and target must differ",
            ));
        }

        let target_synonyms = self.tags.edges_touching(target).await?;
        let target_neighbors: HashSet<TagId> = target_synonyms
            .iter()
            .filter_map(|edge| edge.neighbor_of(target))
            .collect();

        for edge in self.tags.edges_touching(source).await? {
            let Some(neighbor) = edge.neighbor_of(source) else {
                continue;
            };
            if neighbor == target || target_neighbors.contains(&neighbor) {
                continue;
            }
            let new_edge = TagSynonym::new(target, neighbor, edge.confidence, edge.created_by.clone(), edge.created_at)?;
            self.tags.insert_edge(&new_edge).await?;
        }

        let project_ids = self.tags.project_ids_for_tag(source).await?;
        let mut moved = 0u32;
        for project_id in project_ids {
            self.tags.reassign_project_tag(project_id, source, target).await?;
            moved += 1;
        }

        self.tags.delete_tag(source).await?;
        Ok(moved)
    }
}
