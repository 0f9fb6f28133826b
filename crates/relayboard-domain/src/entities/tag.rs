//! Tags and the undirected synonym graph (spec §3 "Tag, TagSynonym", §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::TagId;

/// A label attached to projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    /// Unique identifier.
    pub id: TagId,
    /// Display name. Unique (spec §7 "duplicate tag name").
    pub name: String,
    /// Free-form category, e.g. "industry", "skill".
    pub tag_type: String,
}

/// An undirected edge in the tag synonym graph.
///
/// Self-edges (`tag_id == synonym_tag_id`) and duplicate edges (in either
/// direction) are forbidden by construction — see [`TagSynonym::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSynonym {
    /// One side of the undirected edge.
    pub tag_id: TagId,
    /// The other side of the undirected edge.
    pub synonym_tag_id: TagId,
    /// Confidence score for the synonym relationship, in `[0, 1]`.
    pub confidence: f64,
    /// Identifier of whoever created the edge.
    pub created_by: Option<String>,
    /// When the edge was created.
    pub created_at: DateTime<Utc>,
}

impl TagSynonym {
    /// Construct a new synonym edge, rejecting self-edges.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::invalid_argument`] if `tag_id == synonym_tag_id`.
    pub fn new(
        tag_id: TagId,
        synonym_tag_id: TagId,
        confidence: f64,
        created_by: Option<String>,
        now: DateTime<Utc>,
    ) -> crate::Result<Self> {
        if tag_id == synonym_tag_id {
            return Err(crate::Error::invalid_argument(
                "a tag cannot be a synonym of itself",
            ));
        }
        Ok(Self {
            tag_id,
            synonym_tag_id,
            confidence,
            created_by,
            created_at: now,
        })
    }

    /// Whether this edge connects the two given tags, in either direction
    /// (synonym edges are undirected; spec §3).
    #[must_use]
    pub fn connects(&self, a: TagId, b: TagId) -> bool {
        (self.tag_id == a && self.synonym_tag_id == b)
            || (self.tag_id == b && self.synonym_tag_id == a)
    }

    /// The neighbor of `from` across this edge, if `from` is one endpoint.
    #[must_use]
    pub fn neighbor_of(&self, from: TagId) -> Option<TagId> {
        if self.tag_id == from {
            Some(self.synonym_tag_id)
        } else if self.synonym_tag_id == from {
            Some(self.tag_id)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_edge_is_rejected() {
        let id = TagId::new();
        assert!(TagSynonym::new(id, id, 1.0, None, Utc::now()).is_err());
    }

    #[test]
    fn connects_is_direction_agnostic() {
        let a = TagId::new();
        let b = TagId::new();
        let edge = TagSynonym::new(a, b, 1.0, None, Utc::now()).unwrap();
        assert!(edge.connects(a, b));
        assert!(edge.connects(b, a));
    }
}
