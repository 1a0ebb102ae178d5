//! Graph Engine
//!
//! Typed, weighted edges over memories with bounded-depth traversal. The
//! graph is reconstructed on demand from the edges table; memories never
//! hold references to their relationships.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::memory::{Memory, Relationship, RelationshipType, clamp_strength};
use crate::storage::Store;

/// Depth bounds for graph traversal
const MIN_DEPTH: u32 = 1;
const MAX_DEPTH: u32 = 5;
const DEFAULT_DEPTH: u32 = 2;
const DEFAULT_RELATED_LIMIT: usize = 10;

/// Input for creating an edge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateRelationshipInput {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: String,
    pub strength: Option<f64>,
    pub context: Option<String>,
}

/// An edge plus the memory on the far end
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedMemory {
    pub relationship: Relationship,
    pub memory: Memory,
}

/// One node in a traversal result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub memory: Memory,
    /// BFS distance from the root (root = 0)
    pub distance: u32,
}

/// Bounded-depth traversal result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMap {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<Relationship>,
    pub total_nodes: usize,
    pub total_edges: usize,
    pub max_depth: u32,
}

/// Read-mostly engine over the relationships table
#[derive(Clone)]
pub struct GraphEngine {
    store: Arc<Store>,
}

impl GraphEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Create a typed edge between two existing memories.
    pub fn create(&self, input: CreateRelationshipInput) -> Result<Relationship> {
        let Some(relationship_type) = RelationshipType::parse_name(&input.relationship_type)
        else {
            return Err(EngineError::BadRequest(format!(
                "unknown relationship type '{}'",
                input.relationship_type
            )));
        };
        if input.source_id == input.target_id {
            return Err(EngineError::BadRequest(
                "self-edges are not allowed".to_string(),
            ));
        }
        if !self.store.memory_exists(&input.source_id)? {
            return Err(EngineError::BadRequest(format!(
                "source memory {} does not exist",
                input.source_id
            )));
        }
        if !self.store.memory_exists(&input.target_id)? {
            return Err(EngineError::BadRequest(format!(
                "target memory {} does not exist",
                input.target_id
            )));
        }

        let relationship = Relationship {
            id: Uuid::new_v4().to_string(),
            source_id: input.source_id,
            target_id: input.target_id,
            relationship_type,
            strength: clamp_strength(input.strength),
            context: input.context,
            created_at: Utc::now(),
        };
        self.store.insert_relationship(&relationship)?;
        Ok(relationship)
    }

    /// Edges touching a memory in either direction, strongest first, with
    /// the opposite endpoint attached.
    pub fn find_related(
        &self,
        memory_id: &str,
        limit: Option<usize>,
        type_filter: Option<&str>,
    ) -> Result<Vec<RelatedMemory>> {
        if !self.store.memory_exists(memory_id)? {
            return Err(EngineError::NotFound(format!("memory {}", memory_id)));
        }
        let type_filter = match type_filter {
            Some(name) => Some(RelationshipType::parse_name(name).ok_or_else(|| {
                EngineError::BadRequest(format!("unknown relationship type '{}'", name))
            })?),
            None => None,
        };

        let edges = self.store.relationships_for(
            memory_id,
            type_filter,
            limit.unwrap_or(DEFAULT_RELATED_LIMIT),
        )?;

        let mut related = Vec::with_capacity(edges.len());
        for edge in edges {
            let opposite = if edge.source_id == memory_id {
                &edge.target_id
            } else {
                &edge.source_id
            };
            if let Some(memory) = self.store.get_memory(opposite)? {
                related.push(RelatedMemory {
                    relationship: edge,
                    memory,
                });
            }
        }
        Ok(related)
    }

    /// Breadth-first traversal from a root memory.
    ///
    /// Depth is clamped to 1..=5. Cycles are cut by a visited set; an edge
    /// into an already-visited node is still emitted when it falls inside
    /// the depth budget, the node is just not re-enqueued.
    pub fn map_graph(
        &self,
        root_id: &str,
        depth: Option<i64>,
        min_strength: Option<f64>,
        include_types: Option<&[String]>,
    ) -> Result<GraphMap> {
        let Some(root) = self.store.get_memory(root_id)? else {
            return Err(EngineError::NotFound(format!("memory {}", root_id)));
        };

        let max_depth = depth
            .map(|d| (d.max(MIN_DEPTH as i64) as u32).min(MAX_DEPTH))
            .unwrap_or(DEFAULT_DEPTH);

        let include_types: Option<Vec<RelationshipType>> = match include_types {
            Some(names) => {
                let mut parsed = Vec::with_capacity(names.len());
                for name in names {
                    parsed.push(RelationshipType::parse_name(name).ok_or_else(|| {
                        EngineError::BadRequest(format!("unknown relationship type '{}'", name))
                    })?);
                }
                Some(parsed)
            }
            None => None,
        };

        let mut nodes: Vec<GraphNode> = vec![GraphNode {
            memory: root,
            distance: 0,
        }];
        let mut visited: HashSet<String> = HashSet::from([root_id.to_string()]);
        let mut edges: Vec<Relationship> = Vec::new();
        let mut edges_seen: HashSet<String> = HashSet::new();

        let mut queue: VecDeque<(String, u32)> = VecDeque::from([(root_id.to_string(), 0)]);

        while let Some((current, distance)) = queue.pop_front() {
            if distance >= max_depth {
                continue;
            }

            let mut neighbors = self
                .store
                .relationships_for(&current, None, usize::MAX)?
                .into_iter()
                .filter(|edge| min_strength.is_none_or(|min| edge.strength >= min))
                .filter(|edge| {
                    include_types
                        .as_ref()
                        .is_none_or(|types| types.contains(&edge.relationship_type))
                })
                .collect::<Vec<_>>();

            // Deterministic visit order: strength desc, opposite id asc
            neighbors.sort_by(|a, b| {
                b.strength
                    .partial_cmp(&a.strength)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| opposite_of(a, &current).cmp(opposite_of(b, &current)))
            });

            for edge in neighbors {
                let opposite = opposite_of(&edge, &current).to_string();
                if edges_seen.insert(edge.id.clone()) {
                    edges.push(edge);
                }
                if !visited.contains(&opposite) {
                    if let Some(memory) = self.store.get_memory(&opposite)? {
                        visited.insert(opposite.clone());
                        nodes.push(GraphNode {
                            memory,
                            distance: distance + 1,
                        });
                        queue.push_back((opposite, distance + 1));
                    }
                }
            }
        }

        Ok(GraphMap {
            total_nodes: nodes.len(),
            total_edges: edges.len(),
            max_depth,
            nodes,
            edges,
        })
    }
}

fn opposite_of<'a>(edge: &'a Relationship, current: &str) -> &'a str {
    if edge.source_id == current {
        &edge.target_id
    } else {
        &edge.source_id
    }
}

// ============================================================================
// TESTS
// ============================================================================
