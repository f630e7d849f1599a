//! Traceability graph built on petgraph.
//!
//! Nodes are requirements, edges are relationships. Directional
//! relationships become a single source → target edge; bidirectional ones
//! also get the mirrored edge, so the adjacency of either end lists the
//! other. Cycles are kept as data; every traversal here tracks visited nodes.

use crate::cancel::CancellationToken;
use crate::domain::{
    Provenance, Relationship, RelationshipId, RelationshipType, Requirement, RequirementId,
};
use crate::error::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Edge payload: which relationship produced the edge
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeData {
    /// Relationship the edge was derived from
    pub relationship_id: RelationshipId,

    /// Relationship type
    pub relationship_type: RelationshipType,

    /// Relationship confidence
    pub confidence: f64,

    /// Relationship provenance
    pub provenance: Provenance,

    /// True for the target → source mirror of a bidirectional relationship
    pub mirrored: bool,
}

/// One cell entry of the adjacency map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjacentEdge {
    /// Neighbor reached by the edge
    pub requirement_id: RequirementId,

    /// Relationship the edge was derived from
    pub relationship_id: RelationshipId,

    /// Relationship type
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,

    /// Relationship confidence
    pub confidence: f64,
}

/// A requirement reached by breadth-first traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reached {
    /// Requirement reached
    pub requirement_id: RequirementId,

    /// Hop count from the root (>= 1)
    pub depth: usize,

    /// Type of the edge that first reached the requirement
    pub via: RelationshipType,
}

/// Read-only traceability graph for one matrix snapshot.
#[derive(Debug, Clone, Default)]
pub struct TraceGraph {
    graph: DiGraph<RequirementId, EdgeData>,
    node_map: HashMap<RequirementId, NodeIndex>,
}

impl TraceGraph {
    /// Build the graph.
    ///
    /// Relationships referencing requirements outside `requirements` are
    /// skipped with a warning.
    #[must_use]
    pub fn build(requirements: &[Requirement], relationships: &[Relationship]) -> Self {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        for requirement in requirements {
            node_map
                .entry(requirement.id.clone())
                .or_insert_with(|| graph.add_node(requirement.id.clone()));
        }

        let mut skipped = 0usize;
        for relationship in relationships {
            let (Some(&source), Some(&target)) = (
                node_map.get(&relationship.source_requirement_id),
                node_map.get(&relationship.target_requirement_id),
            ) else {
                skipped += 1;
                warn!(
                    relationship = %relationship.id,
                    source = %relationship.source_requirement_id,
                    target = %relationship.target_requirement_id,
                    "Skipping relationship with unknown endpoint"
                );
                continue;
            };

            let data = EdgeData {
                relationship_id: relationship.id.clone(),
                relationship_type: relationship.relationship_type,
                confidence: relationship.confidence,
                provenance: relationship.provenance,
                mirrored: false,
            };
            if relationship.bidirectional && source != target {
                graph.add_edge(
                    target,
                    source,
                    EdgeData {
                        mirrored: true,
                        ..data.clone()
                    },
                );
            }
            graph.add_edge(source, target, data);
        }

        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            skipped,
            "Built traceability graph"
        );
        Self { graph, node_map }
    }

    /// Number of requirements in the graph
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of directed edges, counting bidirectional relationships twice
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether the requirement is a node of the graph
    #[must_use]
    pub fn contains(&self, id: &RequirementId) -> bool {
        self.node_map.contains_key(id)
    }

    /// Requirement-keyed adjacency map.
    ///
    /// Every requirement has an entry, possibly empty. Cells are sorted by
    /// neighbor id then relationship id.
    #[must_use]
    pub fn adjacency(&self) -> BTreeMap<RequirementId, Vec<AdjacentEdge>> {
        self.node_map
            .iter()
            .map(|(id, &node)| (id.clone(), self.cell(node)))
            .collect()
    }

    /// Outgoing edges of `id`, or `None` if the requirement is unknown.
    #[must_use]
    pub fn neighbors(&self, id: &RequirementId) -> Option<Vec<AdjacentEdge>> {
        self.node_map.get(id).map(|&node| self.cell(node))
    }

    fn cell(&self, node: NodeIndex) -> Vec<AdjacentEdge> {
        let mut cell: Vec<AdjacentEdge> = self
            .graph
            .edges(node)
            .map(|edge| AdjacentEdge {
                requirement_id: self.graph[edge.target()].clone(),
                relationship_id: edge.weight().relationship_id.clone(),
                relationship_type: edge.weight().relationship_type,
                confidence: edge.weight().confidence,
            })
            .collect();
        cell.sort_by(|a, b| {
            a.requirement_id
                .cmp(&b.requirement_id)
                .then_with(|| a.relationship_id.cmp(&b.relationship_id))
        });
        cell
    }

    /// Breadth-first traversal from `root`, bounded by `max_depth` hops.
    ///
    /// Returns every reached requirement once, in BFS order, with its hop
    /// depth. The root itself is never included, even when a cycle leads
    /// back to it. Neighbors are visited in adjacency order so the result is
    /// deterministic.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound` if `root` is not in the graph
    /// - `Error::Cancelled` if `cancel` fires between BFS steps
    pub fn bfs_depths(
        &self,
        root: &RequirementId,
        max_depth: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Reached>> {
        let &start = self
            .node_map
            .get(root)
            .ok_or_else(|| Error::not_found("requirement", root.as_str()))?;

        let mut reached = Vec::new();
        let mut visited = HashSet::from([start]);
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::from([(start, 0)]);

        while let Some((node, depth)) = queue.pop_front() {
            cancel.check()?;
            if depth >= max_depth {
                continue;
            }

            for edge in self.cell(node) {
                let Some(&next) = self.node_map.get(&edge.requirement_id) else {
                    continue;
                };
                if visited.insert(next) {
                    debug!(
                        from = %self.graph[node],
                        to = %edge.requirement_id,
                        depth = depth + 1,
                        "BFS step"
                    );
                    reached.push(Reached {
                        requirement_id: edge.requirement_id,
                        depth: depth + 1,
                        via: edge.relationship_type,
                    });
                    queue.push_back((next, depth + 1));
                }
            }
        }

        Ok(reached)
    }
}
