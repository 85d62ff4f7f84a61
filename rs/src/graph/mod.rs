pub mod builder;

pub use builder::RoadGraphBuilder;

use crate::core::config::IndexOptions;
use crate::core::errors::{Result, SearchError};
use crate::core::types::{GeoPoint, RoadEdge, RoadNode};
use crate::spatial::geometry::EARTH_RADIUS;
use crate::spatial::SpatialIndex;
use rustc_hash::FxHashMap;
use std::f64::consts::PI;

#[derive(Debug, Clone, Default)]
pub(crate) struct StringInterner {
    map: FxHashMap<String, u32>,
    vec: Vec<String>,
}

impl StringInterner {
    fn intern(&mut self, s: &str) -> u32 {
        if let Some(id) = self.map.get(s) {
            return *id;
        }
        let id = self.vec.len() as u32;
        let s_owned = s.to_owned();
        self.map.insert(s_owned.clone(), id);
        self.vec.push(s_owned);
        id
    }

    fn resolve(&self, id: u32) -> &str {
        &self.vec[id as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AdjacentEdge {
    pub target: u32,
    pub length_m: f64,
    pub class: Option<u32>,
    pub directed: bool,
}

/// Road topology stored as an arena of nodes with index-based adjacency lists.
///
/// Removed nodes leave a tombstone so slot numbers held elsewhere stay valid.
#[derive(Debug, Clone)]
pub struct RoadGraph {
    nodes: Vec<Option<RoadNode>>,
    node_id_map: FxHashMap<i64, u32>,
    adjacency: Vec<Vec<AdjacentEdge>>,
    incoming: Vec<Vec<u32>>,
    classes: StringInterner,
    node_index: SpatialIndex,
}

impl Default for RoadGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl RoadGraph {
    pub fn new() -> Self {
        Self::with_options(IndexOptions::default())
    }

    /// `options` tune the node index; its k-nearest cap is always widened to the whole
    /// globe so `nearest_node` only fails on an empty graph.
    pub fn with_options(options: IndexOptions) -> Self {
        let options = IndexOptions {
            knn_max_radius_m: PI * EARTH_RADIUS,
            ..options
        };
        RoadGraph {
            nodes: Vec::new(),
            node_id_map: FxHashMap::default(),
            adjacency: Vec::new(),
            incoming: Vec::new(),
            classes: StringInterner::default(),
            node_index: SpatialIndex::with_options(options),
        }
    }

    pub fn node_count(&self) -> usize {
        self.node_id_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_id_map.is_empty()
    }

    /// Number of logical edges; an undirected edge counts once.
    pub fn edge_count(&self) -> usize {
        self.adjacency
            .iter()
            .enumerate()
            .map(|(slot, edges)| {
                edges
                    .iter()
                    .filter(|e| e.directed || slot as u32 <= e.target)
                    .count()
            })
            .sum()
    }

    pub fn contains_node(&self, id: i64) -> bool {
        self.node_id_map.contains_key(&id)
    }

    pub fn node(&self, id: i64) -> Option<&RoadNode> {
        let slot = self.node_id_map.get(&id)?;
        self.nodes[*slot as usize].as_ref()
    }

    /// Live nodes in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = &RoadNode> {
        self.nodes.iter().flatten()
    }

    /// Every logical edge once, undirected edges reported from their lower slot.
    pub fn edges(&self) -> Vec<RoadEdge> {
        let mut edges = Vec::new();
        for (slot, adjacent) in self.adjacency.iter().enumerate() {
            for edge in adjacent {
                if edge.directed || slot as u32 <= edge.target {
                    edges.push(self.to_road_edge(slot as u32, edge));
                }
            }
        }
        edges
    }

    pub fn add_node(&mut self, id: i64, location: GeoPoint) -> Result<()> {
        if self.node_id_map.contains_key(&id) {
            return Err(SearchError::DuplicateId(id));
        }
        let slot = self.nodes.len() as u32;
        self.nodes.push(Some(RoadNode { id, location }));
        self.adjacency.push(Vec::new());
        self.incoming.push(Vec::new());
        self.node_id_map.insert(id, slot);
        self.node_index.insert(id, location);
        Ok(())
    }

    pub fn add_edge(&mut self, edge: RoadEdge) -> Result<()> {
        if !edge.length_m.is_finite() || edge.length_m < 0.0 {
            return Err(SearchError::InvalidWeight(format!(
                "edge {} -> {} has length {}",
                edge.source, edge.target, edge.length_m
            )));
        }
        let source = self.slot(edge.source).ok_or(SearchError::UnknownNode(edge.source))?;
        let target = self.slot(edge.target).ok_or(SearchError::UnknownNode(edge.target))?;

        let class = edge.class.as_deref().map(|c| self.classes.intern(c));
        let forward = AdjacentEdge {
            target,
            length_m: edge.length_m,
            class,
            directed: edge.directed,
        };
        self.push_adjacent(source, forward);

        if !edge.directed && source != target {
            self.push_adjacent(
                target,
                AdjacentEdge {
                    target: source,
                    ..forward
                },
            );
        }
        Ok(())
    }

    /// Removes a node together with every edge touching it.
    pub fn remove_node(&mut self, id: i64) -> Result<RoadNode> {
        let slot = self.slot(id).ok_or(SearchError::NotFound(id))?;
        let idx = slot as usize;

        let mut sources = std::mem::take(&mut self.incoming[idx]);
        sources.sort_unstable();
        sources.dedup();
        for source in sources {
            self.adjacency[source as usize].retain(|e| e.target != slot);
        }

        let outgoing = std::mem::take(&mut self.adjacency[idx]);
        for edge in outgoing {
            self.incoming[edge.target as usize].retain(|s| *s != slot);
        }

        self.node_id_map.remove(&id);
        self.node_index.remove(id)?;
        self.nodes[idx].take().ok_or(SearchError::NotFound(id))
    }

    pub fn nearest_node(&self, point: &GeoPoint) -> Result<i64> {
        if self.is_empty() {
            return Err(SearchError::EmptyGraph);
        }
        self.node_index
            .query_k_nearest(point, 1)?
            .first()
            .map(|(id, _)| *id)
            .ok_or(SearchError::EmptyGraph)
    }

    /// Edges departing `id`, ordered by target id.
    pub fn neighbors(&self, id: i64) -> Result<Vec<RoadEdge>> {
        let slot = self.slot(id).ok_or(SearchError::UnknownNode(id))?;
        Ok(self.adjacency[slot as usize]
            .iter()
            .map(|edge| self.to_road_edge(slot, edge))
            .collect())
    }

    pub(crate) fn slot(&self, id: i64) -> Option<u32> {
        self.node_id_map.get(&id).copied()
    }

    pub(crate) fn node_at(&self, slot: u32) -> Option<&RoadNode> {
        self.nodes.get(slot as usize)?.as_ref()
    }

    pub(crate) fn edges_from(&self, slot: u32) -> &[AdjacentEdge] {
        &self.adjacency[slot as usize]
    }

    pub(crate) fn class_name(&self, class: Option<u32>) -> Option<&str> {
        class.map(|c| self.classes.resolve(c))
    }

    pub(crate) fn external_id(&self, slot: u32) -> i64 {
        self.node_at(slot).map(|n| n.id).unwrap_or_default()
    }

    pub(crate) fn to_road_edge(&self, source: u32, edge: &AdjacentEdge) -> RoadEdge {
        RoadEdge {
            source: self.external_id(source),
            target: self.external_id(edge.target),
            length_m: edge.length_m,
            class: self.class_name(edge.class).map(str::to_string),
            directed: edge.directed,
        }
    }

    // Keeps every adjacency list sorted by (target id, length) so expansion order
    // never depends on insertion order.
    fn push_adjacent(&mut self, source: u32, edge: AdjacentEdge) {
        let nodes = &self.nodes;
        let key = |e: &AdjacentEdge| {
            let id = nodes[e.target as usize].as_ref().map(|n| n.id).unwrap_or_default();
            (id, e.length_m)
        };
        let new_key = key(&edge);
        let list = &mut self.adjacency[source as usize];
        let pos = list.partition_point(|e| {
            let k = key(e);
            k.0 < new_key.0 || (k.0 == new_key.0 && k.1.total_cmp(&new_key.1).is_le())
        });
        list.insert(pos, edge);
        self.incoming[edge.target as usize].push(source);
    }
}
