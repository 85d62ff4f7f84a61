use crate::core::config::IndexOptions;
use crate::core::errors::{Result, SearchError};
use crate::core::types::{GeoPoint, RoadEdge, RoadNode};
use crate::graph::RoadGraph;
use rustc_hash::FxHashSet;

/// Collects road topology and validates it as a whole before producing a [`RoadGraph`].
pub struct RoadGraphBuilder {
    options: IndexOptions,
    nodes: Vec<RoadNode>,
    edges: Vec<RoadEdge>,
}

impl Default for RoadGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RoadGraphBuilder {
    pub fn new() -> Self {
        Self::with_options(IndexOptions::default())
    }

    pub fn with_options(options: IndexOptions) -> Self {
        RoadGraphBuilder {
            options,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn add_node(&mut self, id: i64, location: GeoPoint) -> &mut Self {
        self.nodes.push(RoadNode { id, location });
        self
    }

    pub fn add_edge(&mut self, edge: RoadEdge) -> &mut Self {
        self.edges.push(edge);
        self
    }

    pub fn extend_nodes(&mut self, nodes: impl IntoIterator<Item = RoadNode>) -> &mut Self {
        self.nodes.extend(nodes);
        self
    }

    pub fn extend_edges(&mut self, edges: impl IntoIterator<Item = RoadEdge>) -> &mut Self {
        self.edges.extend(edges);
        self
    }

    pub fn build(self) -> Result<RoadGraph> {
        let mut seen = FxHashSet::default();
        for node in &self.nodes {
            if !seen.insert(node.id) {
                return Err(SearchError::DuplicateId(node.id));
            }
        }

        let mut graph = RoadGraph::with_options(self.options);
        graph.node_index.bulk_load(
            self.nodes
                .iter()
                .map(|node| (node.id, node.location))
                .collect(),
        )?;

        let node_count = self.nodes.len();
        graph.adjacency.resize_with(node_count, Vec::new);
        graph.incoming.resize_with(node_count, Vec::new);
        for (slot, node) in self.nodes.into_iter().enumerate() {
            graph.node_id_map.insert(node.id, slot as u32);
            graph.nodes.push(Some(node));
        }

        let edge_count = self.edges.len();
        for edge in self.edges {
            graph.add_edge(edge)?;
        }

        log::info!(
            "Built road graph with {} nodes and {} edges",
            node_count,
            edge_count
        );
        Ok(graph)
    }
}
