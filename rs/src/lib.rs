//! Nearest-POI search that can require each hit to be reachable over a road network
//! within a path-cost cutoff.
//!
//! A [`HybridSearchEngine`] holds the POI catalog, the road graph and a worker pool.
//! Candidates come from an R-tree (radius or k-nearest), and a bounded Dijkstra
//! filters them when reachability is requested.

pub mod core;
pub mod engine;
pub mod graph;
pub mod queue;
pub mod routing;
pub mod snapshot;
pub mod spatial;

pub use crate::core::config::{EngineConfig, IndexOptions, SnapshotOptions};
pub use crate::core::errors::{Result, SearchError};
pub use crate::core::types::{
    GeoPoint, Poi, QueryRequest, QueryResult, Reachability, RoadEdge, RoadNode, Route,
    SearchHit, TagFilter,
};
pub use crate::engine::HybridSearchEngine;
pub use crate::graph::{RoadGraph, RoadGraphBuilder};
pub use crate::queue::{SearchOutcome, SearchQueue};
pub use crate::routing::{CostModel, EdgeCost, EdgeView, PathFinder};
pub use crate::snapshot::Snapshot;
pub use crate::spatial::{bounding_box, distance, BoundingBox, SpatialIndex};
