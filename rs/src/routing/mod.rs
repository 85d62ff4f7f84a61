pub mod algorithm;
pub mod cost;

pub use algorithm::PathFinder;
pub use cost::{ByLength, CostModel, EdgeCost, EdgeView};

use crate::core::errors::Result;
use crate::core::types::Route;
use crate::graph::RoadGraph;

/// Length-weighted shortest path; `Ok(None)` when nothing is reachable within `cutoff`.
pub fn shortest_path(graph: &RoadGraph, from: i64, to: i64, cutoff: f64) -> Result<Option<Route>> {
    PathFinder::new(graph).shortest_path(from, to, cutoff)
}
