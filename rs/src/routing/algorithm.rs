use crate::core::errors::{Result, SearchError};
use crate::core::types::Route;
use crate::graph::{AdjacentEdge, RoadGraph};
use crate::routing::cost::{ByLength, EdgeCost, EdgeView};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

const DEADLINE_CHECK_INTERVAL: usize = 64;

#[derive(Copy, Clone, Debug)]
struct State {
    cost: f64,
    slot: u32,
    node_id: i64,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node_id.cmp(&self.node_id))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for State {}

struct Exploration {
    best: FxHashMap<u32, f64>,
    came_from: FxHashMap<u32, (u32, AdjacentEdge)>,
    settled: Vec<(u32, f64)>,
    reached: Option<u32>,
}

/// Cutoff-bounded Dijkstra over a [`RoadGraph`].
pub struct PathFinder<'g> {
    graph: &'g RoadGraph,
    cost: &'g dyn EdgeCost,
    deadline: Option<Instant>,
}

impl<'g> PathFinder<'g> {
    pub fn new(graph: &'g RoadGraph) -> Self {
        PathFinder {
            graph,
            cost: &ByLength,
            deadline: None,
        }
    }

    pub fn with_cost(mut self, cost: &'g dyn EdgeCost) -> Self {
        self.cost = cost;
        self
    }

    /// Abandons the search with [`SearchError::Timeout`] once `deadline` has passed.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Cheapest route from `from` to `to` costing at most `cutoff`, or `None` when
    /// no such route exists.
    pub fn shortest_path(&self, from: i64, to: i64, cutoff: f64) -> Result<Option<Route>> {
        validate_cutoff(cutoff)?;
        let start = self.graph.slot(from).ok_or(SearchError::UnknownNode(from))?;
        let end = self.graph.slot(to).ok_or(SearchError::UnknownNode(to))?;

        let exploration = self.explore(start, cutoff, Some(end))?;
        Ok(exploration
            .reached
            .map(|slot| self.reconstruct(slot, &exploration)))
    }

    /// Every node reachable from `from` within `cutoff`, sorted by (cost, id).
    pub fn reachable_within(&self, from: i64, cutoff: f64) -> Result<Vec<(i64, f64)>> {
        validate_cutoff(cutoff)?;
        let start = self.graph.slot(from).ok_or(SearchError::UnknownNode(from))?;

        let exploration = self.explore(start, cutoff, None)?;
        let mut reached: Vec<(i64, f64)> = exploration
            .settled
            .into_iter()
            .map(|(slot, cost)| (self.graph.external_id(slot), cost))
            .collect();
        reached.sort_unstable_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        Ok(reached)
    }

    fn explore(&self, start: u32, cutoff: f64, target: Option<u32>) -> Result<Exploration> {
        let mut exploration = Exploration {
            best: FxHashMap::default(),
            came_from: FxHashMap::default(),
            settled: Vec::new(),
            reached: None,
        };
        let mut heap = BinaryHeap::new();

        exploration.best.insert(start, 0.0);
        heap.push(State {
            cost: 0.0,
            slot: start,
            node_id: self.graph.external_id(start),
        });

        let mut pops = 0usize;
        while let Some(current) = heap.pop() {
            if current.cost > cutoff {
                break;
            }
            if current.cost > *exploration.best.get(&current.slot).unwrap_or(&f64::INFINITY) {
                continue;
            }

            if pops % DEADLINE_CHECK_INTERVAL == 0 {
                self.check_deadline()?;
            }
            pops += 1;

            exploration.settled.push((current.slot, current.cost));
            if Some(current.slot) == target {
                exploration.reached = Some(current.slot);
                break;
            }

            for edge in self.graph.edges_from(current.slot) {
                let view = EdgeView {
                    source: current.node_id,
                    target: self.graph.external_id(edge.target),
                    length_m: edge.length_m,
                    class: self.graph.class_name(edge.class),
                };
                let weight = self.cost.cost(&view);
                if weight.is_nan() || weight < 0.0 {
                    return Err(SearchError::InvalidWeight(format!(
                        "cost {} for edge {} -> {}",
                        weight, view.source, view.target
                    )));
                }
                if weight.is_infinite() {
                    continue;
                }

                let new_cost = current.cost + weight;
                if new_cost > cutoff {
                    continue;
                }
                if new_cost < *exploration.best.get(&edge.target).unwrap_or(&f64::INFINITY) {
                    exploration.best.insert(edge.target, new_cost);
                    exploration
                        .came_from
                        .insert(edge.target, (current.slot, *edge));
                    heap.push(State {
                        cost: new_cost,
                        slot: edge.target,
                        node_id: view.target,
                    });
                }
            }
        }

        Ok(exploration)
    }

    fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(SearchError::Timeout(
                "path search exceeded its deadline".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn reconstruct(&self, end: u32, exploration: &Exploration) -> Route {
        let mut nodes = vec![self.graph.external_id(end)];
        let mut edges = Vec::new();
        let mut current = end;

        while let Some((prev, edge)) = exploration.came_from.get(&current) {
            edges.push(self.graph.to_road_edge(*prev, edge));
            nodes.push(self.graph.external_id(*prev));
            current = *prev;
        }

        nodes.reverse();
        edges.reverse();

        let length_m = edges.iter().map(|e| e.length_m).sum();
        let cost = exploration.best.get(&end).copied().unwrap_or_default();
        Route {
            nodes,
            edges,
            length_m,
            cost,
        }
    }
}

fn validate_cutoff(cutoff: f64) -> Result<()> {
    if cutoff.is_nan() || cutoff < 0.0 {
        return Err(SearchError::InvalidQuery(format!(
            "cutoff must be non-negative, got {}",
            cutoff
        )));
    }
    Ok(())
}
