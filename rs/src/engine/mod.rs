pub mod catalog;

pub use catalog::PoiCatalog;

use crate::core::config::EngineConfig;
use crate::core::errors::{Result, SearchError};
use crate::core::types::{GeoPoint, Poi, QueryRequest, QueryResult, RoadEdge, RoadNode, SearchHit};
use crate::graph::RoadGraph;
use crate::routing::{EdgeCost, PathFinder};
use crate::spatial::distance;
use parking_lot::RwLock;
use rayon::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Candidate {
    poi: Poi,
    distance_m: f64,
}

enum Plan {
    Radius(f64),
    Nearest(usize),
}

/// Answers nearest-POI and nearest-reachable-POI queries.
///
/// The engine owns its POI catalog, road graph and worker pool; nothing is shared
/// through globals. Reads take a shared lock on the catalog and an `Arc` snapshot of
/// the road graph, so a graph mutation never disturbs a query that is already running.
pub struct HybridSearchEngine {
    config: EngineConfig,
    catalog: RwLock<PoiCatalog>,
    graph: RwLock<Arc<RoadGraph>>,
    cost: Arc<dyn EdgeCost>,
    pool: rayon::ThreadPool,
}

impl HybridSearchEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads())
            .thread_name(|i| format!("reach-worker-{}", i))
            .build()
            .map_err(|e| SearchError::InvalidConfig(e.to_string()))?;

        Ok(HybridSearchEngine {
            catalog: RwLock::new(PoiCatalog::new(config.index.clone())),
            graph: RwLock::new(Arc::new(RoadGraph::with_options(config.index.clone()))),
            cost: Arc::new(config.cost_model.clone()),
            pool,
            config,
        })
    }

    /// Replaces the configured cost model with a custom edge cost function.
    pub fn with_cost_function(mut self, cost: Arc<dyn EdgeCost>) -> Self {
        self.cost = cost;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn pool(&self) -> &rayon::ThreadPool {
        &self.pool
    }

    pub fn insert_poi(&self, poi: Poi) -> Option<Poi> {
        self.catalog.write().upsert(poi)
    }

    pub fn update_poi(&self, poi: Poi) -> Result<Poi> {
        self.catalog.write().update(poi)
    }

    pub fn remove_poi(&self, id: i64) -> Result<Poi> {
        self.catalog.write().remove(id)
    }

    pub fn bulk_load_pois(&self, pois: impl IntoIterator<Item = Poi>) -> Result<usize> {
        let pois: Vec<Poi> = pois.into_iter().collect();
        let count = self.catalog.write().bulk_load(pois)?;
        log::info!("Loaded {} POIs", count);
        Ok(count)
    }

    pub fn poi(&self, id: i64) -> Option<Poi> {
        self.catalog.read().get(id).cloned()
    }

    pub fn poi_count(&self) -> usize {
        self.catalog.read().len()
    }

    /// Every POI ordered by id.
    pub fn pois(&self) -> Vec<Poi> {
        self.catalog.read().pois().into_iter().cloned().collect()
    }

    pub fn add_road_node(&self, id: i64, location: GeoPoint) -> Result<()> {
        let mut graph = self.graph.write();
        Arc::make_mut(&mut *graph).add_node(id, location)
    }

    pub fn add_road_edge(&self, edge: RoadEdge) -> Result<()> {
        let mut graph = self.graph.write();
        Arc::make_mut(&mut *graph).add_edge(edge)
    }

    pub fn remove_road_node(&self, id: i64) -> Result<RoadNode> {
        let mut graph = self.graph.write();
        Arc::make_mut(&mut *graph).remove_node(id)
    }

    pub fn replace_road_graph(&self, graph: RoadGraph) {
        log::info!(
            "Replacing road graph: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        *self.graph.write() = Arc::new(graph);
    }

    /// Immutable view of the current road graph.
    pub fn graph_snapshot(&self) -> Arc<RoadGraph> {
        self.graph.read().clone()
    }

    pub fn search(&self, request: &QueryRequest) -> Result<QueryResult> {
        validate_request(request)?;
        let candidates = self.generate_candidates(request)?;
        if candidates.is_empty() {
            return Err(SearchError::NoCandidates);
        }
        let candidate_count = candidates.len();

        let mut hits: Vec<SearchHit> = match request.cutoff() {
            None => candidates
                .into_iter()
                .map(|c| SearchHit {
                    poi: c.poi,
                    distance_m: c.distance_m,
                    path_length_m: None,
                    path_cost: None,
                    route: None,
                })
                .collect(),
            Some(cutoff) => self.filter_reachable(request, candidates, cutoff)?,
        };
        let dropped = candidate_count - hits.len();

        hits.sort_by(|a, b| {
            ranking_key(a)
                .total_cmp(&ranking_key(b))
                .then_with(|| a.poi.id.cmp(&b.poi.id))
        });
        let hits: Vec<SearchHit> = hits
            .into_iter()
            .skip(request.offset)
            .take(request.k.unwrap_or(usize::MAX))
            .collect();

        log::debug!(
            "query at ({}, {}): {} candidates, {} dropped, {} returned",
            request.center.lat(),
            request.center.lon(),
            candidate_count,
            dropped,
            hits.len()
        );

        Ok(QueryResult {
            hits,
            candidates: candidate_count,
            dropped,
        })
    }

    /// Runs [`search`](Self::search) on the blocking pool, bounded by the configured
    /// query timeout.
    pub async fn search_async(self: Arc<Self>, request: QueryRequest) -> Result<QueryResult> {
        let timeout_duration = self.config.query_timeout();
        let task = tokio::task::spawn_blocking(move || self.search(&request));

        let joined = match timeout_duration {
            Some(duration) => tokio::time::timeout(duration, task).await.map_err(|_| {
                SearchError::Timeout(format!("query exceeded {} ms", duration.as_millis()))
            })?,
            None => task.await,
        };
        joined.map_err(|e| SearchError::TaskFailed(e.to_string()))?
    }

    fn generate_candidates(&self, request: &QueryRequest) -> Result<Vec<Candidate>> {
        let center = &request.center;
        let plan = match (request.radius_m, request.k, request.cutoff()) {
            (Some(radius), _, _) => Plan::Radius(radius),
            (None, Some(k), None) => Plan::Nearest(k.saturating_add(request.offset)),
            (None, _, Some(cutoff)) => Plan::Radius(self.reachable_radius(center, cutoff)?),
            (None, None, None) => {
                return Err(SearchError::InvalidQuery(
                    "a query needs a radius, k, or a reachability cutoff".to_string(),
                ))
            }
        };

        let catalog = self.catalog.read();
        let accepts = |id: i64| catalog.get(id).is_some_and(|poi| request.accepts(poi));
        let hits = match plan {
            Plan::Radius(radius) => catalog.index().query_radius(center, radius)?,
            Plan::Nearest(k) => catalog.index().query_k_nearest_matching(center, k, accepts)?,
        };

        Ok(hits
            .into_iter()
            .filter_map(|(id, distance_m)| {
                let poi = catalog.get(id)?;
                request.accepts(poi).then(|| Candidate {
                    poi: poi.clone(),
                    distance_m,
                })
            })
            .collect())
    }

    /// Straight-line distance from `center` to the farthest road node whose path cost
    /// from the snapped center stays within `cutoff` (cost-model units).
    fn reachable_radius(&self, center: &GeoPoint, cutoff: f64) -> Result<f64> {
        let graph = self.graph_snapshot();
        let from = graph.nearest_node(center)?;
        let reached = PathFinder::new(&graph)
            .with_cost(self.cost.as_ref())
            .reachable_within(from, cutoff)?;

        let radius = reached
            .iter()
            .filter_map(|(id, _)| graph.node(*id))
            .map(|node| distance(center, &node.location))
            .fold(0.0, f64::max);
        log::debug!(
            "cutoff {} reaches {} road nodes, candidate radius {:.1} m",
            cutoff,
            reached.len(),
            radius
        );
        Ok(radius)
    }

    fn filter_reachable(
        &self,
        request: &QueryRequest,
        candidates: Vec<Candidate>,
        cutoff: f64,
    ) -> Result<Vec<SearchHit>> {
        let graph = self.graph_snapshot();
        let from = graph.nearest_node(&request.center)?;
        let timeout = self.config.candidate_timeout();
        let cost: &dyn EdgeCost = self.cost.as_ref();

        let outcomes: Vec<Result<Option<SearchHit>>> = self.pool.install(|| {
            candidates
                .into_par_iter()
                .map(|candidate| {
                    reach_candidate(
                        &graph,
                        cost,
                        from,
                        candidate,
                        cutoff,
                        timeout,
                        request.include_routes,
                    )
                })
                .collect()
        });

        let mut hits = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            if let Some(hit) = outcome? {
                hits.push(hit);
            }
        }
        Ok(hits)
    }
}

fn reach_candidate(
    graph: &RoadGraph,
    cost: &dyn EdgeCost,
    from: i64,
    candidate: Candidate,
    cutoff: f64,
    timeout: Option<Duration>,
    include_route: bool,
) -> Result<Option<SearchHit>> {
    let to = match graph.nearest_node(&candidate.poi.location) {
        Ok(node) => node,
        Err(e) => {
            log::warn!("Dropping POI {}: cannot snap to road: {}", candidate.poi.id, e);
            return Ok(None);
        }
    };
    let deadline = timeout.map(|t| Instant::now() + t);

    let route = match PathFinder::new(graph)
        .with_cost(cost)
        .with_deadline(deadline)
        .shortest_path(from, to, cutoff)
    {
        Ok(Some(route)) => route,
        Ok(None) => {
            log::debug!(
                "POI {} unreachable within {} from node {}",
                candidate.poi.id,
                cutoff,
                from
            );
            return Ok(None);
        }
        Err(SearchError::Timeout(reason)) => {
            log::warn!("Dropping POI {}: {}", candidate.poi.id, reason);
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    Ok(Some(SearchHit {
        poi: candidate.poi,
        distance_m: candidate.distance_m,
        path_length_m: Some(route.length_m),
        path_cost: Some(route.cost),
        route: include_route.then_some(route),
    }))
}

fn ranking_key(hit: &SearchHit) -> f64 {
    hit.path_cost.unwrap_or(hit.distance_m)
}

fn validate_request(request: &QueryRequest) -> Result<()> {
    if let Some(radius) = request.radius_m {
        if !radius.is_finite() || radius < 0.0 {
            return Err(SearchError::InvalidQuery(format!(
                "radius must be non-negative, got {}",
                radius
            )));
        }
    }
    if request.k == Some(0) {
        return Err(SearchError::InvalidQuery("k must be at least 1".to_string()));
    }
    if let Some(cutoff) = request.cutoff() {
        if !cutoff.is_finite() || cutoff < 0.0 {
            return Err(SearchError::InvalidQuery(format!(
                "cutoff must be non-negative, got {}",
                cutoff
            )));
        }
    }
    Ok(())
}
