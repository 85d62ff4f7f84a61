use crate::core::config::{EngineConfig, SnapshotOptions};
use crate::core::errors::Result;
use crate::core::types::{Poi, RoadEdge, RoadNode};
use crate::engine::HybridSearchEngine;
use crate::graph::RoadGraphBuilder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::SystemTime;

/// Entity-level export of an engine. Indices are not stored; they are rebuilt on
/// [`restore`](Snapshot::restore).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub pois: Vec<Poi>,
    pub nodes: Vec<RoadNode>,
    pub edges: Vec<RoadEdge>,
}

impl Snapshot {
    pub fn capture(engine: &HybridSearchEngine) -> Self {
        let graph = engine.graph_snapshot();
        Snapshot {
            pois: engine.pois(),
            nodes: graph.nodes().cloned().collect(),
            edges: graph.edges(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(writer, self)?;
        log::info!(
            "Saved snapshot to {}: {} POIs, {} road nodes, {} road edges",
            path.display(),
            self.pois.len(),
            self.nodes.len(),
            self.edges.len()
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let snapshot: Snapshot = bincode::deserialize_from(reader)?;
        Ok(snapshot)
    }

    /// Builds a fresh engine holding exactly the captured entities.
    pub fn restore(self, config: EngineConfig) -> Result<HybridSearchEngine> {
        let mut builder = RoadGraphBuilder::with_options(config.index.clone());
        builder.extend_nodes(self.nodes).extend_edges(self.edges);
        let graph = builder.build()?;

        let engine = HybridSearchEngine::new(config)?;
        engine.bulk_load_pois(self.pois)?;
        engine.replace_road_graph(graph);
        Ok(engine)
    }

    /// Loads `options.file_path` when it is younger than the configured TTL, otherwise
    /// calls `build` and writes its result there.
    pub fn load_or_build<F>(options: &SnapshotOptions, build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<Snapshot>,
    {
        let path = options.file_path.as_path();

        if is_fresh(path, options) {
            match Snapshot::load(path) {
                Ok(snapshot) => {
                    log::info!("Reusing snapshot {}", path.display());
                    return Ok(snapshot);
                }
                Err(e) => log::warn!("Ignoring unreadable snapshot {}: {}", path.display(), e),
            }
        }

        let snapshot = build()?;
        snapshot.save(path)?;
        Ok(snapshot)
    }
}

fn is_fresh(path: &Path, options: &SnapshotOptions) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default()
        < options.ttl()
}
