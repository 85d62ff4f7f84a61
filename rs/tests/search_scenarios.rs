use poi_reach::{
    EngineConfig, GeoPoint, HybridSearchEngine, IndexOptions, Poi, QueryRequest, RoadEdge,
    RoadGraphBuilder, SearchError, Snapshot, SpatialIndex,
};
use std::sync::Arc;
use std::thread;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn pt(lat: f64, lon: f64) -> GeoPoint {
    GeoPoint::new(lat, lon).unwrap()
}

fn engine() -> HybridSearchEngine {
    HybridSearchEngine::new(EngineConfig {
        worker_threads: Some(4),
        ..EngineConfig::default()
    })
    .unwrap()
}

#[test]
fn radius_query_returns_nearby_pois_by_distance() {
    init_logger();
    let engine = engine();
    engine
        .bulk_load_pois(vec![
            Poi::new(3, "Far", pt(0.0, 1.0)),
            Poi::new(2, "Near", pt(0.0, 0.01)),
            Poi::new(1, "Here", pt(0.0, 0.0)),
        ])
        .unwrap();

    let result = engine
        .search(&QueryRequest::new(pt(0.0, 0.0)).within(2_000.0))
        .unwrap();

    assert_eq!(result.ids(), vec![1, 2]);
    assert_eq!(result.hits[0].distance_m, 0.0);
    assert!((result.hits[1].distance_m - 1_111.95).abs() < 1.0);
    assert!(result.hits.iter().all(|hit| hit.path_length_m.is_none()));
}

#[test]
fn disconnected_component_is_filtered_out() {
    init_logger();
    let engine = engine();
    engine
        .bulk_load_pois(vec![
            Poi::new(1, "Same block", pt(0.0, 0.001)),
            Poi::new(2, "Across the river", pt(0.0, 0.0021)),
        ])
        .unwrap();

    let mut builder = RoadGraphBuilder::new();
    builder
        .add_node(1, pt(0.0, 0.0))
        .add_node(2, pt(0.0, 0.001))
        .add_node(3, pt(0.0, 0.0021))
        .add_node(4, pt(0.0, 0.003))
        .add_edge(RoadEdge::new(1, 2, 111.0))
        .add_edge(RoadEdge::new(3, 4, 100.0));
    engine.replace_road_graph(builder.build().unwrap());

    let request = QueryRequest::new(pt(0.0, 0.0))
        .within(1_000.0)
        .reachable_within(5_000.0);
    let result = engine.search(&request).unwrap();

    assert_eq!(result.ids(), vec![1]);
    assert_eq!(result.candidates, 2);
    assert_eq!(result.dropped, 1);
    assert_eq!(result.hits[0].path_length_m, Some(111.0));

    let plain = engine
        .search(&QueryRequest::new(pt(0.0, 0.0)).within(1_000.0))
        .unwrap();
    assert_eq!(plain.ids(), vec![1, 2]);
}

#[test]
fn knn_over_small_catalog_returns_everything() {
    init_logger();
    let engine = engine();
    engine
        .bulk_load_pois(vec![
            Poi::new(1, "a", pt(10.0, 10.0)),
            Poi::new(2, "b", pt(10.5, 10.0)),
            Poi::new(3, "c", pt(-40.0, 120.0)),
        ])
        .unwrap();

    let result = engine
        .search(&QueryRequest::new(pt(10.0, 10.0)).nearest(5))
        .unwrap();
    assert_eq!(result.ids(), vec![1, 2, 3]);

    let mut index = SpatialIndex::new();
    index.insert(1, pt(10.0, 10.0));
    index.insert(2, pt(10.5, 10.0));
    index.insert(3, pt(-40.0, 120.0));
    assert_eq!(index.query_k_nearest(&pt(10.0, 10.0), 5).unwrap().len(), 3);
}

#[test]
fn filtered_knn_under_finite_cap_returns_all_matches() {
    init_logger();
    let engine = HybridSearchEngine::new(EngineConfig {
        worker_threads: Some(2),
        index: IndexOptions {
            knn_max_radius_m: 10_000.0,
            ..IndexOptions::default()
        },
        ..EngineConfig::default()
    })
    .unwrap();
    engine
        .bulk_load_pois(vec![
            Poi::new(1, "Cafe", pt(0.0, 0.001))
                .with_tag("amenity", "cafe"),
            Poi::new(2, "Bistro", pt(0.0, 0.002))
                .with_tag("amenity", "cafe"),
            Poi::new(3, "Bank", pt(0.0, 0.003))
                .with_tag("amenity", "bank"),
            Poi::new(4, "Kiosk", pt(0.003, 0.0)),
        ])
        .unwrap();

    let request = QueryRequest::new(pt(0.0, 0.0))
        .nearest(5)
        .with_tag("amenity", Some("cafe"));
    assert_eq!(engine.search(&request).unwrap().ids(), vec![1, 2]);
}

#[test]
fn reachable_hits_rank_by_path_cost() {
    init_logger();
    let engine = engine();
    engine
        .bulk_load_pois(vec![
            Poi::new(10, "Close but winding", pt(0.0, 0.001)),
            Poi::new(11, "Further but direct", pt(0.0, 0.002)),
        ])
        .unwrap();
    engine.add_road_node(1, pt(0.0, 0.0)).unwrap();
    engine.add_road_node(2, pt(0.0, 0.001)).unwrap();
    engine.add_road_node(3, pt(0.0, 0.002)).unwrap();
    engine.add_road_edge(RoadEdge::new(1, 2, 900.0)).unwrap();
    engine.add_road_edge(RoadEdge::new(1, 3, 300.0)).unwrap();

    let request = QueryRequest::new(pt(0.0, 0.0))
        .within(1_000.0)
        .reachable_within(1_000.0)
        .with_routes();
    let result = engine.search(&request).unwrap();

    assert_eq!(result.ids(), vec![11, 10]);
    assert_eq!(result.hits[0].path_cost, Some(300.0));
    assert_eq!(result.hits[1].path_length_m, Some(900.0));
    let route = result.hits[0].route.as_ref().unwrap();
    assert_eq!(route.nodes, vec![1, 3]);

    let tight = QueryRequest::new(pt(0.0, 0.0))
        .within(1_000.0)
        .reachable_within(500.0);
    assert_eq!(engine.search(&tight).unwrap().ids(), vec![11]);
}

#[test]
fn reachability_without_radius_searches_reachable_area() {
    init_logger();
    let engine = engine();
    engine
        .bulk_load_pois(vec![
            Poi::new(1, "near", pt(0.0, 0.001)),
            Poi::new(2, "far", pt(0.0, 0.5)),
        ])
        .unwrap();
    engine.add_road_node(1, pt(0.0, 0.0)).unwrap();
    engine.add_road_node(2, pt(0.0, 0.001)).unwrap();
    engine.add_road_edge(RoadEdge::new(1, 2, 111.0)).unwrap();

    let result = engine
        .search(&QueryRequest::new(pt(0.0, 0.0)).reachable_within(1_000.0))
        .unwrap();
    assert_eq!(result.ids(), vec![1]);
    assert_eq!(result.candidates, 1);
}

#[test]
fn removed_road_node_cuts_reachability() {
    init_logger();
    let engine = engine();
    engine.insert_poi(Poi::new(1, "end", pt(0.0, 0.002)));
    for (id, lon) in [(1, 0.0), (2, 0.001), (3, 0.002)] {
        engine.add_road_node(id, pt(0.0, lon)).unwrap();
    }
    engine.add_road_edge(RoadEdge::new(1, 2, 100.0)).unwrap();
    engine.add_road_edge(RoadEdge::new(2, 3, 100.0)).unwrap();

    let request = QueryRequest::new(pt(0.0, 0.0))
        .within(1_000.0)
        .reachable_within(1_000.0);
    assert_eq!(engine.search(&request).unwrap().ids(), vec![1]);

    engine.remove_road_node(2).unwrap();
    let result = engine.search(&request).unwrap();
    assert!(result.is_empty());
    assert_eq!(result.dropped, 1);
}

#[test]
fn snapshot_round_trip_preserves_answers() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.bin");

    let engine = engine();
    engine
        .bulk_load_pois(vec![
            Poi::new(1, "a", pt(51.507_351, -0.127_758))
                .with_tag("amenity", "cafe"),
            Poi::new(2, "b", pt(51.508_1, -0.128_1)),
        ])
        .unwrap();
    engine.add_road_node(100, pt(51.507_35, -0.127_75)).unwrap();
    engine.add_road_node(101, pt(51.508_1, -0.128_1)).unwrap();
    engine
        .add_road_edge(RoadEdge::new(100, 101, 95.0).with_class("residential"))
        .unwrap();

    let request = QueryRequest::new(pt(51.507_351, -0.127_758))
        .within(500.0)
        .reachable_within(500.0);
    let before = engine.search(&request).unwrap();

    Snapshot::capture(&engine).save(&path).unwrap();
    let restored = Snapshot::load(&path)
        .unwrap()
        .restore(EngineConfig::default())
        .unwrap();

    assert_eq!(restored.pois(), engine.pois());
    assert_eq!(restored.graph_snapshot().edges(), engine.graph_snapshot().edges());
    assert_eq!(restored.search(&request).unwrap(), before);
}

#[test]
fn concurrent_reads_during_writes() {
    init_logger();
    let engine = engine();
    let pois: Vec<Poi> = (0..200)
        .map(|i| Poi::new(i, format!("poi-{}", i), pt(0.0, i as f64 * 0.0001)))
        .collect();
    engine.bulk_load_pois(pois).unwrap();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..50 {
                    let result = engine
                        .search(&QueryRequest::new(pt(0.0, 0.0)).nearest(10))
                        .unwrap();
                    assert_eq!(result.len(), 10);
                    assert_eq!(result.ids()[0], 0);
                }
            });
        }
        scope.spawn(|| {
            for i in 1_000..1_100 {
                engine.insert_poi(Poi::new(i, "late", pt(10.0, 10.0)));
            }
        });
    });

    assert_eq!(engine.poi_count(), 300);
}

#[tokio::test]
async fn async_search_matches_blocking_search() {
    init_logger();
    let engine = Arc::new(engine());
    engine.insert_poi(Poi::new(7, "Station", pt(35.681, 139.767)));

    let request = QueryRequest::new(pt(35.68, 139.76)).nearest(1);
    let expected = engine.search(&request).unwrap();
    let result = engine.clone().search_async(request).await.unwrap();
    assert_eq!(result, expected);

    let empty = engine
        .search_async(QueryRequest::new(pt(0.0, 0.0)).within(10.0))
        .await;
    assert!(matches!(empty, Err(SearchError::NoCandidates)));
}

#[test]
fn invalid_coordinates_are_rejected_on_deserialize() {
    let bad = r#"{"id": 1, "name": "x", "location": {"lat": 91.0, "lon": 0.0}}"#;
    assert!(serde_json::from_str::<Poi>(bad).is_err());

    let json = r#"{
        "center": {"lat": 1.0, "lon": 2.0},
        "k": 3,
        "reachability": {"mode": "graph", "cutoff": 250.0}
    }"#;
    let request: QueryRequest = serde_json::from_str(json).unwrap();
    assert_eq!(request.k, Some(3));
}
