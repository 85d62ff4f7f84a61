use crate::core::config::IndexOptions;
use crate::core::errors::{Result, SearchError};
use crate::core::types::GeoPoint;
use crate::spatial::geometry::{
    bounding_box, distance, meters_per_degree_lat, meters_per_degree_lon, BoundingBox,
    EARTH_RADIUS,
};
use rstar::{RTree, RTreeObject, AABB};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use std::f64::consts::PI;
use std::fmt;

const MIN_SEED_RADIUS_M: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct IndexedPoint {
    id: i64,
    lon: f64,
    lat: f64,
}

impl IndexedPoint {
    fn new(id: i64, point: &GeoPoint) -> Self {
        IndexedPoint {
            id,
            lon: point.lon(),
            lat: point.lat(),
        }
    }
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lon, self.lat])
    }
}

pub(crate) fn by_distance_then_id(a: &(i64, f64), b: &(i64, f64)) -> Ordering {
    a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0))
}

/// R-tree backed set of located entities keyed by id.
#[derive(Clone)]
pub struct SpatialIndex {
    tree: RTree<IndexedPoint>,
    points: FxHashMap<i64, GeoPoint>,
    options: IndexOptions,
}

impl fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("len", &self.points.len())
            .field("options", &self.options)
            .finish()
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::with_options(IndexOptions::default())
    }

    pub fn with_options(options: IndexOptions) -> Self {
        SpatialIndex {
            tree: RTree::new(),
            points: FxHashMap::default(),
            options,
        }
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn contains(&self, id: i64) -> bool {
        self.points.contains_key(&id)
    }

    pub fn get(&self, id: i64) -> Option<GeoPoint> {
        self.points.get(&id).copied()
    }

    pub fn ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.points.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Inserts or moves `id` to `point`.
    pub fn insert(&mut self, id: i64, point: GeoPoint) {
        if let Some(old) = self.points.insert(id, point) {
            self.tree.remove(&IndexedPoint::new(id, &old));
        }
        self.tree.insert(IndexedPoint::new(id, &point));
    }

    pub fn remove(&mut self, id: i64) -> Result<GeoPoint> {
        let point = self.points.remove(&id).ok_or(SearchError::NotFound(id))?;
        self.tree.remove(&IndexedPoint::new(id, &point));
        Ok(point)
    }

    /// Loads many entries at once. Fails without touching the index if any id repeats.
    pub fn bulk_load(&mut self, entries: Vec<(i64, GeoPoint)>) -> Result<()> {
        let mut seen = FxHashSet::default();
        for (id, _) in &entries {
            if self.points.contains_key(id) || !seen.insert(*id) {
                return Err(SearchError::DuplicateId(*id));
            }
        }

        if self.is_empty() {
            let objects = entries
                .iter()
                .map(|(id, point)| IndexedPoint::new(*id, point))
                .collect();
            self.tree = RTree::bulk_load(objects);
            self.points = entries.into_iter().collect();
        } else {
            for (id, point) in entries {
                self.insert(id, point);
            }
        }
        Ok(())
    }

    /// Every id whose point lies inside `bbox`, sorted by id.
    pub fn query_bounding_box(&self, bbox: &BoundingBox) -> Vec<i64> {
        let mut ids: Vec<i64> = bbox
            .parts()
            .iter()
            .flat_map(|part| {
                let envelope = AABB::from_corners(
                    [part.min_lon(), part.min_lat()],
                    [part.max_lon(), part.max_lat()],
                );
                self.tree
                    .locate_in_envelope(&envelope)
                    .map(|entry| entry.id)
                    .collect::<Vec<_>>()
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn query_radius(&self, center: &GeoPoint, radius_m: f64) -> Result<Vec<(i64, f64)>> {
        validate_radius(radius_m)?;
        let mut hits = self.radius_hits(center, radius_m, |_| true);
        if self.options.sort_radius_results {
            hits.sort_unstable_by(by_distance_then_id);
        }
        Ok(hits)
    }

    pub fn query_k_nearest(&self, center: &GeoPoint, k: usize) -> Result<Vec<(i64, f64)>> {
        self.query_k_nearest_matching(center, k, |_| true)
    }

    /// Expanding-radius k-nearest search over the ids accepted by `accept`.
    pub fn query_k_nearest_matching<F>(
        &self,
        center: &GeoPoint,
        k: usize,
        accept: F,
    ) -> Result<Vec<(i64, f64)>>
    where
        F: Fn(i64) -> bool,
    {
        if k == 0 {
            return Err(SearchError::InvalidQuery(
                "k must be at least 1".to_string(),
            ));
        }
        let mut wanted = k.min(self.len());
        if wanted == 0 {
            return Ok(Vec::new());
        }
        let mut counted_matches = false;

        let max_radius = self.options.knn_max_radius_m;
        let mut radius = self
            .options
            .knn_seed_radius_m
            .unwrap_or_else(|| self.density_seed_radius(k))
            .min(max_radius);

        loop {
            let mut hits = self.radius_hits(center, radius, &accept);
            log::debug!(
                "knn probe: radius {:.1} m, {} of {} neighbours",
                radius,
                hits.len(),
                wanted
            );

            // Short of `wanted`: the predicate may accept fewer entities than exist.
            if hits.len() < wanted && !counted_matches {
                let matching = self.points.keys().filter(|id| accept(**id)).count();
                wanted = wanted.min(matching);
                counted_matches = true;
            }

            let covers_globe = radius >= PI * EARTH_RADIUS;
            if hits.len() >= wanted || covers_globe {
                hits.sort_unstable_by(by_distance_then_id);
                hits.truncate(wanted);
                return Ok(hits);
            }

            if radius >= max_radius {
                return Err(SearchError::InsufficientCoverage {
                    found: hits.len(),
                    requested: wanted,
                    max_radius_m: max_radius,
                });
            }
            radius = (radius * 2.0).min(max_radius);
        }
    }

    fn radius_hits<F>(&self, center: &GeoPoint, radius_m: f64, accept: F) -> Vec<(i64, f64)>
    where
        F: Fn(i64) -> bool,
    {
        let bbox = bounding_box(center, radius_m);
        self.query_bounding_box(&bbox)
            .into_iter()
            .filter(|id| accept(*id))
            .filter_map(|id| {
                let point = self.points.get(&id)?;
                let d = distance(center, point);
                (d <= radius_m).then_some((id, d))
            })
            .collect()
    }

    // Radius of a disc expected to hold `k` entities if they were spread evenly over
    // the index extent.
    fn density_seed_radius(&self, k: usize) -> f64 {
        let envelope = self.tree.root().envelope();
        let lower = envelope.lower();
        let upper = envelope.upper();
        let mid_lat = (lower[1] + upper[1]) / 2.0;
        let width_m = (upper[0] - lower[0]) * meters_per_degree_lon(mid_lat);
        let height_m = (upper[1] - lower[1]) * meters_per_degree_lat();
        let area = (width_m * height_m).max(1.0);
        (area * k as f64 / (PI * self.len() as f64))
            .sqrt()
            .max(MIN_SEED_RADIUS_M)
    }
}

fn validate_radius(radius_m: f64) -> Result<()> {
    if !radius_m.is_finite() || radius_m < 0.0 {
        return Err(SearchError::InvalidQuery(format!(
            "radius must be a non-negative number of meters, got {}",
            radius_m
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    fn sample_index() -> SpatialIndex {
        let mut index = SpatialIndex::new();
        index.insert(1, pt(0.0, 0.0));
        index.insert(2, pt(0.0, 0.01));
        index.insert(3, pt(0.0, 1.0));
        index.insert(4, pt(0.01, 0.0));
        index
    }

    #[test]
    fn insert_moves_existing_id() {
        let mut index = sample_index();
        index.insert(3, pt(0.0, 0.005));
        assert_eq!(index.len(), 4);
        let hits = index.query_radius(&pt(0.0, 0.0), 1_000.0).unwrap();
        assert!(hits.iter().any(|(id, _)| *id == 3));
        let far = bounding_box(&pt(0.0, 1.0), 100.0);
        assert!(index.query_bounding_box(&far).is_empty());
    }

    #[test]
    fn remove_unknown_is_not_found() {
        let mut index = sample_index();
        assert!(matches!(index.remove(99), Err(SearchError::NotFound(99))));
        assert_eq!(index.remove(2).unwrap(), pt(0.0, 0.01));
        assert!(!index.contains(2));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn bounding_box_query_is_exact() {
        let index = sample_index();
        let bbox = BoundingBox::new(-0.001, 0.001, -0.001, 0.011).unwrap();
        assert_eq!(index.query_bounding_box(&bbox), vec![1, 2]);
    }

    #[test]
    fn bounding_box_includes_boundary_points() {
        let index = sample_index();
        let bbox = BoundingBox::new(0.0, 0.01, 0.0, 0.0).unwrap();
        assert_eq!(index.query_bounding_box(&bbox), vec![1, 4]);
    }

    #[test]
    fn radius_results_sorted_by_distance() {
        let index = sample_index();
        let hits = index.query_radius(&pt(0.0, 0.0), 2_000.0).unwrap();
        let ids: Vec<i64> = hits.iter().map(|(id, _)| *id).collect();
        // 2 and 4 are equidistant up to rounding, so only check membership for them.
        assert_eq!(ids[0], 1);
        assert_eq!(hits[0].1, 0.0);
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&2) && ids.contains(&4));
    }

    #[test]
    fn negative_radius_rejected() {
        let index = sample_index();
        assert!(matches!(
            index.query_radius(&pt(0.0, 0.0), -1.0),
            Err(SearchError::InvalidQuery(_))
        ));
    }

    #[test]
    fn k_nearest_returns_sorted_prefix() {
        let index = sample_index();
        let hits = index.query_k_nearest(&pt(0.0, 0.9), 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 3);
        assert!(hits[0].1 <= hits[1].1);
    }

    #[test]
    fn k_nearest_caps_at_total() {
        let index = sample_index();
        assert_eq!(index.query_k_nearest(&pt(10.0, 10.0), 10).unwrap().len(), 4);
    }

    #[test]
    fn k_nearest_zero_k_rejected() {
        assert!(sample_index().query_k_nearest(&pt(0.0, 0.0), 0).is_err());
    }

    #[test]
    fn k_nearest_on_empty_index_is_empty() {
        let index = SpatialIndex::new();
        assert!(index.query_k_nearest(&pt(0.0, 0.0), 3).unwrap().is_empty());
    }

    #[test]
    fn k_nearest_reports_insufficient_coverage() {
        let mut index = SpatialIndex::with_options(IndexOptions {
            knn_seed_radius_m: Some(100.0),
            knn_max_radius_m: 1_000.0,
            sort_radius_results: true,
        });
        index.insert(1, pt(0.0, 0.0));
        index.insert(2, pt(0.0, 1.0));
        let err = index.query_k_nearest(&pt(0.0, 0.0), 2).unwrap_err();
        assert!(matches!(
            err,
            SearchError::InsufficientCoverage {
                found: 1,
                requested: 2,
                ..
            }
        ));
        assert!(err.is_no_result());
    }

    #[test]
    fn k_nearest_matching_skips_rejected_ids() {
        let index = sample_index();
        let hits = index
            .query_k_nearest_matching(&pt(0.0, 0.0), 2, |id| id % 2 == 1)
            .unwrap();
        assert_eq!(hits.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn k_nearest_matching_stops_when_all_matches_found() {
        let mut index = SpatialIndex::with_options(IndexOptions {
            knn_seed_radius_m: Some(500.0),
            knn_max_radius_m: 10_000.0,
            sort_radius_results: true,
        });
        index.insert(1, pt(0.0, 0.001));
        index.insert(2, pt(0.0, 0.002));
        index.insert(3, pt(0.0, 0.003));
        index.insert(4, pt(0.0, 50.0));
        let hits = index
            .query_k_nearest_matching(&pt(0.0, 0.0), 5, |id| id <= 2)
            .unwrap();
        assert_eq!(hits.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![1, 2]);

        let none = index
            .query_k_nearest_matching(&pt(0.0, 0.0), 3, |_| false)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn k_nearest_ties_broken_by_id() {
        let mut index = SpatialIndex::new();
        index.insert(20, pt(0.0, 0.01));
        index.insert(10, pt(0.0, -0.01));
        let hits = index.query_k_nearest(&pt(0.0, 0.0), 1).unwrap();
        assert_eq!(hits[0].0, 10);
    }

    #[test]
    fn radius_query_across_antimeridian() {
        let mut index = SpatialIndex::new();
        index.insert(1, pt(0.0, 179.995));
        index.insert(2, pt(0.0, -179.995));
        index.insert(3, pt(0.0, 170.0));
        let hits = index.query_radius(&pt(0.0, 180.0), 1_000.0).unwrap();
        let mut ids: Vec<i64> = hits.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn bulk_load_rejects_duplicates_atomically() {
        let mut index = SpatialIndex::new();
        let err = index
            .bulk_load(vec![(1, pt(0.0, 0.0)), (2, pt(1.0, 1.0)), (1, pt(2.0, 2.0))])
            .unwrap_err();
        assert!(matches!(err, SearchError::DuplicateId(1)));
        assert!(index.is_empty());

        index
            .bulk_load(vec![(1, pt(0.0, 0.0)), (2, pt(1.0, 1.0))])
            .unwrap();
        assert_eq!(index.ids(), vec![1, 2]);
        assert!(index.bulk_load(vec![(2, pt(0.0, 0.0))]).is_err());
    }
}
