use crate::core::errors::{Result, SearchError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// WGS84 position in degrees. Only constructible through validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPoint")]
pub struct GeoPoint {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct RawPoint {
    lat: f64,
    lon: f64,
}

impl TryFrom<RawPoint> for GeoPoint {
    type Error = SearchError;

    fn try_from(raw: RawPoint) -> Result<Self> {
        GeoPoint::new(raw.lat, raw.lon)
    }
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !lat.is_finite()
            || !lon.is_finite()
            || !(-90.0..=90.0).contains(&lat)
            || !(-180.0..=180.0).contains(&lon)
        {
            return Err(SearchError::InvalidCoordinate { lat, lon });
        }
        Ok(GeoPoint { lat, lon })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Poi {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    pub location: GeoPoint,
}

impl Poi {
    pub fn new(id: i64, name: impl Into<String>, location: GeoPoint) -> Self {
        Poi {
            id,
            name: name.into(),
            tags: HashMap::new(),
            location,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct RoadNode {
    pub id: i64,
    pub location: GeoPoint,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RoadEdge {
    pub source: i64,
    pub target: i64,
    pub length_m: f64,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub directed: bool,
}

impl RoadEdge {
    pub fn new(source: i64, target: i64, length_m: f64) -> Self {
        RoadEdge {
            source,
            target,
            length_m,
            class: None,
            directed: false,
        }
    }

    pub fn directed(mut self) -> Self {
        self.directed = true;
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub nodes: Vec<i64>,
    pub edges: Vec<RoadEdge>,
    pub length_m: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Reachability {
    #[default]
    None,
    Graph {
        cutoff: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagFilter {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl TagFilter {
    pub fn matches(&self, tags: &HashMap<String, String>) -> bool {
        match (tags.get(&self.key), &self.value) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub center: GeoPoint,
    #[serde(default)]
    pub radius_m: Option<f64>,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub reachability: Reachability,
    #[serde(default)]
    pub tag_filter: Vec<TagFilter>,
    #[serde(default)]
    pub include_routes: bool,
}

impl QueryRequest {
    pub fn new(center: GeoPoint) -> Self {
        QueryRequest {
            center,
            radius_m: None,
            k: None,
            offset: 0,
            reachability: Reachability::None,
            tag_filter: Vec::new(),
            include_routes: false,
        }
    }

    pub fn within(mut self, radius_m: f64) -> Self {
        self.radius_m = Some(radius_m);
        self
    }

    pub fn nearest(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    pub fn skip(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn reachable_within(mut self, cutoff: f64) -> Self {
        self.reachability = Reachability::Graph { cutoff };
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: Option<&str>) -> Self {
        self.tag_filter.push(TagFilter {
            key: key.into(),
            value: value.map(str::to_string),
        });
        self
    }

    pub fn with_routes(mut self) -> Self {
        self.include_routes = true;
        self
    }

    pub(crate) fn cutoff(&self) -> Option<f64> {
        match self.reachability {
            Reachability::None => None,
            Reachability::Graph { cutoff } => Some(cutoff),
        }
    }

    pub(crate) fn accepts(&self, poi: &Poi) -> bool {
        self.tag_filter.iter().all(|f| f.matches(&poi.tags))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub poi: Poi,
    pub distance_m: f64,
    pub path_length_m: Option<f64>,
    pub path_cost: Option<f64>,
    pub route: Option<Route>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct QueryResult {
    pub hits: Vec<SearchHit>,
    pub candidates: usize,
    pub dropped: usize,
}

impl QueryResult {
    pub fn ids(&self) -> Vec<i64> {
        self.hits.iter().map(|hit| hit.poi.id).collect()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_point_rejects_out_of_range() {
        assert!(GeoPoint::new(90.0, 180.0).is_ok());
        assert!(GeoPoint::new(-90.0, -180.0).is_ok());
        assert!(matches!(
            GeoPoint::new(90.5, 0.0),
            Err(SearchError::InvalidCoordinate { .. })
        ));
        assert!(GeoPoint::new(0.0, 181.0).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn geo_point_deserialization_validates() {
        let ok: GeoPoint = serde_json::from_str(r#"{"lat": 52.2, "lon": 21.0}"#).unwrap();
        assert_eq!(ok.lat(), 52.2);
        assert!(serde_json::from_str::<GeoPoint>(r#"{"lat": 95.0, "lon": 21.0}"#).is_err());
    }

    #[test]
    fn tag_filter_matches_key_and_value() {
        let location = GeoPoint::new(0.0, 0.0).unwrap();
        let poi = Poi::new(1, "Cafe", location).with_tag("amenity", "cafe");
        let any_amenity = TagFilter {
            key: "amenity".into(),
            value: None,
        };
        let restaurant = TagFilter {
            key: "amenity".into(),
            value: Some("restaurant".into()),
        };
        assert!(any_amenity.matches(&poi.tags));
        assert!(!restaurant.matches(&poi.tags));
    }

    #[test]
    fn query_request_from_json_uses_defaults() {
        let request: QueryRequest = serde_json::from_str(
            r#"{"center": {"lat": 0.0, "lon": 0.0}, "k": 3,
                "reachability": {"mode": "graph", "cutoff": 1500.0}}"#,
        )
        .unwrap();
        assert_eq!(request.k, Some(3));
        assert_eq!(request.offset, 0);
        assert_eq!(request.cutoff(), Some(1500.0));
        assert!(request.tag_filter.is_empty());
    }
}
