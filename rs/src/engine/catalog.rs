use crate::core::config::IndexOptions;
use crate::core::errors::{Result, SearchError};
use crate::core::types::Poi;
use crate::spatial::SpatialIndex;
use rustc_hash::FxHashMap;

/// POI records plus the spatial index over their locations. Both are always
/// updated together.
#[derive(Debug, Clone)]
pub struct PoiCatalog {
    pois: FxHashMap<i64, Poi>,
    index: SpatialIndex,
}

impl PoiCatalog {
    pub fn new(options: IndexOptions) -> Self {
        PoiCatalog {
            pois: FxHashMap::default(),
            index: SpatialIndex::with_options(options),
        }
    }

    pub fn len(&self) -> usize {
        self.pois.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pois.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Poi> {
        self.pois.get(&id)
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// POIs ordered by id.
    pub fn pois(&self) -> Vec<&Poi> {
        let mut pois: Vec<&Poi> = self.pois.values().collect();
        pois.sort_unstable_by_key(|poi| poi.id);
        pois
    }

    pub fn upsert(&mut self, poi: Poi) -> Option<Poi> {
        self.index.insert(poi.id, poi.location);
        self.pois.insert(poi.id, poi)
    }

    pub fn update(&mut self, poi: Poi) -> Result<Poi> {
        let id = poi.id;
        if !self.pois.contains_key(&id) {
            return Err(SearchError::NotFound(id));
        }
        self.upsert(poi).ok_or(SearchError::NotFound(id))
    }

    pub fn remove(&mut self, id: i64) -> Result<Poi> {
        self.index.remove(id)?;
        self.pois.remove(&id).ok_or(SearchError::NotFound(id))
    }

    pub fn bulk_load(&mut self, pois: Vec<Poi>) -> Result<usize> {
        let count = pois.len();
        self.index
            .bulk_load(pois.iter().map(|poi| (poi.id, poi.location)).collect())?;
        self.pois.extend(pois.into_iter().map(|poi| (poi.id, poi)));
        Ok(count)
    }
}
