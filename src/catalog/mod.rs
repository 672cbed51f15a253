//! Static metro-region catalog.
//!
//! The catalog is built once at startup and shared by `Arc` into the engine.
//! It is never mutated afterwards, so concurrent readers need no locking.
//! An empty catalog is legal; the engine then answers "unknown" for every visit.

mod loader;
mod types;

use std::collections::HashMap;

// Re-export public API
pub use loader::load_catalog;
pub use types::{GeoPoint, Region};

use crate::error_handling::CatalogError;

/// Read-only table of metro regions, indexed by id and by country.
#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    regions: Vec<Region>,
    by_id: HashMap<String, usize>,
    by_country: HashMap<String, Vec<usize>>,
}

impl RegionCatalog {
    /// Builds a catalog, rejecting duplicate region ids.
    pub fn new(regions: Vec<Region>) -> Result<Self, CatalogError> {
        let mut by_id = HashMap::with_capacity(regions.len());
        let mut by_country: HashMap<String, Vec<usize>> = HashMap::new();

        for (idx, region) in regions.iter().enumerate() {
            if by_id.insert(region.region_id.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateRegion(region.region_id.clone()));
            }
            by_country
                .entry(region.country_code.to_ascii_uppercase())
                .or_default()
                .push(idx);
        }

        // Country lists are kept alphabetical so "first" is well defined
        for indices in by_country.values_mut() {
            indices.sort_by(|a, b| regions[*a].region_name.cmp(&regions[*b].region_name));
        }

        Ok(RegionCatalog {
            regions,
            by_id,
            by_country,
        })
    }

    /// The built-in ten-metro catalog.
    pub fn builtin() -> Self {
        // Built-in ids are unique
        Self::new(loader::builtin_regions()).unwrap_or_default()
    }

    pub fn get(&self, region_id: &str) -> Option<&Region> {
        self.by_id.get(region_id).map(|idx| &self.regions[*idx])
    }

    /// Regions of one country (case-insensitive code), sorted by name.
    pub fn in_country(&self, country_code: &str) -> Vec<&Region> {
        self.by_country
            .get(&country_code.to_ascii_uppercase())
            .map(|indices| indices.iter().map(|idx| &self.regions[*idx]).collect())
            .unwrap_or_default()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
