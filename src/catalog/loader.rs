//! Region catalog loading.
//!
//! The catalog comes from a JSON file (an array of regions, the same shape
//! the model metadata uses) or, when no file is configured, from the built-in
//! metro list the shipped model was trained on.

use std::path::Path;

use super::types::Region;
use super::RegionCatalog;
use crate::error_handling::CatalogError;

/// Loads the catalog from `path`, or the built-in catalog when `path` is `None`.
pub async fn load_catalog(path: Option<&Path>) -> Result<RegionCatalog, CatalogError> {
    let Some(path) = path else {
        log::info!("Using built-in region catalog");
        return Ok(RegionCatalog::builtin());
    };

    let content = tokio::fs::read_to_string(path).await?;
    let regions: Vec<Region> = serde_json::from_str(&content)?;
    let catalog = RegionCatalog::new(regions)?;
    log::info!(
        "Loaded {} regions from {}",
        catalog.len(),
        path.display()
    );
    Ok(catalog)
}

#[allow(clippy::too_many_arguments)]
fn region(
    region_id: &str,
    region_name: &str,
    country_code: &str,
    latitude: f64,
    longitude: f64,
    timezone: &str,
    population: u64,
    continent: &str,
) -> Region {
    Region {
        region_id: region_id.to_string(),
        region_name: region_name.to_string(),
        country_code: country_code.to_string(),
        latitude,
        longitude,
        timezone: Some(timezone.to_string()),
        population: Some(population),
        continent: Some(continent.to_string()),
    }
}

/// The metro regions the shipped model knows about.
pub(crate) fn builtin_regions() -> Vec<Region> {
    vec![
        region("eu-ams", "Amsterdam Metro", "NL", 52.3676, 4.9041, "Europe/Amsterdam", 2_480_000, "EU"),
        region("eu-bru", "Brussels Metro", "BE", 50.8503, 4.3517, "Europe/Brussels", 2_100_000, "EU"),
        region("eu-fra", "Frankfurt Metro", "DE", 50.1109, 8.6821, "Europe/Berlin", 2_300_000, "EU"),
        region("eu-ber", "Berlin Metro", "DE", 52.5200, 13.4050, "Europe/Berlin", 4_500_000, "EU"),
        region("eu-par", "Paris Metro", "FR", 48.8566, 2.3522, "Europe/Paris", 12_300_000, "EU"),
        region("eu-lon", "London Metro", "GB", 51.5074, -0.1278, "Europe/London", 14_800_000, "EU"),
        region("us-nyc", "New York Metro", "US", 40.7128, -74.0060, "America/New_York", 19_500_000, "NA"),
        region("us-lax", "Los Angeles Metro", "US", 34.0522, -118.2437, "America/Los_Angeles", 12_800_000, "NA"),
        region("us-chi", "Chicago Metro", "US", 41.8781, -87.6298, "America/Chicago", 9_400_000, "NA"),
        region("ap-tok", "Tokyo Metro", "JP", 35.6762, 139.6503, "Asia/Tokyo", 37_400_000, "AS"),
    ]
}
