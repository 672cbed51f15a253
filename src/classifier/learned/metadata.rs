//! Learned-model metadata document.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::catalog::{Region, RegionCatalog};
use crate::error_handling::ModelError;

/// Wire form of `inferred_region-metadata.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawModelMetadata {
    pub feature_count: usize,
    #[serde(default)]
    pub feature_names: Vec<String>,
    pub class_index_to_region_id: HashMap<String, String>,
    #[serde(default)]
    pub regions: Vec<Region>,
}

/// Validated metadata: a dense class table resolved against the catalog.
#[derive(Debug, Clone)]
pub struct ModelMetadata {
    pub feature_count: usize,
    pub feature_names: Vec<String>,
    /// Region for each class index
    classes: Vec<Region>,
}

impl ModelMetadata {
    /// Reads and validates the metadata file.
    pub async fn load(path: &Path, catalog: &RegionCatalog) -> Result<Self, ModelError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ModelError::InvalidMetadata(format!("{}: {e}", path.display())))?;
        Self::parse(&content, catalog)
    }

    pub fn parse(content: &str, catalog: &RegionCatalog) -> Result<Self, ModelError> {
        let raw: RawModelMetadata =
            serde_json::from_str(content).map_err(|e| ModelError::InvalidMetadata(e.to_string()))?;
        Self::validate(raw, catalog)
    }

    /// Checks the class map is dense and zero-based, and that every class
    /// resolves to a region, preferring the catalog over the metadata copy.
    pub fn validate(raw: RawModelMetadata, catalog: &RegionCatalog) -> Result<Self, ModelError> {
        if raw.feature_count == 0 {
            return Err(ModelError::InvalidMetadata(
                "featureCount must be positive".to_string(),
            ));
        }
        if !raw.feature_names.is_empty() && raw.feature_names.len() != raw.feature_count {
            return Err(ModelError::InvalidMetadata(format!(
                "{} feature names for {} features",
                raw.feature_names.len(),
                raw.feature_count
            )));
        }
        if raw.class_index_to_region_id.is_empty() {
            return Err(ModelError::InvalidMetadata("no classes".to_string()));
        }

        let supplements: HashMap<&str, &Region> = raw
            .regions
            .iter()
            .map(|r| (r.region_id.as_str(), r))
            .collect();

        let mut classes = Vec::with_capacity(raw.class_index_to_region_id.len());
        for index in 0..raw.class_index_to_region_id.len() {
            let region_id = raw
                .class_index_to_region_id
                .get(&index.to_string())
                .ok_or_else(|| ModelError::InvalidMetadata(format!("class index {index} missing")))?;
            let region = catalog
                .get(region_id)
                .or_else(|| supplements.get(region_id.as_str()).copied())
                .ok_or_else(|| {
                    ModelError::InvalidMetadata(format!("class {index} maps to unknown region {region_id}"))
                })?;
            classes.push(region.clone());
        }

        Ok(ModelMetadata {
            feature_count: raw.feature_count,
            feature_names: raw.feature_names,
            classes,
        })
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn region_for_class(&self, index: usize) -> Option<&Region> {
        self.classes.get(index)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::metadata_json;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_dense_class_map() {
        let metadata =
            ModelMetadata::parse(&metadata_json(10), &RegionCatalog::builtin()).expect("valid metadata");
        assert_eq!(metadata.feature_count, 10);
        assert_eq!(metadata.class_count(), 3);
        assert_eq!(
            metadata.region_for_class(1).map(|r| r.region_id.as_str()),
            Some("eu-fra")
        );
        assert!(metadata.region_for_class(3).is_none());
    }

    #[test]
    fn test_gap_in_class_indices_rejected() {
        let json = r#"{"featureCount": 10, "classIndexToRegionId": {"0": "eu-ams", "2": "eu-fra"}}"#;
        let result = ModelMetadata::parse(json, &RegionCatalog::builtin());
        assert!(matches!(result, Err(ModelError::InvalidMetadata(msg)) if msg.contains("index 1")));
    }

    #[test]
    fn test_unknown_region_rejected_unless_supplied() {
        let catalog = RegionCatalog::builtin();
        let unknown = r#"{"featureCount": 10, "classIndexToRegionId": {"0": "sa-sao"}}"#;
        assert!(ModelMetadata::parse(unknown, &catalog).is_err());

        let supplied = r#"{
            "featureCount": 10,
            "classIndexToRegionId": {"0": "sa-sao"},
            "regions": [{"regionId": "sa-sao", "regionName": "Sao Paulo Metro",
                         "countryCode": "BR", "latitude": -23.55, "longitude": -46.63}]
        }"#;
        let metadata = ModelMetadata::parse(supplied, &catalog).expect("supplement resolves");
        assert_eq!(
            metadata.region_for_class(0).map(|r| r.country_code.as_str()),
            Some("BR")
        );
    }

    #[test]
    fn test_feature_names_must_match_count() {
        let json = r#"{"featureCount": 3, "featureNames": ["a", "b"], "classIndexToRegionId": {"0": "eu-ams"}}"#;
        assert!(ModelMetadata::parse(json, &RegionCatalog::builtin()).is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_invalid_metadata() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let result =
            ModelMetadata::load(&temp_dir.path().join("missing.json"), &RegionCatalog::builtin()).await;
        assert!(matches!(result, Err(ModelError::InvalidMetadata(_))));
    }
}
