//! Learned region classifier.
//!
//! Wraps a pre-trained multi-class model. The model sees a fixed feature row,
//! returns one raw score per class, and the class table in the metadata maps
//! scores back onto regions. Any inconsistency between the extractor, the
//! metadata and the model output fails the call so the composite falls back.

mod features;
mod metadata;
mod model;

use std::path::Path;

use super::{Classification, ClassificationContext, RegionCandidate, RegionClassifier};
use crate::catalog::RegionCatalog;
use crate::config::MAX_CANDIDATES;
use crate::error_handling::ModelError;

pub use features::{FeatureExtractor, VisitFeatures, FEATURE_NAMES};
pub use metadata::{ModelMetadata, RawModelMetadata};
#[cfg(feature = "onnx")]
pub use model::OnnxScoreModel;
pub use model::ScoreModel;

#[cfg(test)]
pub(crate) use metadata::test_support;

pub(crate) const STRATEGY_NAME: &str = "learned";

pub struct LearnedClassifier {
    model: Box<dyn ScoreModel>,
    metadata: ModelMetadata,
    extractor: Box<dyn FeatureExtractor>,
}

impl std::fmt::Debug for LearnedClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearnedClassifier")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl LearnedClassifier {
    /// Builds a classifier using the default visit features.
    pub fn new(model: Box<dyn ScoreModel>, metadata: ModelMetadata) -> Self {
        Self::with_extractor(model, metadata, Box::new(VisitFeatures))
    }

    pub fn with_extractor(
        model: Box<dyn ScoreModel>,
        metadata: ModelMetadata,
        extractor: Box<dyn FeatureExtractor>,
    ) -> Self {
        LearnedClassifier {
            model,
            metadata,
            extractor,
        }
    }

    /// Loads the ONNX artifact and its metadata.
    #[cfg(feature = "onnx")]
    pub async fn load(
        model_path: &Path,
        metadata_path: &Path,
        catalog: &RegionCatalog,
    ) -> Result<Self, ModelError> {
        let metadata = ModelMetadata::load(metadata_path, catalog).await?;
        let model_path = model_path.to_path_buf();
        let model = tokio::task::spawn_blocking(move || OnnxScoreModel::load(&model_path))
            .await
            .map_err(|e| ModelError::InferenceFailed(format!("model loader panicked: {e}")))??;
        log::info!(
            "Learned region model ready: {} features, {} classes",
            metadata.feature_count,
            metadata.class_count()
        );
        Ok(Self::new(Box::new(model), metadata))
    }

    /// Without the `onnx` feature there is no runtime to load the artifact.
    #[cfg(not(feature = "onnx"))]
    pub async fn load(
        model_path: &Path,
        _metadata_path: &Path,
        _catalog: &RegionCatalog,
    ) -> Result<Self, ModelError> {
        Err(ModelError::ArtifactUnavailable {
            path: model_path.display().to_string(),
            reason: "built without the `onnx` feature".to_string(),
        })
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

impl RegionClassifier for LearnedClassifier {
    fn name(&self) -> &'static str {
        STRATEGY_NAME
    }

    fn classify(&self, context: &ClassificationContext) -> Result<Option<Classification>, ModelError> {
        let features = self.extractor.extract(context);
        if features.len() != self.metadata.feature_count {
            return Err(ModelError::FeatureMismatch {
                computed: features.len(),
                declared: self.metadata.feature_count,
            });
        }

        let scores = self.model.scores(&features)?;
        if scores.len() != self.metadata.class_count() {
            return Err(ModelError::OutputMismatch {
                scores: scores.len(),
                classes: self.metadata.class_count(),
            });
        }

        let probabilities = softmax(&scores);
        let mut ranked: Vec<(usize, f64)> = probabilities.into_iter().enumerate().collect();
        ranked.sort_by(|(ia, pa), (ib, pb)| pb.total_cmp(pa).then(ia.cmp(ib)));

        let mut candidates = Vec::with_capacity(MAX_CANDIDATES);
        for (index, probability) in ranked.iter().take(MAX_CANDIDATES) {
            let region = self.metadata.region_for_class(*index).ok_or_else(|| {
                ModelError::InvalidMetadata(format!("class {index} has no region"))
            })?;
            candidates.push(RegionCandidate {
                region_id: region.region_id.clone(),
                confidence: *probability,
            });
        }

        let Some(&(top_index, confidence)) = ranked.first() else {
            return Ok(None);
        };
        let region = self
            .metadata
            .region_for_class(top_index)
            .cloned()
            .ok_or_else(|| ModelError::InvalidMetadata(format!("class {top_index} has no region")))?;

        Ok(Some(Classification {
            region,
            confidence,
            candidates,
            strategy: STRATEGY_NAME,
        }))
    }

    fn is_cpu_bound(&self) -> bool {
        true
    }
}

/// Numerically stable softmax.
pub(crate) fn softmax(scores: &[f32]) -> Vec<f64> {
    let max = scores
        .iter()
        .map(|s| f64::from(*s))
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (f64::from(*s) - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}


#[cfg(test)]
mod tests {
    use super::fakes::{three_class_metadata, FixedScores, TruncatedFeatures};
    use super::*;
    use crate::probe::VpnSignal;
    use chrono::Utc;

    fn context() -> ClassificationContext {
        ClassificationContext {
            timestamp: Utc::now(),
            timezone_offset_minutes: Some(60),
            locale: Some("de-DE".to_string()),
            vpn: VpnSignal::default(),
            reference_point: None,
            correlation: None,
        }
    }

    #[test]
    fn test_softmax_sums_to_one_and_preserves_order() {
        let probabilities = softmax(&[1.0, 3.0, 2.0]);
        assert!((probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(probabilities[1] > probabilities[2] && probabilities[2] > probabilities[0]);
        // Large logits do not overflow
        let large = softmax(&[1000.0, 1000.0]);
        assert!((large[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_top_class_and_candidates() {
        let classifier = LearnedClassifier::new(
            Box::new(FixedScores::new(vec![0.1, 2.5, 0.3])),
            three_class_metadata(),
        );
        let result = classifier
            .classify(&context())
            .expect("inference succeeds")
            .expect("classification");
        assert_eq!(result.region.region_id, "eu-fra");
        assert_eq!(result.strategy, "learned");
        let ids: Vec<&str> = result.candidates.iter().map(|c| c.region_id.as_str()).collect();
        assert_eq!(ids, vec!["eu-fra", "us-nyc", "eu-ams"]);
        assert_eq!(result.confidence, result.candidates[0].confidence);
        assert!(result.confidence > 0.5 && result.confidence < 1.0);
    }

    #[test]
    fn test_feature_count_mismatch_fails_closed() {
        let model = FixedScores::new(vec![0.1, 2.5, 0.3]);
        let classifier = LearnedClassifier::with_extractor(
            Box::new(model),
            three_class_metadata(),
            Box::new(TruncatedFeatures),
        );
        let result = classifier.classify(&context());
        assert!(matches!(
            result,
            Err(ModelError::FeatureMismatch {
                computed: 8,
                declared: 10
            })
        ));
    }

    #[test]
    fn test_score_count_mismatch_fails() {
        let classifier = LearnedClassifier::new(
            Box::new(FixedScores::new(vec![0.1, 2.5])),
            three_class_metadata(),
        );
        let result = classifier.classify(&context());
        assert!(matches!(
            result,
            Err(ModelError::OutputMismatch {
                scores: 2,
                classes: 3
            })
        ));
        assert_eq!(
            result.err().map(|e| e.error_type()),
            Some(crate::error_handling::ErrorType::ModelInferenceError)
        );
    }

    #[cfg(not(feature = "onnx"))]
    #[tokio::test]
    async fn test_load_without_runtime_is_unavailable() {
        let result = LearnedClassifier::load(
            Path::new("Models/inferred_region.onnx"),
            Path::new("Models/inferred_region-metadata.json"),
            &RegionCatalog::builtin(),
        )
        .await;
        assert!(matches!(result, Err(ModelError::ArtifactUnavailable { .. })));
    }
}
