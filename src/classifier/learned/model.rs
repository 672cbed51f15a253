//! Scoring backends for the learned classifier.

use crate::error_handling::ModelError;

/// A multi-class model producing one raw score per class for a feature row.
///
/// Calls are blocking and may be CPU-heavy; the composite classifier runs them
/// on the blocking pool.
pub trait ScoreModel: Send + Sync {
    fn scores(&self, features: &[f32]) -> Result<Vec<f32>, ModelError>;
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxScoreModel;

#[cfg(feature = "onnx")]
mod onnx {
    use std::path::Path;
    use std::sync::Mutex;

    use ort::session::Session;
    use ort::value::Tensor;

    use super::ScoreModel;
    use crate::error_handling::ModelError;

    /// ONNX Runtime session over `inferred_region.onnx`.
    pub struct OnnxScoreModel {
        /// `Session::run` needs `&mut self`
        session: Mutex<Session>,
        path: String,
    }

    impl std::fmt::Debug for OnnxScoreModel {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("OnnxScoreModel")
                .field("path", &self.path)
                .finish()
        }
    }

    impl OnnxScoreModel {
        /// Loads the model artifact.
        pub fn load(model_path: &Path) -> Result<Self, ModelError> {
            let path = model_path.display().to_string();
            let unavailable = |reason: String| ModelError::ArtifactUnavailable {
                path: path.clone(),
                reason,
            };
            if !model_path.exists() {
                return Err(unavailable("model file not found".to_string()));
            }

            let session = Session::builder()
                .map_err(|e| unavailable(e.to_string()))?
                .with_intra_threads(1)
                .map_err(|e| unavailable(e.to_string()))?
                .commit_from_file(model_path)
                .map_err(|e| unavailable(e.to_string()))?;

            log::debug!("Loaded ONNX region model from {path}");
            Ok(OnnxScoreModel {
                session: Mutex::new(session),
                path,
            })
        }
    }

    impl ScoreModel for OnnxScoreModel {
        fn scores(&self, features: &[f32]) -> Result<Vec<f32>, ModelError> {
            let input = Tensor::from_array((vec![1i64, features.len() as i64], features.to_vec()))
                .map_err(|e| ModelError::InferenceFailed(format!("tensor creation error: {e}")))?;

            let mut session = self
                .session
                .lock()
                .map_err(|e| ModelError::InferenceFailed(format!("session lock poisoned: {e}")))?;
            let outputs = session
                .run(ort::inputs![input])
                .map_err(|e| ModelError::InferenceFailed(e.to_string()))?;

            // Classifier exports emit an int64 label tensor next to the float
            // scores; take the first float tensor.
            for (_name, output) in outputs.iter() {
                if let Ok((_shape, data)) = output.try_extract_tensor::<f32>() {
                    return Ok(data.to_vec());
                }
            }
            Err(ModelError::InferenceFailed(
                "model produced no float score tensor".to_string(),
            ))
        }
    }
}

#[cfg(all(test, feature = "onnx"))]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_missing_artifact_is_unavailable() {
        let result = OnnxScoreModel::load(Path::new("nonexistent/inferred_region.onnx"));
        assert!(matches!(
            result,
            Err(ModelError::ArtifactUnavailable { .. })
        ));
    }
}
