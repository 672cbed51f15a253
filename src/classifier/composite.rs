//! Ordered fallback over classification strategies.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;

use super::{Classification, ClassificationContext, RegionClassifier};
use crate::config::EngineSettings;
use crate::error_handling::{ErrorType, ModelError};
use crate::initialization::init_semaphore;

/// Why a strategy produced nothing for one visit.
#[derive(Error, Debug)]
pub enum StrategyFailure {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("strategy exceeded {0:?}")]
    Timeout(Duration),

    #[error("strategy worker failed: {0}")]
    Worker(String),
}

impl StrategyFailure {
    pub fn error_type(&self) -> ErrorType {
        match self {
            StrategyFailure::Model(e) => e.error_type(),
            StrategyFailure::Timeout(_) => ErrorType::ModelTimeout,
            StrategyFailure::Worker(_) => ErrorType::ModelInferenceError,
        }
    }
}

/// Result of running the chain for one visit.
#[derive(Debug, Default)]
pub struct CompositeOutcome {
    pub classification: Option<Classification>,
    /// Strategies that failed before the answer was found, in order
    pub failures: Vec<(&'static str, StrategyFailure)>,
}

/// Runs strategies in order until one returns a classification.
///
/// CPU-bound strategies run on the blocking pool, at most `model_workers` at a
/// time, each under the model timeout. A timed-out call keeps its worker
/// slot until it finishes, so a slow model cannot pile up threads.
#[derive(Clone)]
pub struct CompositeClassifier {
    strategies: Vec<Arc<dyn RegionClassifier>>,
    workers: Arc<Semaphore>,
    timeout: Duration,
}

impl std::fmt::Debug for CompositeClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("CompositeClassifier")
            .field("strategies", &names)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl CompositeClassifier {
    pub fn new(strategies: Vec<Arc<dyn RegionClassifier>>, settings: &EngineSettings) -> Self {
        CompositeClassifier {
            strategies,
            workers: init_semaphore(settings.model_workers),
            timeout: settings.model_timeout,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// First non-empty answer wins. All strategies failing or abstaining
    /// yields no classification, never an error.
    pub async fn classify(&self, context: &ClassificationContext) -> CompositeOutcome {
        let mut outcome = CompositeOutcome::default();
        for strategy in &self.strategies {
            let result = if strategy.is_cpu_bound() {
                self.run_blocking(Arc::clone(strategy), context.clone()).await
            } else {
                strategy.classify(context).map_err(StrategyFailure::from)
            };

            match result {
                Ok(Some(classification)) => {
                    outcome.classification = Some(classification);
                    return outcome;
                }
                Ok(None) => {
                    log::debug!("Strategy {} had no answer", strategy.name());
                }
                Err(failure) => {
                    log::debug!("Strategy {} failed: {failure}", strategy.name());
                    outcome.failures.push((strategy.name(), failure));
                }
            }
        }
        outcome
    }

    async fn run_blocking(
        &self,
        strategy: Arc<dyn RegionClassifier>,
        context: ClassificationContext,
    ) -> Result<Option<Classification>, StrategyFailure> {
        let workers = Arc::clone(&self.workers);
        let task = async move {
            let permit = workers
                .acquire_owned()
                .await
                .map_err(|e| StrategyFailure::Worker(e.to_string()))?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                strategy.classify(&context)
            })
            .await
            .map_err(|e| StrategyFailure::Worker(e.to_string()))?
            .map_err(StrategyFailure::from)
        };

        tokio::time::timeout(self.timeout, task)
            .await
            .map_err(|_| StrategyFailure::Timeout(self.timeout))?
    }
}
