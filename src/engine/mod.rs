//! Per-visit region inference.
//!
//! The engine runs once per stored visit:
//! probes → pattern → cluster match (exact, then fuzzy) → cluster update or
//! creation → location vote → classification chain → mismatch flags.
//!
//! Nothing here fails the visit. Every failure is logged with the visitor and
//! visit ids, counted in [`ProcessingStats`], and the visit simply gets no
//! region.

mod locks;
mod types;

use std::sync::Arc;

use log::{debug, error, info, warn};

// Re-export public API
pub use locks::VisitorLocks;
pub use types::{ClusterPlacement, InferenceResult};

use crate::catalog::RegionCatalog;
use crate::classifier::{ClassificationContext, CompositeClassifier};
use crate::config::EngineSettings;
use crate::correlation::{
    Correlation, ExactCheck, LocationInferer, SimilarityMatcher, SimilarityScore,
};
use crate::error_handling::{DatabaseError, EngineError, ErrorType, InfoType, ProcessingStats};
use crate::mismatch::MismatchDetector;
use crate::pattern::{build_pattern, Pattern, PatternSignature};
use crate::probe::Visit;
use crate::storage::CorrelationRepository;

/// Correlates visits into clusters and assigns each a metro region.
pub struct InferenceEngine<R> {
    repository: R,
    catalog: Arc<RegionCatalog>,
    classifier: CompositeClassifier,
    matcher: SimilarityMatcher,
    inferer: LocationInferer,
    detector: MismatchDetector,
    locks: VisitorLocks,
    stats: Arc<ProcessingStats>,
}

impl<R: CorrelationRepository> InferenceEngine<R> {
    pub fn new(
        repository: R,
        catalog: Arc<RegionCatalog>,
        classifier: CompositeClassifier,
        settings: &EngineSettings,
        stats: Arc<ProcessingStats>,
    ) -> Self {
        if catalog.is_empty() {
            warn!("Region catalog is empty; every visit will be left without a region");
        }
        InferenceEngine {
            repository,
            catalog,
            classifier,
            matcher: SimilarityMatcher::new(settings),
            inferer: LocationInferer::new(settings),
            detector: MismatchDetector::new(settings),
            locks: VisitorLocks::new(),
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<ProcessingStats> {
        &self.stats
    }

    pub fn catalog(&self) -> &Arc<RegionCatalog> {
        &self.catalog
    }

    /// Infers a region for one visit. `None` means "unknown".
    pub async fn process_visit(&self, visit: &Visit) -> Option<InferenceResult> {
        if self.catalog.is_empty() {
            self.stats.increment_info(InfoType::NoClassification);
            return None;
        }

        match self.try_process(visit).await {
            Ok(result) => result,
            Err(EngineError::StoreUnavailable(e)) => {
                error!(
                    "visitor={} visit={}: correlation store unavailable, skipping region inference: {e}",
                    visit.visitor_id, visit.visit_id
                );
                self.stats.increment_error(ErrorType::StoreUnavailable);
                None
            }
        }
    }

    async fn try_process(&self, visit: &Visit) -> Result<Option<InferenceResult>, EngineError> {
        let pattern = build_pattern(&visit.probes);

        let (placement, correlation) = {
            let _guard = self.locks.lock(&visit.visitor_id).await;
            if pattern.is_empty() {
                self.stats.increment_info(InfoType::InputIncomplete);
                debug!(
                    "visitor={} visit={}: no successful probes, skipping correlation",
                    visit.visitor_id, visit.visit_id
                );
                let latest = self
                    .repository
                    .latest_for_visitor(&visit.visitor_id)
                    .await?;
                (ClusterPlacement::Skipped, latest)
            } else {
                let cluster = self.correlate(visit, &pattern).await?;
                (cluster.0, Some(cluster.1))
            }
        };

        debug!(
            "visitor={} visit={}: cluster placement {:?}",
            visit.visitor_id, visit.visit_id, placement
        );

        let correlation_id = correlation.as_ref().and_then(|c| c.id);
        let context = ClassificationContext::from_visit(visit, correlation);
        let outcome = self.classifier.classify(&context).await;

        for (strategy, failure) in &outcome.failures {
            warn!(
                "visitor={} visit={}: {strategy} classifier fell through: {failure}",
                visit.visitor_id, visit.visit_id
            );
            self.stats.increment_error(failure.error_type());
        }

        let Some(classification) = outcome.classification else {
            self.stats.increment_info(InfoType::NoClassification);
            info!(
                "visitor={} visit={}: no region could be inferred",
                visit.visitor_id, visit.visit_id
            );
            return Ok(None);
        };

        self.stats.increment_info(match classification.strategy {
            crate::classifier::learned::STRATEGY_NAME => InfoType::LearnedClassification,
            _ => InfoType::HeuristicClassification,
        });

        let mismatches =
            self.detector
                .detect(visit, &classification.region, context.correlation.as_ref());

        info!(
            "visitor={} visit={}: region {} ({:.2}) via {}",
            visit.visitor_id,
            visit.visit_id,
            classification.region.region_id,
            classification.confidence,
            classification.strategy
        );

        Ok(Some(InferenceResult {
            region_id: classification.region.region_id,
            region_name: classification.region.region_name,
            country_code: classification.region.country_code,
            confidence: classification.confidence,
            candidates: classification.candidates,
            mismatches,
            strategy: classification.strategy,
            correlation_id,
        }))
    }

    /// Places a non-empty pattern into the visitor's clusters and persists
    /// the result. Must run under the visitor's lock.
    async fn correlate(
        &self,
        visit: &Visit,
        pattern: &Pattern,
    ) -> Result<(ClusterPlacement, Correlation), DatabaseError> {
        let signature = PatternSignature::of(pattern);
        let estimate = self.inferer.infer(pattern);
        let mut signature_taken = false;

        if let Some(mut cluster) = self
            .repository
            .find_by_signature(&visit.visitor_id, &signature)
            .await?
        {
            match self.matcher.verify_exact(pattern, &cluster) {
                ExactCheck::Verified => {
                    cluster.absorb(
                        pattern,
                        signature,
                        &SimilarityScore::identical(pattern),
                        visit.timestamp,
                    )?;
                    self.apply_estimate(visit, &mut cluster, &estimate);
                    self.repository.update(&cluster).await?;
                    self.stats.increment_info(InfoType::ExactClusterMatch);
                    return Ok((ClusterPlacement::Exact, cluster));
                }
                ExactCheck::Collision => {
                    warn!(
                        "visitor={} visit={}: signature {} collides with a different stored pattern",
                        visit.visitor_id, visit.visit_id, signature
                    );
                    self.stats.increment_info(InfoType::SignatureCollision);
                    signature_taken = true;
                }
                ExactCheck::InvalidSnapshot(e) => {
                    warn!(
                        "visitor={} visit={}: cluster {:?} has an unusable snapshot: {e}",
                        visit.visitor_id, visit.visit_id, cluster.id
                    );
                    self.stats.increment_error(ErrorType::InvalidClusterSnapshot);
                    signature_taken = true;
                }
            }
        }

        let clusters = self.repository.list_for_visitor(&visit.visitor_id).await?;
        let fuzzy = self.matcher.find_fuzzy(pattern, &clusters);
        for (cluster, e) in &fuzzy.skipped {
            // The exact-hit cluster was already reported above
            if signature_taken && cluster.signature == signature {
                continue;
            }
            warn!(
                "visitor={} visit={}: skipping cluster {:?}: {e}",
                visit.visitor_id, visit.visit_id, cluster.id
            );
            self.stats.increment_error(ErrorType::InvalidClusterSnapshot);
        }

        if let Some((matched, score)) = fuzzy.best {
            let mut cluster = matched.clone();
            // Another row already owns this signature; keep the cluster's own
            let new_signature = if signature_taken && cluster.signature != signature {
                cluster.signature.clone()
            } else {
                signature
            };
            cluster.absorb(pattern, new_signature, &score, visit.timestamp)?;
            self.apply_estimate(visit, &mut cluster, &estimate);
            self.repository.update(&cluster).await?;
            self.stats.increment_info(InfoType::FuzzyClusterMatch);
            debug!(
                "visitor={} visit={}: merged into cluster {:?} (similarity {:.3})",
                visit.visitor_id, visit.visit_id, cluster.id, score.similarity
            );
            return Ok((ClusterPlacement::Fuzzy, cluster));
        }

        let mut cluster =
            Correlation::new_cluster(&visit.visitor_id, pattern, signature, visit.timestamp)?;
        self.apply_estimate(visit, &mut cluster, &estimate);
        let stored = self.repository.insert(&cluster).await?;
        self.stats.increment_info(InfoType::NewCluster);
        debug!(
            "visitor={} visit={}: started cluster {:?}",
            visit.visitor_id, visit.visit_id, stored.id
        );
        Ok((ClusterPlacement::Created, stored))
    }

    fn apply_estimate(
        &self,
        visit: &Visit,
        cluster: &mut Correlation,
        estimate: &crate::correlation::LocationEstimate,
    ) {
        if self.inferer.apply(cluster, estimate, &visit.vpn) {
            info!(
                "visitor={} visit={}: VPN reports {:?} but latency places the visitor in {:?}",
                visit.visitor_id,
                visit.visit_id,
                visit.vpn.reported_country,
                cluster.vpn_true_location
            );
        }
    }
}
