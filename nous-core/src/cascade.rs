//! Evolution cascade: a threshold-triggered batch pass over the whole graph.
//!
//! Four steps, each independently fault-tolerant:
//!
//! 1. **Strengthen**: every concept gains `min(max_degree_boost,
//!    degree_step × degree)` strength and half that in confidence.
//! 2. **PageRank boost**: `strength += pagerank_boost × pagerank`.
//! 3. **Cluster**: greedy-modularity communities, small ones discarded.
//! 4. **Pattern reweight**: effective interaction patterns are folded into
//!    the response-pattern weight table.
//!
//! The analytics part ([`EvolutionCascade::analyze`]) only reads a graph
//! snapshot, so callers can run it without holding the engine lock. The
//! apply part ([`EvolutionCascade::apply`]) commits each step in its own
//! transaction: a failure mid-cascade leaves partial but consistent
//! progress.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::config::CascadeConfig;
use crate::error::Result;
use crate::events::{EvolutionEvent, EvolutionEventKind};
use crate::graph::analytics::AnalyticsGraph;
use crate::graph::{ConceptGraph, ConceptGraphStore};
use crate::metrics::NousCounters;
use crate::pattern::ResponsePatternWeight;
use crate::persistence::PersistenceLayer;
use crate::types::{Concept, ConceptId, KnowledgeCluster};

/// Number of cascade steps.
pub const STEP_COUNT: usize = 4;

/// One step of the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeStep {
    /// Degree-proportional strengthening.
    Strengthen,
    /// PageRank-proportional boost.
    PageRank,
    /// Community detection.
    Cluster,
    /// Response-pattern weight recompute.
    PatternReweight,
}

/// What a cascade did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CascadeReport {
    /// Concepts whose strength grew from their degree.
    pub concepts_strengthened: usize,
    /// Concepts boosted by PageRank.
    pub concepts_ranked: usize,
    /// Clusters found (all above the minimum size).
    pub clusters: Vec<KnowledgeCluster>,
    /// Response-pattern weights written.
    pub patterns_reweighted: usize,
    /// Steps skipped because of an error.
    pub failed_steps: Vec<CascadeStep>,
    /// Nodes fed into the graph algorithms.
    pub analyzed_nodes: usize,
    /// Whether the analytics input was capped.
    pub truncated: bool,
}

impl CascadeReport {
    /// Steps that ran to completion.
    #[must_use]
    pub fn steps_succeeded(&self) -> usize {
        STEP_COUNT.saturating_sub(self.failed_steps.len())
    }
}

/// Read-only results of the analytics part of a cascade.
#[derive(Debug)]
pub struct CascadeAnalysis {
    degree_boosts: Vec<(ConceptId, f64)>,
    pagerank: Result<Vec<(ConceptId, f64)>>,
    clusters: Result<Vec<KnowledgeCluster>>,
    analyzed_nodes: usize,
    truncated: bool,
}

/// `avg_effectiveness × (1 + 0.1 × usage)`, capped at `max_weight`.
#[must_use]
pub fn pattern_weight(avg_effectiveness: f64, usage: u64, max_weight: f64) -> f64 {
    (avg_effectiveness * (1.0 + 0.1 * usage as f64)).min(max_weight)
}

/// Runs evolution cascades.
#[derive(Debug, Clone)]
pub struct EvolutionCascade {
    config: CascadeConfig,
    counters: Arc<NousCounters>,
}

impl EvolutionCascade {
    /// Create a cascade runner.
    #[must_use]
    pub fn new(config: CascadeConfig, counters: Arc<NousCounters>) -> Self {
        Self { config, counters }
    }

    /// The cascade configuration.
    #[must_use]
    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    /// Whether a processing pass with these yields should trigger a cascade.
    #[must_use]
    pub fn should_trigger(&self, new_concepts: usize, new_connections: usize) -> bool {
        self.config.enabled
            && (new_concepts > self.config.new_concept_threshold
                || new_connections > self.config.new_connection_threshold)
    }

    fn view(&self, graph: &ConceptGraph) -> AnalyticsGraph {
        AnalyticsGraph::build(
            graph,
            self.config.max_analytics_nodes,
            self.config.max_analytics_edges,
        )
    }

    /// Community detection only, no mutation.
    ///
    /// # Errors
    ///
    /// Returns [`NousError::GraphAlgorithm`](crate::NousError::GraphAlgorithm)
    /// if community detection fails.
    pub fn clusters(&self, graph: &ConceptGraph) -> Result<Vec<KnowledgeCluster>> {
        self.view(graph)
            .knowledge_clusters(graph, self.config.min_cluster_size)
    }

    /// Compute everything the graph steps need from a snapshot.
    #[must_use]
    pub fn analyze(&self, graph: &ConceptGraph) -> CascadeAnalysis {
        let _span = info_span!("evolution_cascade", phase = "analyze").entered();
        let cfg = &self.config;

        let degree_boosts = graph
            .concepts()
            .filter_map(|c| {
                let degree = graph.degree(&c.id);
                (degree > 0).then(|| {
                    let boost = (cfg.degree_step * degree as f64).min(cfg.max_degree_boost);
                    (c.id.clone(), boost)
                })
            })
            .collect();

        let view = self.view(graph);
        let pagerank = view.pagerank(cfg.pagerank_damping, cfg.pagerank_iterations);
        let clusters = view.knowledge_clusters(graph, cfg.min_cluster_size);

        CascadeAnalysis {
            degree_boosts,
            pagerank,
            clusters,
            analyzed_nodes: view.node_count(),
            truncated: view.is_truncated(),
        }
    }

    /// Apply an analysis to the store, one transaction per step, and log a
    /// `CascadeCompleted` event.
    ///
    /// Never fails: a step that errors is logged, counted and skipped.
    pub fn apply(
        &self,
        store: &mut ConceptGraphStore,
        analysis: CascadeAnalysis,
        now: DateTime<Utc>,
    ) -> CascadeReport {
        let _span = info_span!("evolution_cascade", phase = "apply").entered();
        let mut report = CascadeReport {
            analyzed_nodes: analysis.analyzed_nodes,
            truncated: analysis.truncated,
            ..CascadeReport::default()
        };

        // 1. Strengthen by degree.
        let boosted = boost_all(store.graph(), &analysis.degree_boosts, 0.5);
        match store.apply_updates(boosted) {
            Ok(n) => report.concepts_strengthened = n,
            Err(e) => self.step_failed(&mut report, CascadeStep::Strengthen, &e),
        }

        // 2. PageRank boost.
        let ranked = analysis.pagerank.and_then(|scores| {
            let deltas: Vec<(ConceptId, f64)> = scores
                .into_iter()
                .map(|(id, score)| (id, self.config.pagerank_boost * score))
                .collect();
            let updates = boost_all(store.graph(), &deltas, 0.0);
            store.apply_updates(updates)
        });
        match ranked {
            Ok(n) => report.concepts_ranked = n,
            Err(e) => self.step_failed(&mut report, CascadeStep::PageRank, &e),
        }

        // 3. Clusters.
        match analysis.clusters {
            Ok(clusters) => report.clusters = clusters,
            Err(e) => self.step_failed(&mut report, CascadeStep::Cluster, &e),
        }

        // 4. Pattern reweight.
        match self.reweight_patterns(store.persistence_mut(), now) {
            Ok(n) => report.patterns_reweighted = n,
            Err(e) => self.step_failed(&mut report, CascadeStep::PatternReweight, &e),
        }

        let completed = EvolutionEvent::new(
            EvolutionEventKind::CascadeCompleted {
                steps_succeeded: report.steps_succeeded(),
                steps_failed: report.failed_steps.len(),
                clusters: report.clusters.len(),
            },
            now,
        );
        if let Err(e) = store.persistence_mut().append_event(&completed) {
            warn!(error = %e, "Failed to log cascade completion");
        }

        NousCounters::bump(&self.counters.cascades_run);
        info!(
            strengthened = report.concepts_strengthened,
            ranked = report.concepts_ranked,
            clusters = report.clusters.len(),
            patterns = report.patterns_reweighted,
            failed = report.failed_steps.len(),
            "Evolution cascade completed"
        );
        report
    }

    /// Log `CascadeTriggered`, then analyze and apply in one go.
    ///
    /// Holds `store` for the whole cascade; the engine splits
    /// [`analyze`](Self::analyze) and [`apply`](Self::apply) instead so the
    /// analytics run outside its lock.
    pub fn run(
        &self,
        store: &mut ConceptGraphStore,
        new_concepts: usize,
        new_connections: usize,
        now: DateTime<Utc>,
    ) -> CascadeReport {
        self.log_trigger(store.persistence_mut(), new_concepts, new_connections, now);
        let analysis = self.analyze(store.graph());
        self.apply(store, analysis, now)
    }

    /// Append a `CascadeTriggered` event; failures are only logged.
    pub fn log_trigger(
        &self,
        db: &mut PersistenceLayer,
        new_concepts: usize,
        new_connections: usize,
        now: DateTime<Utc>,
    ) {
        info!(new_concepts, new_connections, "Evolution cascade triggered");
        let event = EvolutionEvent::new(
            EvolutionEventKind::CascadeTriggered {
                new_concepts,
                new_connections,
            },
            now,
        );
        if let Err(e) = db.append_event(&event) {
            warn!(error = %e, "Failed to log cascade trigger");
        }
    }

    /// Recompute response-pattern weights from effective patterns.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern tables cannot be read or written.
    pub fn reweight_patterns(&self, db: &mut PersistenceLayer, now: DateTime<Utc>) -> Result<usize> {
        let weights: Vec<ResponsePatternWeight> = db
            .effective_pattern_groups(self.config.pattern_effectiveness_threshold)?
            .into_iter()
            .map(|(pattern_type, avg, usage)| ResponsePatternWeight {
                pattern_type,
                weight: pattern_weight(avg, usage, self.config.max_pattern_weight),
                usage_count: usage,
                updated_at: now,
            })
            .collect();
        if !weights.is_empty() {
            db.save_response_patterns(&weights)?;
        }
        Ok(weights.len())
    }

    fn step_failed(&self, report: &mut CascadeReport, step: CascadeStep, error: &crate::NousError) {
        warn!(step = ?step, error = %error, "Cascade step skipped");
        NousCounters::bump(&self.counters.cascade_step_failures);
        report.failed_steps.push(step);
    }
}

/// Updated copies of the concepts in `deltas`, strength raised by the
/// delta and confidence by `confidence_share × delta`, both capped at 1.
fn boost_all(graph: &ConceptGraph, deltas: &[(ConceptId, f64)], confidence_share: f64) -> Vec<Concept> {
    deltas
        .iter()
        .filter(|(_, delta)| *delta > 0.0)
        .filter_map(|(id, delta)| {
            let mut concept = graph.concept(id)?.clone();
            concept.strength = (concept.strength + delta).min(1.0);
            concept.confidence = (concept.confidence + delta * confidence_share).min(1.0);
            Some(concept)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConceptConfig, ConnectionConfig, PersistenceConfig, ReinforcementConfig};
    use crate::pattern::InteractionPattern;
    use crate::types::ConnectionKind;

    fn store() -> ConceptGraphStore {
        let db = PersistenceLayer::open_in_memory(&PersistenceConfig::default()).expect("db");
        ConceptGraphStore::load(
            db,
            ConceptConfig::default(),
            ConnectionConfig::default(),
            ReinforcementConfig::default(),
            Arc::new(NousCounters::new()),
        )
        .expect("store")
    }

    fn cascade(config: CascadeConfig) -> EvolutionCascade {
        EvolutionCascade::new(config, Arc::new(NousCounters::new()))
    }

    fn star(store: &mut ConceptGraphStore) -> ConceptId {
        let now = Utc::now();
        let hub = store.upsert_concept("hub", "", 0.0, now).expect("hub").id;
        for name in ["alpha", "beta", "gamma", "delta"] {
            let leaf = store.upsert_concept(name, "", 0.0, now).expect("leaf").id;
            store
                .add_or_strengthen_edge(&leaf, &hub, 0.5, ConnectionKind::CoOccurrence, now)
                .expect("edge");
        }
        hub
    }

    #[test]
    fn trigger_thresholds_are_strict() {
        let c = cascade(CascadeConfig::default());
        assert!(!c.should_trigger(5, 3));
        assert!(c.should_trigger(6, 0));
        assert!(c.should_trigger(0, 4));
        let off = cascade(CascadeConfig {
            enabled: false,
            ..CascadeConfig::default()
        });
        assert!(!off.should_trigger(100, 100));
    }

    #[test]
    fn empty_and_single_node_graphs_complete_cleanly() {
        let c = cascade(CascadeConfig::default());
        let mut s = store();
        let report = c.run(&mut s, 0, 0, Utc::now());
        assert!(report.failed_steps.is_empty());
        assert!(report.clusters.is_empty());

        s.upsert_concept("lonely", "", 0.0, Utc::now()).expect("upsert");
        let report = c.run(&mut s, 0, 0, Utc::now());
        assert!(report.failed_steps.is_empty());
        assert!(report.clusters.is_empty());
        assert_eq!(report.steps_succeeded(), STEP_COUNT);
    }

    #[test]
    fn degree_and_pagerank_raise_strength() {
        let c = cascade(CascadeConfig::default());
        let mut s = store();
        let hub = star(&mut s);
        let before = s.graph().concept(&hub).expect("hub").strength;

        let report = c.run(&mut s, 6, 4, Utc::now());
        let after = s.graph().concept(&hub).expect("hub").clone();
        // Degree 4 → +0.08, plus a PageRank share.
        assert!(after.strength > before + 0.08);
        assert!(after.strength <= 1.0);
        assert_eq!(report.concepts_strengthened, 5);
        assert_eq!(report.concepts_ranked, 5);

        // Cache and database agree.
        let stored = s.persistence().load_concept(&hub).expect("load").expect("some");
        assert!((stored.strength - after.strength).abs() < 1e-12);
    }

    #[test]
    fn star_is_one_cluster() {
        let c = cascade(CascadeConfig::default());
        let mut s = store();
        star(&mut s);
        let clusters = c.clusters(s.graph()).expect("clusters");
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].len(), 5);
    }

    #[test]
    fn failing_step_does_not_block_the_rest() {
        let c = cascade(CascadeConfig {
            pagerank_damping: 1.5,
            ..CascadeConfig::default()
        });
        let mut s = store();
        star(&mut s);
        let report = c.run(&mut s, 0, 0, Utc::now());
        assert_eq!(report.failed_steps, vec![CascadeStep::PageRank]);
        assert_eq!(report.concepts_strengthened, 5);
        assert_eq!(report.clusters.len(), 1);
        assert_eq!(report.steps_succeeded(), 3);
        assert_eq!(c.counters.cascade_step_failures.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn events_bracket_the_cascade() {
        let c = cascade(CascadeConfig::default());
        let mut s = store();
        c.run(&mut s, 7, 0, Utc::now());
        let events = s.persistence().recent_events(2).expect("events");
        assert!(matches!(events[0].kind, EvolutionEventKind::CascadeCompleted { .. }));
        assert!(matches!(
            events[1].kind,
            EvolutionEventKind::CascadeTriggered { new_concepts: 7, .. }
        ));
    }

    #[test]
    fn pattern_weights_follow_formula() {
        assert!((pattern_weight(0.8, 6, 2.0) - 1.28).abs() < 1e-12);
        assert!((pattern_weight(0.9, 50, 2.0) - 2.0).abs() < 1e-12);

        let c = cascade(CascadeConfig::default());
        let mut s = store();
        let now = Utc::now();
        for (hash, kind, freq, eff) in [
            ("h1", "wh_question/detailed", 2, 0.9),
            ("h2", "wh_question/detailed", 4, 0.7),
            ("h3", "statement/conversational", 9, 0.2),
        ] {
            s.persistence_mut()
                .save_pattern(&InteractionPattern {
                    pattern_hash: hash.into(),
                    pattern_type: kind.into(),
                    frequency: freq,
                    effectiveness: eff,
                    first_seen: now,
                    last_used: now,
                })
                .expect("pattern");
        }
        assert_eq!(c.reweight_patterns(s.persistence_mut(), now).expect("reweight"), 1);
        let weights = s.persistence().load_response_patterns().expect("weights");
        assert_eq!(weights.len(), 1);
        assert_eq!(weights[0].usage_count, 6);
        assert!((weights[0].weight - 1.28).abs() < 1e-9);
    }
}
