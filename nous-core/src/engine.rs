//! The evolution engine, the crate's public entry point.
//!
//! One [`EvolutionEngine`] per process, constructed once at startup and
//! passed around by handle. All graph and capability mutations run under
//! one coarse lock; cascade and score analytics run on a snapshot taken
//! under the lock and computed outside it.
//!
//! ```no_run
//! use nous_core::{EvolutionEngine, NousConfig};
//!
//! let engine = EvolutionEngine::open("knowledge.db", NousConfig::default())?;
//! let outcome = engine.log_interaction("I love coding in python", "Nice!", "chat", 0.6)?;
//! println!("new concepts: {:?}", outcome.new_concepts);
//! # Ok::<(), nous_core::NousError>(())
//! ```

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capability::{CapabilityRecord, CapabilityTracker, Exercise};
use crate::cascade::{CascadeReport, EvolutionCascade};
use crate::config::NousConfig;
use crate::connection::{ConnectionAnalyzer, Haystack};
use crate::error::Result;
use crate::events::{EvolutionEvent, EvolutionEventKind};
use crate::extraction::{sanitize_candidates, ConceptExtractor, KeywordExtractor};
use crate::graph::{ConceptGraph, ConceptGraphStore};
use crate::metrics::NousCounters;
use crate::pattern::{InteractionFeatures, PatternLearner, PatternUpdate, ResponsePatternWeight};
use crate::persistence::PersistenceLayer;
use crate::score::ScoreComponents;
use crate::similarity::SemanticSimilarity;
use crate::types::{Clock, Concept, ConceptId, ConnectionKind, KnowledgeCluster, SystemClock};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A connection created during a processing pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConnection {
    /// Source concept name.
    pub source: String,
    /// Target concept name.
    pub target: String,
    /// Initial weight.
    pub weight: f64,
    /// How the link was established.
    pub kind: ConnectionKind,
}

/// What one logged interaction changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionOutcome {
    /// Concepts seen for the first time.
    pub new_concepts: Vec<String>,
    /// Existing concepts that were reinforced.
    pub reinforced_concepts: Vec<String>,
    /// Connections created.
    pub new_connections: Vec<NewConnection>,
    /// The interaction's pattern after the update.
    pub pattern_evolution: PatternUpdate,
    /// Growth applied per capability.
    pub capability_growth: BTreeMap<String, f64>,
    /// Report of the cascade this interaction triggered, if any.
    pub cascade: Option<CascadeReport>,
}

/// What one ingested document changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    /// Concepts created or reinforced, in ingestion order.
    pub concepts_learned: Vec<String>,
    /// How many of those were new.
    pub new_concepts: usize,
    /// Connections created.
    pub connections_formed: usize,
    /// Clusters found by the triggered cascade (empty when none ran).
    pub knowledge_clusters: Vec<KnowledgeCluster>,
    /// Whether a cascade ran.
    pub evolution_triggered: bool,
    /// Report of that cascade.
    pub cascade: Option<CascadeReport>,
}

/// Snapshot of the engine's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionStatus {
    /// Concepts in the graph.
    pub concept_count: usize,
    /// Connections in the graph.
    pub connection_count: usize,
    /// Capability records, by name.
    pub capabilities: Vec<CapabilityRecord>,
    /// Most recent events, newest first.
    pub recent_events: Vec<EvolutionEvent>,
    /// Edges over possible concept pairs.
    pub network_density: f64,
    /// Aggregate score in [0, 1].
    pub evolution_score: f64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

struct EngineState {
    store: ConceptGraphStore,
    capabilities: CapabilityTracker,
}

/// Incremental concept-graph learner.
pub struct EvolutionEngine {
    state: Mutex<EngineState>,
    config: NousConfig,
    extractor: Box<dyn ConceptExtractor>,
    analyzer: ConnectionAnalyzer,
    patterns: PatternLearner,
    cascade: EvolutionCascade,
    clock: Arc<dyn Clock>,
    counters: Arc<NousCounters>,
}

impl std::fmt::Debug for EvolutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvolutionEngine")
            .field("analyzer", &self.analyzer)
            .field("counters", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl EvolutionEngine {
    /// Open (or create) the database at `path` and load the graph.
    ///
    /// # Errors
    ///
    /// Returns [`NousError::Config`](crate::NousError::Config) for an invalid
    /// configuration, or a database error.
    pub fn open<P: AsRef<Path>>(path: P, config: NousConfig) -> Result<Self> {
        config.validate()?;
        let db = PersistenceLayer::open(path, &config.persistence)?;
        Self::from_persistence(db, config)
    }

    /// An engine backed by an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`NousError::Config`](crate::NousError::Config) for an invalid
    /// configuration, or a database error.
    pub fn open_in_memory(config: NousConfig) -> Result<Self> {
        config.validate()?;
        let db = PersistenceLayer::open_in_memory(&config.persistence)?;
        Self::from_persistence(db, config)
    }

    fn from_persistence(db: PersistenceLayer, config: NousConfig) -> Result<Self> {
        let counters = Arc::new(NousCounters::new());
        let capabilities = CapabilityTracker::load(config.capability.clone(), &db)?;
        let store = ConceptGraphStore::load(
            db,
            config.concept.clone(),
            config.connection.clone(),
            config.reinforcement.clone(),
            Arc::clone(&counters),
        )?;
        info!(
            concepts = store.graph().concept_count(),
            capabilities = capabilities.records().count(),
            "Evolution engine ready"
        );
        Ok(Self {
            state: Mutex::new(EngineState {
                store,
                capabilities,
            }),
            extractor: Box::new(KeywordExtractor::new(&config.extraction)),
            analyzer: ConnectionAnalyzer::new(config.connection.clone()),
            patterns: PatternLearner::new(config.pattern.clone()),
            cascade: EvolutionCascade::new(config.cascade.clone(), Arc::clone(&counters)),
            clock: Arc::new(SystemClock),
            counters,
            config,
        })
    }

    /// Replace the concept extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: impl ConceptExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// Replace the semantic similarity strategy.
    #[must_use]
    pub fn with_similarity(mut self, similarity: Arc<dyn SemanticSimilarity>) -> Self {
        self.analyzer = ConnectionAnalyzer::with_similarity(self.config.connection.clone(), similarity);
        self
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &NousConfig {
        &self.config
    }

    /// Runtime counters.
    #[must_use]
    pub fn counters(&self) -> &NousCounters {
        &self.counters
    }

    // ------------------------------------------------------------------
    // Learning
    // ------------------------------------------------------------------

    /// Learn from one chat turn.
    ///
    /// Concepts come from `user_input`; each is created or reinforced (the
    /// sentiment scales the reinforcement), every pair is scored by the
    /// connection analyzer, the interaction's pattern and the capabilities
    /// are updated. A cascade runs if the turn crossed the thresholds.
    ///
    /// # Errors
    ///
    /// Returns a database error. Writes that committed before the failure
    /// stay committed and are reflected in the cache.
    pub fn log_interaction(
        &self,
        user_input: &str,
        response: &str,
        intent: &str,
        sentiment: f64,
    ) -> Result<InteractionOutcome> {
        let now = self.clock.now();
        let sentiment = if sentiment.is_finite() { sentiment.clamp(-1.0, 1.0) } else { 0.0 };
        let names = self.extract_concepts(user_input);

        let mut state = self.state.lock();
        let EngineState {
            store,
            capabilities,
        } = &mut *state;

        let mut new_concepts = Vec::new();
        let mut reinforced_concepts = Vec::new();
        let mut ids = Vec::with_capacity(names.len());
        for name in &names {
            let outcome = store.upsert_concept(name, user_input, sentiment, now)?;
            if outcome.created {
                new_concepts.push(name.clone());
            } else {
                reinforced_concepts.push(name.clone());
            }
            ids.push(outcome.id);
        }

        let haystack = Haystack::new(user_input);
        let new_connections = self.connect_all(store, &names, &ids, &haystack, None, now)?;

        let features = InteractionFeatures::extract(
            user_input,
            response,
            intent,
            sentiment,
            self.patterns.config(),
        );
        let pattern_evolution = self
            .patterns
            .record(store.persistence_mut(), &features, sentiment, now)?;
        NousCounters::bump(&self.counters.patterns_recorded);

        let exercise = Exercise {
            input_chars: user_input.chars().count(),
            output_chars: response.chars().count(),
            intent,
            sentiment,
        };
        let capability_growth = capabilities.exercise(store.persistence_mut(), &exercise, now)?;
        drop(state);

        debug!(
            new = new_concepts.len(),
            reinforced = reinforced_concepts.len(),
            connections = new_connections.len(),
            "Interaction logged"
        );

        let cascade = self
            .cascade
            .should_trigger(new_concepts.len(), new_connections.len())
            .then(|| self.cascade_now(new_concepts.len(), new_connections.len()));

        Ok(InteractionOutcome {
            new_concepts,
            reinforced_concepts,
            new_connections,
            pattern_evolution,
            capability_growth,
            cascade,
        })
    }

    /// [`log_interaction`](Self::log_interaction) for callers that must
    /// never fail: errors are logged and swallowed.
    pub fn log_interaction_lenient(
        &self,
        user_input: &str,
        response: &str,
        intent: &str,
        sentiment: f64,
    ) -> Option<InteractionOutcome> {
        match self.log_interaction(user_input, response, intent, sentiment) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(error = %e, "Interaction learning failed; continuing without it");
                None
            }
        }
    }

    /// Learn from a document.
    ///
    /// Concepts are the caller's entities then keywords (normalized,
    /// deduplicated, capped); if both are empty the built-in extractor runs
    /// over `text`. Co-occurring concepts are linked as document
    /// connections. A cascade runs if the document crossed the thresholds;
    /// its clusters are returned.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    pub fn process_document_knowledge(
        &self,
        source_name: &str,
        text: &str,
        entities: &[String],
        keywords: &[String],
    ) -> Result<DocumentOutcome> {
        let now = self.clock.now();
        let limit = self.config.extraction.max_document_concepts;
        let supplied: Vec<String> = entities.iter().chain(keywords).cloned().collect();
        let mut names = sanitize_candidates(&supplied, &self.config.extraction, limit);
        if names.is_empty() {
            names = self.extract_concepts(text);
            names.truncate(limit);
        }

        let mut state = self.state.lock();
        let store = &mut state.store;

        let haystack = Haystack::new(text);
        let mut new_concepts = 0;
        let mut ids = Vec::with_capacity(names.len());
        for name in &names {
            let snippet = haystack.snippet_around(name, self.config.concept.max_snippet_chars);
            let outcome = store.upsert_concept(name, &snippet, 0.0, now)?;
            if outcome.created {
                new_concepts += 1;
            }
            ids.push(outcome.id);
        }

        let connections =
            self.connect_all(store, &names, &ids, &haystack, Some(ConnectionKind::Document), now)?;
        let event = EvolutionEvent::new(
            EvolutionEventKind::DocumentIngested {
                source_name: source_name.to_string(),
                concepts: names.len(),
                connections: connections.len(),
            },
            now,
        );
        store.persistence_mut().append_event(&event)?;
        drop(state);

        info!(
            source = %source_name,
            concepts = names.len(),
            new_concepts,
            connections = connections.len(),
            "Document ingested"
        );

        let triggered = self.cascade.should_trigger(new_concepts, connections.len());
        let cascade = triggered.then(|| self.cascade_now(new_concepts, connections.len()));
        Ok(DocumentOutcome {
            concepts_learned: names,
            new_concepts,
            connections_formed: connections.len(),
            knowledge_clusters: cascade.as_ref().map(|r| r.clusters.clone()).unwrap_or_default(),
            evolution_triggered: triggered,
            cascade,
        })
    }

    fn extract_concepts(&self, text: &str) -> Vec<String> {
        let limit = self.config.extraction.max_concepts;
        match self.extractor.extract(text) {
            Ok(raw) => sanitize_candidates(&raw, &self.config.extraction, limit),
            Err(e) => {
                warn!(error = %e, "Concept extraction failed; treating as zero concepts");
                NousCounters::bump(&self.counters.extraction_failures);
                Vec::new()
            }
        }
    }

    /// Score and link every pair of `ids`; returns the created connections.
    fn connect_all(
        &self,
        store: &mut ConceptGraphStore,
        names: &[String],
        ids: &[ConceptId],
        text: &Haystack,
        kind_override: Option<ConnectionKind>,
        now: DateTime<Utc>,
    ) -> Result<Vec<NewConnection>> {
        let mut created = Vec::new();
        for i in 0..ids.len() {
            for j in i + 1..ids.len() {
                let strength = self.analyzer.strength(&names[i], &names[j], text);
                let kind = kind_override.unwrap_or_else(|| strength.kind());
                let outcome = store.add_or_strengthen_edge(&ids[i], &ids[j], strength.total, kind, now)?;
                if outcome.is_created() {
                    created.push(NewConnection {
                        source: names[i].clone(),
                        target: names[j].clone(),
                        weight: strength.total.clamp(0.0, 1.0),
                        kind,
                    });
                }
            }
        }
        Ok(created)
    }

    // ------------------------------------------------------------------
    // Cascade & analytics
    // ------------------------------------------------------------------

    fn snapshot(&self) -> ConceptGraph {
        self.state.lock().store.graph().clone()
    }

    fn cascade_now(&self, new_concepts: usize, new_connections: usize) -> CascadeReport {
        let now = self.clock.now();
        let snapshot = {
            let mut state = self.state.lock();
            self.cascade
                .log_trigger(state.store.persistence_mut(), new_concepts, new_connections, now);
            state.store.graph().clone()
        };
        let analysis = self.cascade.analyze(&snapshot);
        let mut state = self.state.lock();
        self.cascade.apply(&mut state.store, analysis, now)
    }

    /// Run a full evolution cascade now, regardless of thresholds.
    ///
    /// Slow on large graphs; keep it off latency-sensitive paths.
    pub fn run_evolution_cascade(&self) -> CascadeReport {
        self.cascade_now(0, 0)
    }

    /// Current knowledge clusters (community detection only, nothing is
    /// written). Clusters always have more than two members.
    ///
    /// # Errors
    ///
    /// Returns [`NousError::GraphAlgorithm`](crate::NousError::GraphAlgorithm)
    /// if community detection fails.
    pub fn identify_knowledge_clusters(&self) -> Result<Vec<KnowledgeCluster>> {
        self.cascade.clusters(&self.snapshot())
    }

    /// Aggregate evolution score in [0, 1]; `0.0` for an empty graph.
    pub fn calculate_overall_evolution_score(&self) -> f64 {
        self.score_components().score()
    }

    fn score_components(&self) -> ScoreComponents {
        let (graph, capabilities) = {
            let state = self.state.lock();
            (state.store.graph().clone(), state.capabilities.clone())
        };
        ScoreComponents::gather(&graph, &capabilities, &self.config.cascade, self.clock.now())
    }

    /// Counts, capabilities, recent events, density and score.
    ///
    /// # Errors
    ///
    /// Returns a database error if the event log cannot be read.
    pub fn get_evolution_status(&self) -> Result<EvolutionStatus> {
        let (graph, capabilities, recent_events) = {
            let state = self.state.lock();
            let events = state
                .store
                .persistence()
                .recent_events(self.config.status.recent_events)?;
            (state.store.graph().clone(), state.capabilities.clone(), events)
        };
        let components =
            ScoreComponents::gather(&graph, &capabilities, &self.config.cascade, self.clock.now());
        Ok(EvolutionStatus {
            concept_count: graph.concept_count(),
            connection_count: graph.edge_count(),
            capabilities: capabilities.records().cloned().collect(),
            recent_events,
            network_density: components.density,
            evolution_score: components.score(),
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// A concept by name (normalized before lookup).
    #[must_use]
    pub fn get_concept(&self, name: &str) -> Option<Concept> {
        self.state.lock().store.graph().concept_by_name(name).cloned()
    }

    /// The `n` strongest concepts, strongest first.
    #[must_use]
    pub fn top_concepts(&self, n: usize) -> Vec<Concept> {
        let state = self.state.lock();
        let mut concepts: Vec<&Concept> = state.store.graph().concepts().collect();
        concepts.sort_by_key(|c| (Reverse(OrderedFloat(c.strength)), c.name.clone()));
        concepts.into_iter().take(n).cloned().collect()
    }

    /// Concepts linked to `name` with the connection weight, heaviest first.
    #[must_use]
    pub fn related_concepts(&self, name: &str) -> Vec<(Concept, f64)> {
        let state = self.state.lock();
        let graph = state.store.graph();
        let id = ConceptId::from_name(name);
        let mut related: Vec<(Concept, f64)> = graph
            .neighbors(&id)
            .filter_map(|other| {
                let weight = graph.edge(&id, other)?.weight;
                Some((graph.concept(other)?.clone(), weight))
            })
            .collect();
        related.sort_by_key(|(c, w)| (Reverse(OrderedFloat(*w)), c.name.clone()));
        related
    }

    /// Current response-pattern weights, heaviest first.
    ///
    /// # Errors
    ///
    /// Returns a database error.
    pub fn response_pattern_weights(&self) -> Result<Vec<ResponsePatternWeight>> {
        self.state.lock().store.persistence().load_response_patterns()
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Rebuild the graph and capability caches from the database.
    ///
    /// # Errors
    ///
    /// Returns a database error; the old caches are kept then.
    pub fn resync(&self) -> Result<()> {
        let mut state = self.state.lock();
        let capabilities = CapabilityTracker::load(self.config.capability.clone(), state.store.persistence())?;
        state.store.resync()?;
        state.capabilities = capabilities;
        Ok(())
    }

    /// Copy the database to `dest` with SQLite's online-backup API.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup fails.
    pub fn backup<P: AsRef<Path>>(&self, dest: P) -> Result<()> {
        self.state.lock().store.persistence().backup(dest)
    }

    /// Rotate `<db>.bak.N` files and write a fresh `<db>.bak.1`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backup or a rename fails.
    pub fn create_rotating_backup(&self) -> Result<()> {
        self.state.lock().store.persistence().create_rotating_backup()
    }

    /// `Ok(true)` when SQLite's integrity check passes.
    ///
    /// # Errors
    ///
    /// Returns an error if the check cannot run.
    pub fn integrity_check(&self) -> Result<bool> {
        self.state.lock().store.persistence().integrity_check()
    }
}
