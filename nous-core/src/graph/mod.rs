//! The concept graph: an in-memory cache over [`PersistenceLayer`].
//!
//! [`ConceptGraph`] is the cache itself: concepts, edges keyed by their
//! unordered pair, and an adjacency index. [`ConceptGraphStore`] owns both
//! the cache and the database and is the only way to mutate either.
//!
//! Every mutation is two-phase: the updated record is computed on a copy,
//! written to SQLite in one transaction, and only swapped into the cache
//! once the commit succeeded. A failed write leaves the cache untouched;
//! [`ConceptGraphStore::resync`] rebuilds it from disk if anything ever
//! does diverge.

pub mod analytics;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::{ConceptConfig, ConnectionConfig, ReinforcementConfig};
use crate::error::{NousError, Result};
use crate::events::{EvolutionEvent, EvolutionEventKind};
use crate::metrics::NousCounters;
use crate::persistence::PersistenceLayer;
use crate::reinforcement::ReinforcementEngine;
use crate::types::{edge_key, normalize_name, Concept, ConceptId, Connection, ConnectionKind};

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// In-memory weighted concept graph.
#[derive(Debug, Clone, Default)]
pub struct ConceptGraph {
    concepts: BTreeMap<ConceptId, Concept>,
    edges: BTreeMap<(ConceptId, ConceptId), Connection>,
    adjacency: BTreeMap<ConceptId, BTreeSet<ConceptId>>,
}

impl ConceptGraph {
    /// Build a graph from loaded rows. Edges with a missing endpoint or a
    /// self-loop are dropped.
    #[must_use]
    pub fn from_parts(concepts: Vec<Concept>, edges: Vec<Connection>) -> Self {
        let mut graph = Self::default();
        for concept in concepts {
            graph.put_concept(concept);
        }
        for edge in edges {
            if edge.source != edge.target
                && graph.concepts.contains_key(&edge.source)
                && graph.concepts.contains_key(&edge.target)
            {
                graph.put_edge(edge);
            }
        }
        graph
    }

    fn put_concept(&mut self, concept: Concept) {
        self.concepts.insert(concept.id.clone(), concept);
    }

    fn put_edge(&mut self, edge: Connection) {
        self.adjacency
            .entry(edge.source.clone())
            .or_default()
            .insert(edge.target.clone());
        self.adjacency
            .entry(edge.target.clone())
            .or_default()
            .insert(edge.source.clone());
        self.edges.insert(edge.key(), edge);
    }

    /// A concept by id.
    #[must_use]
    pub fn concept(&self, id: &ConceptId) -> Option<&Concept> {
        self.concepts.get(id)
    }

    /// A concept by (not necessarily normalized) name.
    #[must_use]
    pub fn concept_by_name(&self, name: &str) -> Option<&Concept> {
        self.concepts.get(&ConceptId::from_name(name))
    }

    /// All concepts, ordered by id.
    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.values()
    }

    /// The edge between `a` and `b`, in either orientation.
    #[must_use]
    pub fn edge(&self, a: &ConceptId, b: &ConceptId) -> Option<&Connection> {
        self.edges.get(&edge_key(a, b))
    }

    /// All edges, ordered by canonical key.
    pub fn edges(&self) -> impl Iterator<Item = &Connection> {
        self.edges.values()
    }

    /// Ids of concepts adjacent to `id` (either direction).
    pub fn neighbors<'a>(&'a self, id: &ConceptId) -> impl Iterator<Item = &'a ConceptId> + use<'a> {
        self.adjacency.get(id).into_iter().flatten()
    }

    /// Number of distinct neighbours of `id`.
    #[must_use]
    pub fn degree(&self, id: &ConceptId) -> usize {
        self.adjacency.get(id).map_or(0, BTreeSet::len)
    }

    /// Number of concepts.
    #[must_use]
    pub fn concept_count(&self) -> usize {
        self.concepts.len()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Whether the graph has no concepts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Edges over possible unordered pairs; `0.0` below two concepts.
    #[must_use]
    pub fn density(&self) -> f64 {
        let n = self.concepts.len() as f64;
        if n < 2.0 {
            return 0.0;
        }
        (self.edges.len() as f64 / (n * (n - 1.0) / 2.0)).min(1.0)
    }

    /// Mean concept strength; `0.0` for an empty graph.
    #[must_use]
    pub fn average_strength(&self) -> f64 {
        if self.concepts.is_empty() {
            return 0.0;
        }
        self.concepts.values().map(|c| c.strength).sum::<f64>() / self.concepts.len() as f64
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of [`ConceptGraphStore::upsert_concept`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    /// Id of the concept.
    pub id: ConceptId,
    /// Whether the concept was created by this call.
    pub created: bool,
    /// Strength after the call.
    pub strength: f64,
}

/// Result of [`ConceptGraphStore::add_or_strengthen_edge`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeOutcome {
    /// Both ids were the same; nothing happened.
    SelfLoop,
    /// One of the endpoints is not a known concept.
    MissingEndpoint,
    /// No edge existed and the strength did not clear the threshold.
    BelowThreshold,
    /// A new edge was created with this weight.
    Created(f64),
    /// The existing edge was reinforced to this weight.
    Reinforced(f64),
}

impl EdgeOutcome {
    /// Whether a new edge was created.
    #[must_use]
    pub fn is_created(self) -> bool {
        matches!(self, Self::Created(_))
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Durable concept graph: SQLite plus a write-through cache.
#[derive(Debug)]
pub struct ConceptGraphStore {
    db: PersistenceLayer,
    graph: ConceptGraph,
    concept_config: ConceptConfig,
    connection_config: ConnectionConfig,
    reinforcement: ReinforcementEngine,
    counters: Arc<NousCounters>,
}

impl ConceptGraphStore {
    /// Wrap an open database and load the cache from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the concepts or connections cannot be loaded.
    pub fn load(
        db: PersistenceLayer,
        concept_config: ConceptConfig,
        connection_config: ConnectionConfig,
        reinforcement_config: ReinforcementConfig,
        counters: Arc<NousCounters>,
    ) -> Result<Self> {
        let graph = ConceptGraph::from_parts(db.load_concepts()?, db.load_connections()?);
        info!(
            concepts = graph.concept_count(),
            connections = graph.edge_count(),
            "Concept graph loaded"
        );
        Ok(Self {
            db,
            graph,
            concept_config,
            connection_config,
            reinforcement: ReinforcementEngine::new(reinforcement_config),
            counters,
        })
    }

    /// The cached graph.
    #[must_use]
    pub fn graph(&self) -> &ConceptGraph {
        &self.graph
    }

    /// The underlying database.
    #[must_use]
    pub fn persistence(&self) -> &PersistenceLayer {
        &self.db
    }

    /// Mutable access to the database for tables the graph does not cache
    /// (patterns, capabilities, events).
    pub fn persistence_mut(&mut self) -> &mut PersistenceLayer {
        &mut self.db
    }

    /// Create the concept `name` or reinforce it if it already exists.
    ///
    /// The id is derived from the normalized name, so repeated calls with
    /// the same name always address the same concept.
    ///
    /// # Errors
    ///
    /// Returns [`NousError::Extraction`] for a name that normalizes to
    /// nothing, or a database error; the cache is unchanged on error.
    pub fn upsert_concept(
        &mut self,
        name: &str,
        snippet: &str,
        sentiment_bonus: f64,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome> {
        let name = normalize_name(name);
        if name.is_empty() {
            return Err(NousError::Extraction("empty concept name".into()));
        }
        let id = ConceptId::from_name(&name);
        let snippet = truncate_chars(snippet, self.concept_config.max_snippet_chars);
        let max_snippets = self.concept_config.max_snippets;

        if let Some(existing) = self.graph.concept(&id) {
            let mut updated = self.reinforcement.reinforce(existing, sentiment_bonus, now);
            updated.push_snippet(snippet, max_snippets);
            self.db.save_concept(&updated, None)?;

            debug!(
                concept = %updated.name,
                strength = updated.strength,
                confidence = updated.confidence,
                "Reinforced concept"
            );
            NousCounters::bump(&self.counters.concepts_reinforced);
            let strength = updated.strength;
            self.graph.put_concept(updated);
            return Ok(UpsertOutcome {
                id,
                created: false,
                strength,
            });
        }

        let mut concept = Concept::new(
            &name,
            self.concept_config.initial_strength,
            self.concept_config.initial_confidence,
            now,
        );
        concept.push_snippet(snippet, max_snippets);
        let event = EvolutionEvent::new(
            EvolutionEventKind::ConceptDiscovered {
                concept_id: id.clone(),
                name: concept.name.clone(),
            },
            now,
        );
        self.db.save_concept(&concept, Some(&event))?;

        debug!(concept = %concept.name, id = %id, "Discovered concept");
        NousCounters::bump(&self.counters.concepts_created);
        let strength = concept.strength;
        self.graph.put_concept(concept);
        Ok(UpsertOutcome {
            id,
            created: true,
            strength,
        })
    }

    /// Link `a` and `b`, or reinforce their existing link.
    ///
    /// Self-loops are a silent no-op. A missing edge is only created when
    /// `strength` clears the creation threshold; an existing edge gains the
    /// reinforcement step regardless of `strength`.
    ///
    /// # Errors
    ///
    /// Returns a database error; the cache is unchanged on error.
    pub fn add_or_strengthen_edge(
        &mut self,
        a: &ConceptId,
        b: &ConceptId,
        strength: f64,
        kind: ConnectionKind,
        now: DateTime<Utc>,
    ) -> Result<EdgeOutcome> {
        if a == b {
            NousCounters::bump(&self.counters.self_loops_rejected);
            return Ok(EdgeOutcome::SelfLoop);
        }
        let (Some(ca), Some(cb)) = (self.graph.concept(a), self.graph.concept(b)) else {
            debug!(a = %a, b = %b, "Edge endpoint not in graph");
            return Ok(EdgeOutcome::MissingEndpoint);
        };

        if let Some(existing) = self.graph.edge(a, b) {
            let mut updated = existing.clone();
            updated.weight = (existing.weight + self.connection_config.reinforce_step).min(1.0);
            updated.reinforcement_count = existing.reinforcement_count.saturating_add(1);
            self.db.save_connection(&updated, &[], None)?;

            debug!(a = %ca.name, b = %cb.name, weight = updated.weight, "Reinforced connection");
            NousCounters::bump(&self.counters.connections_reinforced);
            let weight = updated.weight;
            self.graph.put_edge(updated);
            return Ok(EdgeOutcome::Reinforced(weight));
        }

        // NaN on either side never clears the threshold.
        let threshold = self.connection_config.creation_threshold;
        if strength.partial_cmp(&threshold) != Some(Ordering::Greater) {
            return Ok(EdgeOutcome::BelowThreshold);
        }

        let weight = strength.clamp(0.0, 1.0);
        let edge = Connection {
            source: a.clone(),
            target: b.clone(),
            weight,
            kind,
            reinforcement_count: 0,
            discovered_at: now,
        };
        let mut ca = ca.clone();
        let mut cb = cb.clone();
        ca.relate(b);
        cb.relate(a);
        let event = EvolutionEvent::new(
            EvolutionEventKind::ConnectionDiscovered {
                source: a.clone(),
                target: b.clone(),
                weight,
                kind,
            },
            now,
        );
        self.db.save_connection(&edge, &[&ca, &cb], Some(&event))?;

        debug!(a = %ca.name, b = %cb.name, weight, kind = %kind, "Discovered connection");
        NousCounters::bump(&self.counters.connections_created);
        self.graph.put_concept(ca);
        self.graph.put_concept(cb);
        self.graph.put_edge(edge);
        Ok(EdgeOutcome::Created(weight))
    }

    /// Persist a batch of already-updated concepts in one transaction, then
    /// swap them into the cache. Concepts unknown to the cache are ignored.
    ///
    /// # Errors
    ///
    /// Returns a database error; the cache is unchanged on error.
    pub fn apply_updates(&mut self, updated: Vec<Concept>) -> Result<usize> {
        let known: Vec<Concept> = updated
            .into_iter()
            .filter(|c| self.graph.concepts.contains_key(&c.id))
            .collect();
        if known.is_empty() {
            return Ok(0);
        }
        self.db.save_concepts(&known)?;
        let n = known.len();
        for concept in known {
            self.graph.put_concept(concept);
        }
        Ok(n)
    }

    /// Rebuild the cache from the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be loaded; the old cache is kept.
    pub fn resync(&mut self) -> Result<()> {
        let graph = ConceptGraph::from_parts(self.db.load_concepts()?, self.db.load_connections()?);
        info!(
            concepts = graph.concept_count(),
            connections = graph.edge_count(),
            "Concept graph resynchronized from database"
        );
        self.graph = graph;
        Ok(())
    }
}

/// At most `max` characters of `s`, cut on a char boundary.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersistenceConfig;
    use chrono::Duration;

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

    #[test]
    fn upsert_is_idempotent_on_normalized_name() {
        let mut s = store();
        let now = Utc::now();
        let first = s.upsert_concept("Python", "I love python", 0.0, now).expect("upsert");
        let second = s.upsert_concept("  python ", "python again", 0.0, now).expect("upsert");
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert!(second.strength > first.strength);
        assert_eq!(s.graph().concept_count(), 1);
        assert_eq!(s.persistence().concept_count().expect("count"), 1);
        assert_eq!(s.persistence().event_count().expect("events"), 1);
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut s = store();
        assert!(s.upsert_concept("   ", "", 0.0, Utc::now()).is_err());
        assert!(s.graph().is_empty());
    }

    #[test]
    fn self_loop_is_silent_noop() {
        let mut s = store();
        let now = Utc::now();
        let id = s.upsert_concept("rust", "", 0.0, now).expect("upsert").id;
        let out = s
            .add_or_strengthen_edge(&id, &id, 0.9, ConnectionKind::CoOccurrence, now)
            .expect("edge");
        assert_eq!(out, EdgeOutcome::SelfLoop);
        assert_eq!(s.graph().edge_count(), 0);
    }

    #[test]
    fn nan_never_clears_the_threshold() {
        let now = Utc::now();
        let mut s = store();
        let a = s.upsert_concept("coding", "", 0.0, now).expect("a").id;
        let b = s.upsert_concept("python", "", 0.0, now).expect("b").id;
        let out = s
            .add_or_strengthen_edge(&a, &b, f64::NAN, ConnectionKind::CoOccurrence, now)
            .expect("edge");
        assert_eq!(out, EdgeOutcome::BelowThreshold);

        let db = PersistenceLayer::open_in_memory(&PersistenceConfig::default()).expect("db");
        let connection = ConnectionConfig {
            creation_threshold: f64::NAN,
            ..ConnectionConfig::default()
        };
        let mut s = ConceptGraphStore::load(
            db,
            ConceptConfig::default(),
            connection,
            ReinforcementConfig::default(),
            Arc::new(NousCounters::new()),
        )
        .expect("store");
        let a = s.upsert_concept("coding", "", 0.0, now).expect("a").id;
        let b = s.upsert_concept("python", "", 0.0, now).expect("b").id;
        let out = s
            .add_or_strengthen_edge(&a, &b, 0.06, ConnectionKind::CoOccurrence, now)
            .expect("edge");
        assert_eq!(out, EdgeOutcome::BelowThreshold);
        assert_eq!(s.graph().edge_count(), 0);
    }

    #[test]
    fn threshold_gates_creation() {
        let mut s = store();
        let now = Utc::now();
        let a = s.upsert_concept("coding", "", 0.0, now).expect("a").id;
        let b = s.upsert_concept("python", "", 0.0, now).expect("b").id;
        let c = s.upsert_concept("gardening", "", 0.0, now).expect("c").id;

        let low = s
            .add_or_strengthen_edge(&a, &c, 0.2, ConnectionKind::CoOccurrence, now)
            .expect("edge");
        assert_eq!(low, EdgeOutcome::BelowThreshold);

        let high = s
            .add_or_strengthen_edge(&a, &b, 0.42, ConnectionKind::CoOccurrence, now)
            .expect("edge");
        assert!(high.is_created());
        assert_eq!(s.graph().edge_count(), 1);
        assert_eq!(s.graph().degree(&a), 1);
        assert!(s.graph().concept(&a).expect("a").related_ids.contains(&b));
        assert!(s.graph().concept(&b).expect("b").related_ids.contains(&a));
    }

    #[test]
    fn reinforcing_edge_is_order_independent_and_capped() {
        let mut s = store();
        let now = Utc::now();
        let a = s.upsert_concept("coding", "", 0.0, now).expect("a").id;
        let b = s.upsert_concept("python", "", 0.0, now).expect("b").id;
        s.add_or_strengthen_edge(&a, &b, 0.85, ConnectionKind::CoOccurrence, now)
            .expect("create");
        let out = s
            .add_or_strengthen_edge(&b, &a, 0.0, ConnectionKind::Semantic, now)
            .expect("reinforce");
        assert!(matches!(out, EdgeOutcome::Reinforced(w) if (w - 0.95).abs() < 1e-9));
        s.add_or_strengthen_edge(&a, &b, 0.0, ConnectionKind::CoOccurrence, now)
            .expect("reinforce");

        let edge = s.graph().edge(&a, &b).expect("edge");
        assert!((edge.weight - 1.0).abs() < 1e-12);
        assert_eq!(edge.reinforcement_count, 2);
        assert_eq!(edge.source, a);
        assert_eq!(edge.kind, ConnectionKind::CoOccurrence);
        assert_eq!(s.graph().edge_count(), 1);
    }

    #[test]
    fn missing_endpoint_creates_nothing() {
        let mut s = store();
        let now = Utc::now();
        let a = s.upsert_concept("coding", "", 0.0, now).expect("a").id;
        let ghost = ConceptId::from_name("ghost");
        let out = s
            .add_or_strengthen_edge(&a, &ghost, 0.9, ConnectionKind::CoOccurrence, now)
            .expect("edge");
        assert_eq!(out, EdgeOutcome::MissingEndpoint);
    }

    #[test]
    fn resync_matches_database() {
        let mut s = store();
        let now = Utc::now();
        let a = s.upsert_concept("coding", "", 0.0, now).expect("a").id;
        let b = s.upsert_concept("python", "", 0.0, now).expect("b").id;
        s.add_or_strengthen_edge(&a, &b, 0.5, ConnectionKind::CoOccurrence, now)
            .expect("edge");
        s.upsert_concept("python", "", 0.0, now + Duration::hours(1)).expect("again");

        let before: Vec<Concept> = s.graph().concepts().cloned().collect();
        s.resync().expect("resync");
        let after: Vec<Concept> = s.graph().concepts().cloned().collect();
        assert_eq!(before.len(), after.len());
        for (x, y) in before.iter().zip(&after) {
            assert_eq!(x.id, y.id);
            assert!((x.strength - y.strength).abs() < 1e-12);
            assert_eq!(x.related_ids, y.related_ids);
        }
        assert_eq!(s.graph().edge_count(), 1);
    }

    #[test]
    fn snippets_are_truncated() {
        let mut s = store();
        let long = "é".repeat(500);
        let id = s.upsert_concept("accent", &long, 0.0, Utc::now()).expect("upsert").id;
        let c = s.graph().concept(&id).expect("concept");
        assert_eq!(c.source_snippets[0].chars().count(), 200);
    }

    #[test]
    fn density_uses_unordered_pairs() {
        let now = Utc::now();
        let a = Concept::new("a", 0.1, 0.1, now);
        let b = Concept::new("b", 0.1, 0.1, now);
        let edge = Connection {
            source: a.id.clone(),
            target: b.id.clone(),
            weight: 0.5,
            kind: ConnectionKind::CoOccurrence,
            reinforcement_count: 0,
            discovered_at: now,
        };
        let g = ConceptGraph::from_parts(vec![a, b], vec![edge]);
        assert!((g.density() - 1.0).abs() < 1e-12);
        assert_eq!(ConceptGraph::default().density(), 0.0);
    }
}
