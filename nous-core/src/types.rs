//! Core type definitions for the NOUS concept graph.
//!
//! All persisted types are serializable; identifiers are deterministic so
//! that upserts are idempotent.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Normalize a concept name: lowercase, trimmed, internal whitespace collapsed.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable 128-bit hash of `input`, as 32 lowercase hex characters.
#[must_use]
pub fn stable_hash(input: &str) -> String {
    blake3::hash(input.as_bytes()).to_hex().as_str()[..32].to_string()
}

/// Deterministic identifier of a concept, derived from its normalized name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptId(pub String);

impl ConceptId {
    /// Derive the id for a (not necessarily normalized) concept name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self(stable_hash(&normalize_name(name)))
    }

    /// The hex string form of the id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Graph entities
// ---------------------------------------------------------------------------

/// A node in the concept graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    /// Hash of the normalized name.
    pub id: ConceptId,
    /// Normalized name.
    pub name: String,
    /// How established this concept is, in [0, 1].
    pub strength: f64,
    /// How sure we are the concept is meaningful, in [0, 1].
    pub confidence: f64,
    /// First sighting.
    pub created_at: DateTime<Utc>,
    /// Last time the concept was reinforced.
    pub last_reinforced: DateTime<Utc>,
    /// Ids of concepts this one is connected to.
    pub related_ids: Vec<ConceptId>,
    /// Most recent text snippets the concept was seen in.
    pub source_snippets: Vec<String>,
}

impl Concept {
    /// Create a freshly discovered concept.
    #[must_use]
    pub fn new(name: &str, strength: f64, confidence: f64, now: DateTime<Utc>) -> Self {
        let name = normalize_name(name);
        Self {
            id: ConceptId::from_name(&name),
            name,
            strength: strength.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            created_at: now,
            last_reinforced: now,
            related_ids: Vec::new(),
            source_snippets: Vec::new(),
        }
    }

    /// Record a snippet, keeping at most `max` (oldest dropped first).
    pub fn push_snippet(&mut self, snippet: &str, max: usize) {
        let snippet = snippet.trim();
        if snippet.is_empty() || max == 0 || self.source_snippets.iter().any(|s| s == snippet) {
            return;
        }
        self.source_snippets.push(snippet.to_string());
        if self.source_snippets.len() > max {
            let excess = self.source_snippets.len() - max;
            self.source_snippets.drain(..excess);
        }
    }

    /// Add `other` to the related ids if not already present.
    pub fn relate(&mut self, other: &ConceptId) {
        if *other != self.id && !self.related_ids.contains(other) {
            self.related_ids.push(other.clone());
        }
    }
}

/// How a connection was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Concepts appeared close together in the same text.
    CoOccurrence,
    /// Concepts are semantically similar.
    Semantic,
    /// Concepts were extracted from the same ingested document.
    Document,
}

impl ConnectionKind {
    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CoOccurrence => "co_occurrence",
            Self::Semantic => "semantic",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionKind {
    type Err = crate::NousError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "co_occurrence" => Ok(Self::CoOccurrence),
            "semantic" => Ok(Self::Semantic),
            "document" => Ok(Self::Document),
            other => Err(crate::NousError::Serialization(format!(
                "unknown connection kind: {other}"
            ))),
        }
    }
}

/// A weighted edge between two concepts.
///
/// Edge identity is the unordered pair; `source`/`target` keep the
/// orientation in which the pair was first observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Concept the edge starts from.
    pub source: ConceptId,
    /// Concept the edge points to.
    pub target: ConceptId,
    /// Edge weight in [0, 1], never decreases.
    pub weight: f64,
    /// How the link was established.
    pub kind: ConnectionKind,
    /// Number of times the edge was reinforced after discovery.
    pub reinforcement_count: u32,
    /// When the edge was created.
    pub discovered_at: DateTime<Utc>,
}

impl Connection {
    /// Canonical (order-independent) key of the pair.
    #[must_use]
    pub fn key(&self) -> (ConceptId, ConceptId) {
        edge_key(&self.source, &self.target)
    }
}

/// Canonical key of an unordered concept pair.
#[must_use]
pub fn edge_key(a: &ConceptId, b: &ConceptId) -> (ConceptId, ConceptId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

/// A densely interconnected group of concepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeCluster {
    /// Member ids, sorted.
    pub members: Vec<ConceptId>,
    /// Member names, in the same order as `members`.
    pub names: Vec<String>,
    /// Sum of edge weights inside the cluster.
    pub internal_weight: f64,
}

impl KnowledgeCluster {
    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the cluster has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Embedding Vector
// ---------------------------------------------------------------------------

/// A dense vector embedding for semantic similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// Whether every component is (numerically) zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|x| x.abs() < f32::EPSILON)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Source of "now" for everything time-dependent in the engine.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually driven clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jump to an absolute time.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Fractional hours between two instants (negative spans clamp to zero).
#[must_use]
pub fn hours_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let millis = (later - earlier).num_milliseconds().max(0);
    millis as f64 / 3_600_000.0
}
