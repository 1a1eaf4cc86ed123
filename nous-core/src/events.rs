//! Evolution event log entries.
//!
//! Events are append-only. The typed [`EvolutionEventKind`] is stored as
//! JSON in the `trigger_data` column; `event_type` duplicates its tag so
//! the table stays queryable without parsing JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConceptId, ConnectionKind};

/// What happened, with the fields that matter for that kind of event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvolutionEventKind {
    /// A concept was seen for the first time.
    ConceptDiscovered {
        /// Id of the new concept.
        concept_id: ConceptId,
        /// Normalized name.
        name: String,
    },
    /// Two concepts were linked for the first time.
    ConnectionDiscovered {
        /// Edge source.
        source: ConceptId,
        /// Edge target.
        target: ConceptId,
        /// Initial weight.
        weight: f64,
        /// How the link was established.
        kind: ConnectionKind,
    },
    /// A processing pass crossed the cascade thresholds.
    CascadeTriggered {
        /// New concepts in the triggering pass.
        new_concepts: usize,
        /// New connections in the triggering pass.
        new_connections: usize,
    },
    /// A cascade finished (possibly with failed steps).
    CascadeCompleted {
        /// Steps that ran to completion.
        steps_succeeded: usize,
        /// Steps that were skipped because of an error.
        steps_failed: usize,
        /// Clusters found by community detection.
        clusters: usize,
    },
    /// A document was ingested.
    DocumentIngested {
        /// Caller-supplied document name.
        source_name: String,
        /// Concepts created or reinforced.
        concepts: usize,
        /// Connections created.
        connections: usize,
    },
}

impl EvolutionEventKind {
    /// Value of the `event_type` column.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ConceptDiscovered { .. } => "concept_discovered",
            Self::ConnectionDiscovered { .. } => "connection_discovered",
            Self::CascadeTriggered { .. } => "cascade_triggered",
            Self::CascadeCompleted { .. } => "cascade_completed",
            Self::DocumentIngested { .. } => "document_ingested",
        }
    }

    /// Human-readable one-line description.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::ConceptDiscovered { name, .. } => format!("Discovered concept '{name}'"),
            Self::ConnectionDiscovered { weight, kind, .. } => {
                format!("Discovered {kind} connection (weight {weight:.2})")
            }
            Self::CascadeTriggered {
                new_concepts,
                new_connections,
            } => format!(
                "Evolution cascade triggered by {new_concepts} new concepts and {new_connections} new connections"
            ),
            Self::CascadeCompleted {
                steps_succeeded,
                steps_failed,
                clusters,
            } => format!(
                "Evolution cascade completed: {steps_succeeded} steps ok, {steps_failed} skipped, {clusters} clusters"
            ),
            Self::DocumentIngested {
                source_name,
                concepts,
                connections,
            } => format!(
                "Ingested '{source_name}': {concepts} concepts, {connections} new connections"
            ),
        }
    }

    /// Impact score in [0, 1].
    #[must_use]
    pub fn impact_score(&self) -> f64 {
        match self {
            Self::ConceptDiscovered { .. } => 0.1,
            Self::ConnectionDiscovered { weight, .. } => weight.clamp(0.0, 1.0),
            Self::CascadeTriggered { .. } => 0.5,
            Self::CascadeCompleted {
                steps_succeeded,
                steps_failed,
                ..
            } => {
                let total = steps_succeeded + steps_failed;
                if total == 0 {
                    0.0
                } else {
                    *steps_succeeded as f64 / total as f64
                }
            }
            Self::DocumentIngested { concepts, .. } => (*concepts as f64 / 20.0).min(1.0),
        }
    }
}

/// One row of the evolution event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionEvent {
    /// Row id, `None` until persisted.
    pub id: Option<i64>,
    /// Typed payload.
    pub kind: EvolutionEventKind,
    /// Human-readable description.
    pub description: String,
    /// Impact score in [0, 1].
    pub impact_score: f64,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
}

impl EvolutionEvent {
    /// Build an event, deriving description and impact from the payload.
    #[must_use]
    pub fn new(kind: EvolutionEventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: None,
            description: kind.description(),
            impact_score: kind.impact_score(),
            kind,
            timestamp,
        }
    }
}
