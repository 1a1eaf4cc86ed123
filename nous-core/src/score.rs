//! Aggregate evolution score.
//!
//! ```text
//! score = 0.25 × size + 0.20 × density + 0.25 × avg_strength
//!       + 0.20 × avg_capability + 0.05 × clustering
//!       + 0.03 × std_dev(betweenness) + min(0.02, 50 × recent_growth)
//! ```
//!
//! `size = min(1, concepts / 1000)`. The result is clamped to [0, 1]; an
//! empty graph scores exactly 0.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::CapabilityTracker;
use crate::config::CascadeConfig;
use crate::graph::analytics::{std_dev, AnalyticsGraph};
use crate::graph::ConceptGraph;

/// Concept count at which the size component saturates.
pub const SATURATION_CONCEPTS: f64 = 1000.0;

/// The inputs of the score, each already normalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    /// Concepts in the graph.
    pub concept_count: usize,
    /// Edges over possible pairs.
    pub density: f64,
    /// Mean concept strength.
    pub average_strength: f64,
    /// Mean capability level.
    pub average_capability: f64,
    /// Average clustering coefficient.
    pub clustering: f64,
    /// Standard deviation of betweenness centrality.
    pub centrality_std_dev: f64,
    /// Mean growth rate of recently exercised capabilities.
    pub recent_growth_rate: f64,
}

impl ScoreComponents {
    /// Gather the components from the live graph and capabilities.
    ///
    /// Clustering and centrality run on the capped analytics snapshot.
    #[must_use]
    pub fn gather(
        graph: &ConceptGraph,
        capabilities: &CapabilityTracker,
        cascade: &CascadeConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let view = AnalyticsGraph::build(graph, cascade.max_analytics_nodes, cascade.max_analytics_edges);
        Self {
            concept_count: graph.concept_count(),
            density: graph.density(),
            average_strength: graph.average_strength(),
            average_capability: capabilities.average_level(),
            clustering: view.average_clustering(),
            centrality_std_dev: std_dev(&view.betweenness()),
            recent_growth_rate: capabilities.recent_average_growth_rate(now),
        }
    }

    /// The weighted score in [0, 1].
    #[must_use]
    pub fn score(&self) -> f64 {
        if self.concept_count == 0 {
            return 0.0;
        }
        let size = (self.concept_count as f64 / SATURATION_CONCEPTS).min(1.0);
        let growth = (50.0 * self.recent_growth_rate.max(0.0)).min(0.02);
        let total = 0.25 * size
            + 0.20 * self.density
            + 0.25 * self.average_strength
            + 0.20 * self.average_capability
            + 0.05 * self.clustering
            + 0.03 * self.centrality_std_dev
            + growth;
        if total.is_finite() { total.clamp(0.0, 1.0) } else { 0.0 }
    }
}
