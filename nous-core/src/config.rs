//! Configuration for the NOUS evolution engine.
//!
//! Maps directly to `nous.toml`. Every section and field is optional; a
//! missing value falls back to the defaults documented on each field.

use serde::{Deserialize, Serialize};

/// Top-level NOUS configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NousConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// SQLite settings.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Concept candidate limits.
    #[serde(default)]
    pub extraction: ExtractionConfig,
    /// Initial values and snippet retention for concepts.
    #[serde(default)]
    pub concept: ConceptConfig,
    /// Concept reinforcement and time decay.
    #[serde(default)]
    pub reinforcement: ReinforcementConfig,
    /// Connection strength weighting.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Interaction pattern fingerprinting.
    #[serde(default)]
    pub pattern: PatternConfig,
    /// Capability growth constants.
    #[serde(default)]
    pub capability: CapabilityConfig,
    /// Evolution cascade thresholds and analytics caps.
    #[serde(default)]
    pub cascade: CascadeConfig,
    /// Status reporting.
    #[serde(default)]
    pub status: StatusConfig,
}

impl NousConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `NousError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::NousError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Check the constraints serde cannot express: every threshold, weight
    /// and ratio is finite and within [0, 1], growth constants are finite
    /// and non-negative, and counts and windows are in range.
    ///
    /// # Errors
    /// Returns `NousError::Config` naming the first violated constraint.
    pub fn validate(&self) -> crate::error::Result<()> {
        let c = &self.concept;
        unit("concept.initial_strength", c.initial_strength)?;
        unit("concept.initial_confidence", c.initial_confidence)?;

        let r = &self.reinforcement;
        unit("reinforcement.base_delta", r.base_delta)?;
        unit("reinforcement.sentiment_weight", r.sentiment_weight)?;
        unit("reinforcement.min_time_factor", r.min_time_factor)?;
        unit("reinforcement.confidence_ratio", r.confidence_ratio)?;
        if !(r.decay_horizon_hours.is_finite() && r.decay_horizon_hours > 0.0) {
            return invalid("reinforcement.decay_horizon_hours must be finite and positive");
        }

        let n = &self.connection;
        unit("connection.creation_threshold", n.creation_threshold)?;
        unit("connection.reinforce_step", n.reinforce_step)?;
        unit("connection.proximity_weight", n.proximity_weight)?;
        unit("connection.semantic_weight", n.semantic_weight)?;
        unit("connection.cooccurrence_weight", n.cooccurrence_weight)?;
        unit("connection.cooccurrence_prior", n.cooccurrence_prior)?;
        if n.proximity_window_chars == 0 {
            return invalid("connection.proximity_window_chars must be non-zero");
        }

        let p = &self.pattern;
        unit("pattern.sentiment_threshold", p.sentiment_threshold)?;
        unit("pattern.min_initial_effectiveness", p.min_initial_effectiveness)?;

        let cap = &self.capability;
        non_negative("capability.conversation_per_char", cap.conversation_per_char)?;
        non_negative("capability.response_per_char", cap.response_per_char)?;
        non_negative("capability.length_growth_cap", cap.length_growth_cap)?;
        non_negative("capability.sentiment_factor", cap.sentiment_factor)?;
        non_negative("capability.unknown_intent_growth", cap.unknown_intent_growth)?;
        non_negative("capability.known_intent_growth", cap.known_intent_growth)?;
        non_negative("capability.intent_bonus", cap.intent_bonus)?;
        unit("capability.growth_rate_cap", cap.growth_rate_cap)?;
        if !(1..=MAX_RECENT_WINDOW_DAYS).contains(&cap.recent_window_days) {
            return invalid("capability.recent_window_days must be within [1, 36500]");
        }

        let k = &self.cascade;
        unit("cascade.degree_step", k.degree_step)?;
        unit("cascade.max_degree_boost", k.max_degree_boost)?;
        unit("cascade.pagerank_boost", k.pagerank_boost)?;
        unit("cascade.pagerank_damping", k.pagerank_damping)?;
        unit("cascade.pattern_effectiveness_threshold", k.pattern_effectiveness_threshold)?;
        non_negative("cascade.max_pattern_weight", k.max_pattern_weight)?;

        let e = &self.extraction;
        if e.max_concepts == 0 || e.max_document_concepts == 0 {
            return invalid("extraction.max_concepts and max_document_concepts must be non-zero");
        }
        if e.min_word_chars == 0 {
            return invalid("extraction.min_word_chars must be non-zero");
        }
        Ok(())
    }
}

/// Upper bound of `capability.recent_window_days` (about a century).
pub const MAX_RECENT_WINDOW_DAYS: i64 = 36_500;

fn invalid(msg: &str) -> crate::error::Result<()> {
    Err(crate::NousError::Config(msg.to_string()))
}

fn unit(field: &str, value: f64) -> crate::error::Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        invalid(&format!("{field} must be a finite value within [0, 1], got {value}"))
    }
}

fn non_negative(field: &str, value: f64) -> crate::error::Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        invalid(&format!("{field} must be finite and non-negative, got {value}"))
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error. `RUST_LOG` wins if set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON-formatted log lines.
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Use WAL mode so the bulk-ingestion path can overlap readers.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// How long SQLite waits on a locked database.
    #[serde(default = "default_5000")]
    pub busy_timeout_ms: u64,
    /// Number of rotating backups to keep.
    #[serde(default = "default_3")]
    pub backup_count: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            wal_mode: true,
            busy_timeout_ms: 5000,
            backup_count: 3,
        }
    }
}

/// Limits applied to concept candidates, whatever extractor produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Max concepts taken from a single interaction.
    #[serde(default = "default_15")]
    pub max_concepts: usize,
    /// Max whitespace-separated tokens in one concept name.
    #[serde(default = "default_4")]
    pub max_tokens_per_concept: usize,
    /// Terms never treated as concepts (e.g. the assistant's own name).
    #[serde(default)]
    pub excluded_terms: Vec<String>,
    /// Max concepts taken from a single ingested document.
    #[serde(default = "default_40")]
    pub max_document_concepts: usize,
    /// Words shorter than this are never extracted as keywords.
    #[serde(default = "default_3_usize")]
    pub min_word_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_concepts: 15,
            max_tokens_per_concept: 4,
            excluded_terms: Vec::new(),
            max_document_concepts: 40,
            min_word_chars: 3,
        }
    }
}

/// Concept creation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptConfig {
    /// Strength of a newly discovered concept.
    #[serde(default = "default_0_1")]
    pub initial_strength: f64,
    /// Confidence of a newly discovered concept.
    #[serde(default = "default_0_1")]
    pub initial_confidence: f64,
    /// Snippets retained per concept.
    #[serde(default = "default_5_usize")]
    pub max_snippets: usize,
    /// Snippets are truncated to this many characters.
    #[serde(default = "default_200_usize")]
    pub max_snippet_chars: usize,
}

impl Default for ConceptConfig {
    fn default() -> Self {
        Self {
            initial_strength: 0.1,
            initial_confidence: 0.1,
            max_snippets: 5,
            max_snippet_chars: 200,
        }
    }
}

/// Reinforcement with time decay.
///
/// `delta = base_delta × (1 + sentiment_weight × bonus) × max(min_time_factor, 1 − hours / decay_horizon_hours)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReinforcementConfig {
    /// Base strength gain per sighting.
    #[serde(default = "default_0_05")]
    pub base_delta: f64,
    /// How much sentiment (in [-1, 1]) scales the gain.
    #[serde(default = "default_0_5")]
    pub sentiment_weight: f64,
    /// Hours after which the time factor reaches its floor.
    #[serde(default = "default_168")]
    pub decay_horizon_hours: f64,
    /// Floor of the time factor.
    #[serde(default = "default_0_1")]
    pub min_time_factor: f64,
    /// Confidence gains this fraction of the strength delta.
    #[serde(default = "default_0_3")]
    pub confidence_ratio: f64,
}

impl Default for ReinforcementConfig {
    fn default() -> Self {
        Self {
            base_delta: 0.05,
            sentiment_weight: 0.5,
            decay_horizon_hours: 168.0,
            min_time_factor: 0.1,
            confidence_ratio: 0.3,
        }
    }
}

/// Connection strength weighting. The three weights should sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Edges are created only above this strength.
    #[serde(default = "default_0_2")]
    pub creation_threshold: f64,
    /// Weight gained each time an existing edge is observed again.
    #[serde(default = "default_0_1")]
    pub reinforce_step: f64,
    /// Weight of textual proximity.
    #[serde(default = "default_0_4")]
    pub proximity_weight: f64,
    /// Weight of semantic similarity.
    #[serde(default = "default_0_4")]
    pub semantic_weight: f64,
    /// Weight of the co-occurrence prior.
    #[serde(default = "default_0_2")]
    pub cooccurrence_weight: f64,
    /// Fixed co-occurrence prior.
    #[serde(default = "default_0_3")]
    pub cooccurrence_prior: f64,
    /// Proximity reaches zero at this character distance.
    #[serde(default = "default_100_usize")]
    pub proximity_window_chars: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            creation_threshold: 0.2,
            reinforce_step: 0.1,
            proximity_weight: 0.4,
            semantic_weight: 0.4,
            cooccurrence_weight: 0.2,
            cooccurrence_prior: 0.3,
            proximity_window_chars: 100,
        }
    }
}

/// Interaction pattern fingerprinting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// |sentiment| above this is bucketed as positive/negative.
    #[serde(default = "default_0_3")]
    pub sentiment_threshold: f64,
    /// Responses longer than this are "detailed".
    #[serde(default = "default_200_usize")]
    pub detailed_response_chars: usize,
    /// Lower bound of a new pattern's effectiveness.
    #[serde(default = "default_0_1")]
    pub min_initial_effectiveness: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            sentiment_threshold: 0.3,
            detailed_response_chars: 200,
            min_initial_effectiveness: 0.1,
        }
    }
}

/// Capability growth constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    /// conversation_handling growth per input character.
    #[serde(default = "default_0_00005")]
    pub conversation_per_char: f64,
    /// response_generation growth per output character.
    #[serde(default = "default_0_00002")]
    pub response_per_char: f64,
    /// Cap on either length-proportional growth.
    #[serde(default = "default_0_01")]
    pub length_growth_cap: f64,
    /// sentiment_understanding growth per unit of |sentiment|.
    #[serde(default = "default_0_005")]
    pub sentiment_factor: f64,
    /// intent_recognition growth when the intent is unknown.
    #[serde(default = "default_0_002")]
    pub unknown_intent_growth: f64,
    /// intent_recognition growth when the intent is known.
    #[serde(default = "default_0_005")]
    pub known_intent_growth: f64,
    /// Bonus for intent-specific capabilities (creativity, analytical_thinking, empathy).
    #[serde(default = "default_0_008")]
    pub intent_bonus: f64,
    /// Ceiling for `growth_rate`.
    #[serde(default = "default_0_05")]
    pub growth_rate_cap: f64,
    /// Capabilities exercised within this many days count as recent.
    #[serde(default = "default_7_i64")]
    pub recent_window_days: i64,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            conversation_per_char: 0.000_05,
            response_per_char: 0.000_02,
            length_growth_cap: 0.01,
            sentiment_factor: 0.005,
            unknown_intent_growth: 0.002,
            known_intent_growth: 0.005,
            intent_bonus: 0.008,
            growth_rate_cap: 0.05,
            recent_window_days: 7,
        }
    }
}

/// Evolution cascade settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    /// Whether threshold-triggered cascades run at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Trigger when a pass yields more than this many new concepts.
    #[serde(default = "default_5_usize")]
    pub new_concept_threshold: usize,
    /// Trigger when a pass yields more than this many new connections.
    #[serde(default = "default_3_usize")]
    pub new_connection_threshold: usize,
    /// Strength gained per unit of degree.
    #[serde(default = "default_0_02")]
    pub degree_step: f64,
    /// Ceiling of the degree boost.
    #[serde(default = "default_0_2")]
    pub max_degree_boost: f64,
    /// Strength gained per unit of PageRank score.
    #[serde(default = "default_0_1")]
    pub pagerank_boost: f64,
    /// PageRank damping factor.
    #[serde(default = "default_0_85")]
    pub pagerank_damping: f64,
    /// PageRank power iterations.
    #[serde(default = "default_50_usize")]
    pub pagerank_iterations: usize,
    /// Clusters smaller than this are discarded.
    #[serde(default = "default_3_usize")]
    pub min_cluster_size: usize,
    /// Patterns above this effectiveness feed the response-pattern weights.
    #[serde(default = "default_0_6")]
    pub pattern_effectiveness_threshold: f64,
    /// Ceiling of a response-pattern weight.
    #[serde(default = "default_2_0")]
    pub max_pattern_weight: f64,
    /// Analytics only see the strongest N concepts.
    #[serde(default = "default_1000_usize")]
    pub max_analytics_nodes: usize,
    /// Analytics only see the heaviest N edges among those concepts.
    #[serde(default = "default_20000_usize")]
    pub max_analytics_edges: usize,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            new_concept_threshold: 5,
            new_connection_threshold: 3,
            degree_step: 0.02,
            max_degree_boost: 0.2,
            pagerank_boost: 0.1,
            pagerank_damping: 0.85,
            pagerank_iterations: 50,
            min_cluster_size: 3,
            pattern_effectiveness_threshold: 0.6,
            max_pattern_weight: 2.0,
            max_analytics_nodes: 1000,
            max_analytics_edges: 20_000,
        }
    }
}

/// Status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Number of recent events included in a status report.
    #[serde(default = "default_10_usize")]
    pub recent_events: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { recent_events: 10 }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_0_00002() -> f64 { 0.000_02 }
fn default_0_00005() -> f64 { 0.000_05 }
fn default_0_002() -> f64 { 0.002 }
fn default_0_005() -> f64 { 0.005 }
fn default_0_008() -> f64 { 0.008 }
fn default_0_01() -> f64 { 0.01 }
fn default_0_02() -> f64 { 0.02 }
fn default_0_05() -> f64 { 0.05 }
fn default_0_1() -> f64 { 0.1 }
fn default_0_2() -> f64 { 0.2 }
fn default_0_3() -> f64 { 0.3 }
fn default_0_4() -> f64 { 0.4 }
fn default_0_5() -> f64 { 0.5 }
fn default_0_6() -> f64 { 0.6 }
fn default_0_85() -> f64 { 0.85 }
fn default_2_0() -> f64 { 2.0 }
fn default_168() -> f64 { 168.0 }
fn default_3() -> u32 { 3 }
fn default_3_usize() -> usize { 3 }
fn default_4() -> usize { 4 }
fn default_5_usize() -> usize { 5 }
fn default_7_i64() -> i64 { 7 }
fn default_10_usize() -> usize { 10 }
fn default_15() -> usize { 15 }
fn default_40() -> usize { 40 }
fn default_50_usize() -> usize { 50 }
fn default_100_usize() -> usize { 100 }
fn default_200_usize() -> usize { 200 }
fn default_1000_usize() -> usize { 1000 }
fn default_20000_usize() -> usize { 20_000 }
fn default_5000() -> u64 { 5000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = NousConfig::from_toml("").expect("parse");
        assert_eq!(config.extraction.max_concepts, 15);
        assert_eq!(config.cascade.new_concept_threshold, 5);
        assert!((config.reinforcement.decay_horizon_hours - 168.0).abs() < f64::EPSILON);
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn partial_section_overrides_only_named_fields() {
        let config = NousConfig::from_toml(
            "[cascade]\nnew_concept_threshold = 1\n\n[extraction]\nexcluded_terms = [\"nous\"]\n",
        )
        .expect("parse");
        assert_eq!(config.cascade.new_concept_threshold, 1);
        assert_eq!(config.cascade.new_connection_threshold, 3);
        assert_eq!(config.extraction.excluded_terms, vec!["nous".to_string()]);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = NousConfig::from_toml("[cascade\n").expect_err("must fail");
        assert!(matches!(err, crate::NousError::Config(_)));
    }

    #[test]
    fn validate_rejects_bad_damping() {
        let mut config = NousConfig::default();
        config.cascade.pagerank_damping = 1.5;
        assert!(config.validate().is_err());
    }

    fn rejects(edit: impl FnOnce(&mut NousConfig)) -> bool {
        let mut config = NousConfig::default();
        edit(&mut config);
        matches!(config.validate(), Err(crate::NousError::Config(_)))
    }

    #[test]
    fn validate_rejects_non_finite_connection_values() {
        assert!(rejects(|c| c.connection.creation_threshold = f64::NAN));
        assert!(rejects(|c| c.connection.creation_threshold = 1.5));
        assert!(rejects(|c| c.connection.reinforce_step = -0.1));
        assert!(rejects(|c| c.connection.proximity_weight = f64::INFINITY));
        assert!(rejects(|c| c.connection.semantic_weight = f64::NAN));
        assert!(rejects(|c| c.connection.cooccurrence_weight = 2.0));
        assert!(rejects(|c| c.connection.cooccurrence_prior = f64::NAN));
        assert!(rejects(|c| c.connection.proximity_window_chars = 0));
    }

    #[test]
    fn nan_threshold_from_toml_is_rejected() {
        let config = NousConfig::from_toml("[connection]\ncreation_threshold = nan\n").expect("parse");
        assert!(config.connection.creation_threshold.is_nan());
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_concept_and_reinforcement_values() {
        assert!(rejects(|c| c.concept.initial_strength = f64::NAN));
        assert!(rejects(|c| c.concept.initial_confidence = 1.1));
        assert!(rejects(|c| c.reinforcement.base_delta = f64::NAN));
        assert!(rejects(|c| c.reinforcement.sentiment_weight = -1.0));
        assert!(rejects(|c| c.reinforcement.min_time_factor = f64::INFINITY));
        assert!(rejects(|c| c.reinforcement.confidence_ratio = 3.0));
        assert!(rejects(|c| c.reinforcement.decay_horizon_hours = 0.0));
        assert!(rejects(|c| c.reinforcement.decay_horizon_hours = f64::NAN));
    }

    #[test]
    fn validate_rejects_bad_pattern_and_capability_values() {
        assert!(rejects(|c| c.pattern.sentiment_threshold = f64::NAN));
        assert!(rejects(|c| c.pattern.min_initial_effectiveness = -0.5));
        assert!(rejects(|c| c.capability.conversation_per_char = f64::NAN));
        assert!(rejects(|c| c.capability.response_per_char = -1.0));
        assert!(rejects(|c| c.capability.length_growth_cap = f64::INFINITY));
        assert!(rejects(|c| c.capability.sentiment_factor = f64::NAN));
        assert!(rejects(|c| c.capability.unknown_intent_growth = -0.1));
        assert!(rejects(|c| c.capability.known_intent_growth = f64::NAN));
        assert!(rejects(|c| c.capability.intent_bonus = f64::NEG_INFINITY));
        assert!(rejects(|c| c.capability.growth_rate_cap = f64::NAN));
    }

    #[test]
    fn validate_bounds_recent_window() {
        assert!(rejects(|c| c.capability.recent_window_days = 0));
        assert!(rejects(|c| c.capability.recent_window_days = -7));
        assert!(rejects(|c| c.capability.recent_window_days = i64::MAX));
        let config =
            NousConfig::from_toml("[capability]\nrecent_window_days = 9223372036854775807\n").expect("parse");
        assert!(config.validate().is_err());
        assert!(!rejects(|c| c.capability.recent_window_days = MAX_RECENT_WINDOW_DAYS));
    }

    #[test]
    fn validate_rejects_bad_cascade_values() {
        assert!(rejects(|c| c.cascade.degree_step = f64::NAN));
        assert!(rejects(|c| c.cascade.max_degree_boost = 1.5));
        assert!(rejects(|c| c.cascade.pagerank_boost = f64::NAN));
        assert!(rejects(|c| c.cascade.pagerank_damping = f64::NAN));
        assert!(rejects(|c| c.cascade.pattern_effectiveness_threshold = -0.1));
        assert!(rejects(|c| c.cascade.max_pattern_weight = f64::INFINITY));
    }

    #[test]
    fn validate_rejects_zero_extraction_limits() {
        assert!(rejects(|c| c.extraction.max_concepts = 0));
        assert!(rejects(|c| c.extraction.max_document_concepts = 0));
        assert!(rejects(|c| c.extraction.min_word_chars = 0));
    }
}
