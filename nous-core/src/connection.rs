//! Connection analysis: should two co-occurring concepts be linked, and
//! how strongly?
//!
//! ```text
//! strength = w_p × proximity + w_s × semantic + w_c × cooccurrence
//! proximity = max(0, 1 − char_distance / window)     (0 if either is absent)
//! ```
//!
//! `cooccurrence` is a fixed prior today; a real co-occurrence frequency
//! table would slot in there.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::ConnectionConfig;
use crate::similarity::{SemanticSimilarity, TokenOverlap};
use crate::types::ConnectionKind;

/// The components of a computed connection strength.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStrength {
    /// Textual proximity in [0, 1].
    pub proximity: f64,
    /// Semantic similarity in [0, 1].
    pub semantic: f64,
    /// Co-occurrence prior.
    pub cooccurrence: f64,
    /// Weighted total, clamped to [0, 1].
    pub total: f64,
}

impl ConnectionStrength {
    /// Which signal dominated.
    #[must_use]
    pub fn kind(&self) -> ConnectionKind {
        if self.semantic > self.proximity {
            ConnectionKind::Semantic
        } else {
            ConnectionKind::CoOccurrence
        }
    }
}

/// Scores concept pairs for edge creation.
#[derive(Clone)]
pub struct ConnectionAnalyzer {
    config: ConnectionConfig,
    similarity: Arc<dyn SemanticSimilarity>,
}

impl std::fmt::Debug for ConnectionAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionAnalyzer")
            .field("config", &self.config)
            .field("similarity", &self.similarity.name())
            .finish()
    }
}

impl ConnectionAnalyzer {
    /// Analyzer using token-overlap similarity.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_similarity(config, Arc::new(TokenOverlap))
    }

    /// Analyzer with a custom similarity strategy.
    #[must_use]
    pub fn with_similarity(config: ConnectionConfig, similarity: Arc<dyn SemanticSimilarity>) -> Self {
        Self { config, similarity }
    }

    /// The analyzer's configuration.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Proximity of the first occurrences of `a` and `b` in `text`.
    #[must_use]
    pub fn proximity(&self, a: &str, b: &str, text: &Haystack) -> f64 {
        let (Some(pa), Some(pb)) = (text.char_offset(a), text.char_offset(b)) else {
            return 0.0;
        };
        let distance = pa.abs_diff(pb) as f64;
        (1.0 - distance / self.config.proximity_window_chars as f64).max(0.0)
    }

    /// Score the pair `(a, b)` as seen in `text`.
    #[must_use]
    pub fn strength(&self, a: &str, b: &str, text: &Haystack) -> ConnectionStrength {
        let cfg = &self.config;
        let proximity = self.proximity(a, b, text);
        let semantic = self.similarity.similarity(a, b).clamp(0.0, 1.0);
        let cooccurrence = cfg.cooccurrence_prior;
        let total = (cfg.proximity_weight * proximity
            + cfg.semantic_weight * semantic
            + cfg.cooccurrence_weight * cooccurrence)
            .clamp(0.0, 1.0);
        ConnectionStrength {
            proximity,
            semantic,
            cooccurrence,
            total,
        }
    }

    /// Whether a new edge with this strength should be created.
    #[must_use]
    pub fn should_connect(&self, strength: f64) -> bool {
        strength > self.config.creation_threshold
    }
}

/// Text lowercased once, searched for many concept names.
///
/// Offsets are counted in chars of the lowercased text, which can differ
/// from the original when lowercasing changes the char count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Haystack(String);

impl Haystack {
    /// Lowercase `text`.
    #[must_use]
    pub fn new(text: &str) -> Self {
        Self(text.to_lowercase())
    }

    /// The lowercased text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Char offset of the first occurrence of `needle` (lowercased).
    #[must_use]
    pub fn char_offset(&self, needle: &str) -> Option<usize> {
        let needle = needle.to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.0
            .find(&needle)
            .map(|byte_idx| self.0[..byte_idx].chars().count())
    }

    /// Up to `max_chars` chars centred on the first occurrence of
    /// `needle`; the head of the text if absent.
    #[must_use]
    pub fn snippet_around(&self, needle: &str, max_chars: usize) -> String {
        let total = self.0.chars().count();
        let offset = self.char_offset(needle).unwrap_or(0);
        let start = offset
            .saturating_sub(max_chars / 2)
            .min(total.saturating_sub(max_chars));
        self.0.chars().skip(start).take(max_chars).collect::<String>().trim().to_string()
    }
}
