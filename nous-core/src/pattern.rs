//! Interaction pattern learning.
//!
//! Each interaction is reduced to a small feature tuple (length buckets,
//! intent, sentiment bucket, question type, response style). The tuple's
//! canonical string is hashed into a `pattern_hash`; repeated shapes bump
//! the pattern's frequency and fold the interaction's sentiment into a
//! running effectiveness average.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PatternConfig;
use crate::error::Result;
use crate::persistence::PersistenceLayer;
use crate::types::stable_hash;

const WH_WORDS: &[&str] = &["what", "why", "how", "when", "where", "who", "which", "whose", "whom"];
const AUXILIARIES: &[&str] = &[
    "is", "are", "am", "was", "were", "do", "does", "did", "can", "could", "will", "would",
    "should", "shall", "may", "might", "have", "has", "had",
];
const REQUEST_OPENERS: &[&str] = &[
    "please", "tell", "show", "explain", "help", "give", "make", "write", "create", "describe",
    "list", "find",
];
const ENTHUSIASM_MARKERS: &[&str] = &["great", "awesome", "amazing", "love", "wonderful", "fantastic"];
const ANALYTICAL_MARKERS: &[&str] = &[
    "because", "therefore", "analysis", "analyze", "data", "however", "consider", "evidence",
    "factor", "compare",
];

// ---------------------------------------------------------------------------
// Feature types
// ---------------------------------------------------------------------------

/// Coarse length bucket so that similar-sized texts share a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthBucket {
    /// Up to 50 characters.
    Short,
    /// Up to 200 characters.
    Medium,
    /// Anything longer.
    Long,
}

impl LengthBucket {
    /// Bucket a character count.
    #[must_use]
    pub fn of(chars: usize) -> Self {
        match chars {
            0..=50 => Self::Short,
            51..=200 => Self::Medium,
            _ => Self::Long,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }
}

/// Sentiment bucketed at ± the configured threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentBucket {
    /// Above the threshold.
    Positive,
    /// Within the threshold.
    Neutral,
    /// Below minus the threshold.
    Negative,
}

impl SentimentBucket {
    /// Bucket a sentiment value.
    #[must_use]
    pub fn of(sentiment: f64, threshold: f64) -> Self {
        if sentiment > threshold {
            Self::Positive
        } else if sentiment < -threshold {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

/// Shape of the user's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Starts with a wh-word.
    WhQuestion,
    /// Starts with an auxiliary verb or ends with `?`.
    YesNoQuestion,
    /// Imperative or polite request.
    Request,
    /// Anything else.
    Statement,
}

impl QuestionType {
    /// Classify a user message.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let lower = message.trim().to_lowercase();
        let first = lower
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .find(|w| !w.is_empty())
            .unwrap_or("");

        if WH_WORDS.contains(&first) {
            Self::WhQuestion
        } else if REQUEST_OPENERS.contains(&first)
            || lower.starts_with("can you")
            || lower.starts_with("could you")
            || lower.starts_with("would you")
        {
            Self::Request
        } else if AUXILIARIES.contains(&first) || lower.ends_with('?') {
            Self::YesNoQuestion
        } else {
            Self::Statement
        }
    }

    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WhQuestion => "wh_question",
            Self::YesNoQuestion => "yes_no_question",
            Self::Request => "request",
            Self::Statement => "statement",
        }
    }
}

/// Style of the response that was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStyle {
    /// Longer than the "detailed" threshold.
    Detailed,
    /// Exclamations or enthusiasm markers.
    Enthusiastic,
    /// Reasoning markers.
    Analytical,
    /// Anything else.
    Conversational,
}

impl ResponseStyle {
    /// Classify a response.
    #[must_use]
    pub fn classify(response: &str, detailed_chars: usize) -> Self {
        if response.chars().count() > detailed_chars {
            return Self::Detailed;
        }
        let lower = response.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if response.contains('!') || words.iter().any(|w| ENTHUSIASM_MARKERS.contains(w)) {
            Self::Enthusiastic
        } else if words.iter().any(|w| ANALYTICAL_MARKERS.contains(w)) {
            Self::Analytical
        } else {
            Self::Conversational
        }
    }

    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detailed => "detailed",
            Self::Enthusiastic => "enthusiastic",
            Self::Analytical => "analytical",
            Self::Conversational => "conversational",
        }
    }
}

/// The feature tuple of one interaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InteractionFeatures {
    /// User message length bucket.
    pub message_length: LengthBucket,
    /// Response length bucket.
    pub response_length: LengthBucket,
    /// Caller-supplied intent label (normalized; empty becomes `unknown`).
    pub intent: String,
    /// Sentiment bucket.
    pub sentiment: SentimentBucket,
    /// Message shape.
    pub question_type: QuestionType,
    /// Response style.
    pub response_style: ResponseStyle,
}

impl InteractionFeatures {
    /// Extract features from one interaction.
    #[must_use]
    pub fn extract(
        user_input: &str,
        response: &str,
        intent: &str,
        sentiment: f64,
        config: &PatternConfig,
    ) -> Self {
        let intent = intent.trim().to_lowercase();
        Self {
            message_length: LengthBucket::of(user_input.chars().count()),
            response_length: LengthBucket::of(response.chars().count()),
            intent: if intent.is_empty() { "unknown".to_string() } else { intent },
            sentiment: SentimentBucket::of(sentiment, config.sentiment_threshold),
            question_type: QuestionType::classify(user_input),
            response_style: ResponseStyle::classify(response, config.detailed_response_chars),
        }
    }

    /// Canonical, order-fixed string form of the tuple.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.message_length.as_str(),
            self.response_length.as_str(),
            self.intent,
            self.sentiment.as_str(),
            self.question_type.as_str(),
            self.response_style.as_str(),
        )
    }

    /// Stable hash of [`canonical`](Self::canonical).
    #[must_use]
    pub fn pattern_hash(&self) -> String {
        stable_hash(&self.canonical())
    }

    /// Group label used for response-pattern weighting.
    #[must_use]
    pub fn pattern_type(&self) -> String {
        format!("{}/{}", self.question_type.as_str(), self.response_style.as_str())
    }
}

impl fmt::Display for InteractionFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// A learned interaction pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionPattern {
    /// Stable hash of the feature tuple.
    pub pattern_hash: String,
    /// `question_type/response_style` group label.
    pub pattern_type: String,
    /// Times this pattern was seen.
    pub frequency: u32,
    /// Running average of non-negative sentiment, in [0, 1].
    pub effectiveness: f64,
    /// First sighting.
    pub first_seen: DateTime<Utc>,
    /// Most recent sighting.
    pub last_used: DateTime<Utc>,
}

/// Weight of a response-pattern group, recomputed by the evolution cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePatternWeight {
    /// `question_type/response_style` group label.
    pub pattern_type: String,
    /// `avg(effectiveness) × (1 + 0.1 × usage)`, capped.
    pub weight: f64,
    /// Total frequency of the contributing patterns.
    pub usage_count: u64,
    /// When the weight was last recomputed.
    pub updated_at: DateTime<Utc>,
}

/// Result of recording one interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternUpdate {
    /// The pattern after the update.
    pub pattern: InteractionPattern,
    /// Whether the pattern was seen for the first time.
    pub is_new: bool,
}

// ---------------------------------------------------------------------------
// Learner
// ---------------------------------------------------------------------------

/// Fingerprints interactions and maintains pattern statistics.
#[derive(Debug, Clone)]
pub struct PatternLearner {
    config: PatternConfig,
}

impl PatternLearner {
    /// Create a learner.
    #[must_use]
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    /// The learner's configuration.
    #[must_use]
    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// Fold one interaction into its pattern.
    ///
    /// New pattern: `frequency = 1`, `effectiveness = max(min_initial, sentiment)`.
    /// Existing: `effectiveness = (eff × f_old + max(0, sentiment)) / f_new`.
    #[must_use]
    pub fn fold(
        &self,
        existing: Option<InteractionPattern>,
        features: &InteractionFeatures,
        sentiment: f64,
        now: DateTime<Utc>,
    ) -> PatternUpdate {
        let sentiment = sentiment.clamp(-1.0, 1.0);
        match existing {
            Some(mut pattern) => {
                let old = f64::from(pattern.frequency);
                pattern.frequency = pattern.frequency.saturating_add(1);
                let new = f64::from(pattern.frequency);
                pattern.effectiveness =
                    ((pattern.effectiveness * old + sentiment.max(0.0)) / new).clamp(0.0, 1.0);
                pattern.last_used = now;
                PatternUpdate {
                    pattern,
                    is_new: false,
                }
            }
            None => PatternUpdate {
                pattern: InteractionPattern {
                    pattern_hash: features.pattern_hash(),
                    pattern_type: features.pattern_type(),
                    frequency: 1,
                    effectiveness: sentiment.max(self.config.min_initial_effectiveness).min(1.0),
                    first_seen: now,
                    last_used: now,
                },
                is_new: true,
            },
        }
    }

    /// Load, fold and persist the pattern for `features`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern cannot be read or written.
    pub fn record(
        &self,
        db: &mut PersistenceLayer,
        features: &InteractionFeatures,
        sentiment: f64,
        now: DateTime<Utc>,
    ) -> Result<PatternUpdate> {
        let existing = db.load_pattern(&features.pattern_hash())?;
        let update = self.fold(existing, features, sentiment, now);
        db.save_pattern(&update.pattern)?;
        debug!(
            pattern = %features,
            frequency = update.pattern.frequency,
            effectiveness = update.pattern.effectiveness,
            "Recorded interaction pattern"
        );
        Ok(update)
    }
}
