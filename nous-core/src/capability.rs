//! Capability tracking: scalar skill-level metrics grown per interaction.
//!
//! Four capabilities are exercised by every interaction:
//!
//! | key                       | growth                                   |
//! |---------------------------|------------------------------------------|
//! | `conversation_handling`   | ∝ input length, capped                   |
//! | `response_generation`     | ∝ output length, capped                  |
//! | `sentiment_understanding` | ∝ \|sentiment\|                          |
//! | `intent_recognition`      | small constant, larger for known intents |
//!
//! Intent-specific bonuses go to `creativity`, `analytical_thinking` and
//! `empathy`. Each update applies `level = min(1, level + growth)` and
//! `growth_rate = min(cap, growth_rate + 0.1 × growth)`.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CapabilityConfig;
use crate::error::Result;
use crate::persistence::PersistenceLayer;

/// Capability exercised by every interaction: conversation handling.
pub const CONVERSATION_HANDLING: &str = "conversation_handling";
/// Capability exercised by every interaction: response generation.
pub const RESPONSE_GENERATION: &str = "response_generation";
/// Capability exercised by every interaction: sentiment understanding.
pub const SENTIMENT_UNDERSTANDING: &str = "sentiment_understanding";
/// Capability exercised by every interaction: intent recognition.
pub const INTENT_RECOGNITION: &str = "intent_recognition";
/// Intent-specific capability: creativity.
pub const CREATIVITY: &str = "creativity";
/// Intent-specific capability: analytical thinking.
pub const ANALYTICAL_THINKING: &str = "analytical_thinking";
/// Intent-specific capability: empathy.
pub const EMPATHY: &str = "empathy";

const CREATIVE_INTENTS: &[&str] = &["creative", "story", "poem", "brainstorm", "imagine"];
const ANALYTICAL_INTENTS: &[&str] = &["question", "analysis", "analytical", "technical", "problem", "explain"];
const EMPATHY_INTENTS: &[&str] = &["emotional", "support", "personal", "feeling", "vent"];

/// A named skill-level metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRecord {
    /// Capability key.
    pub name: String,
    /// Level in [0, 1].
    pub level: f64,
    /// Accumulated growth rate, capped.
    pub growth_rate: f64,
    /// Last time the capability was exercised.
    pub last_exercise: DateTime<Utc>,
}

impl CapabilityRecord {
    fn new(name: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            level: 0.0,
            growth_rate: 0.0,
            last_exercise: now,
        }
    }
}

/// What an interaction looked like, from the capability tracker's view.
#[derive(Debug, Clone, Copy)]
pub struct Exercise<'a> {
    /// Characters in the user's message.
    pub input_chars: usize,
    /// Characters in the response.
    pub output_chars: usize,
    /// Intent label; empty or `unknown` means not recognized.
    pub intent: &'a str,
    /// Sentiment in [-1, 1].
    pub sentiment: f64,
}

/// Tracks capability levels; the map is a cache of `capability_evolution`.
#[derive(Debug, Clone)]
pub struct CapabilityTracker {
    config: CapabilityConfig,
    records: BTreeMap<String, CapabilityRecord>,
}

impl CapabilityTracker {
    /// An empty tracker.
    #[must_use]
    pub fn new(config: CapabilityConfig) -> Self {
        Self {
            config,
            records: BTreeMap::new(),
        }
    }

    /// Rebuild the tracker from the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the capability table cannot be read.
    pub fn load(config: CapabilityConfig, db: &PersistenceLayer) -> Result<Self> {
        let records = db
            .load_capabilities()?
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();
        Ok(Self { config, records })
    }

    /// Growth per capability key for one interaction.
    #[must_use]
    pub fn growth_for(&self, exercise: &Exercise<'_>) -> BTreeMap<&'static str, f64> {
        let cfg = &self.config;
        let intent = exercise.intent.trim().to_lowercase();
        let known = !intent.is_empty() && intent != "unknown";
        let sentiment = exercise.sentiment.clamp(-1.0, 1.0);

        let mut growth = BTreeMap::new();
        growth.insert(
            CONVERSATION_HANDLING,
            (exercise.input_chars as f64 * cfg.conversation_per_char).min(cfg.length_growth_cap),
        );
        growth.insert(
            RESPONSE_GENERATION,
            (exercise.output_chars as f64 * cfg.response_per_char).min(cfg.length_growth_cap),
        );
        growth.insert(SENTIMENT_UNDERSTANDING, sentiment.abs() * cfg.sentiment_factor);
        growth.insert(
            INTENT_RECOGNITION,
            if known { cfg.known_intent_growth } else { cfg.unknown_intent_growth },
        );

        let mentions = |keys: &[&str]| keys.iter().any(|k| intent.contains(k));
        if mentions(CREATIVE_INTENTS) {
            growth.insert(CREATIVITY, cfg.intent_bonus);
        }
        if mentions(ANALYTICAL_INTENTS) {
            growth.insert(ANALYTICAL_THINKING, cfg.intent_bonus);
        }
        if mentions(EMPATHY_INTENTS) {
            growth.insert(EMPATHY, cfg.intent_bonus);
        }
        growth
    }

    /// Apply one growth step to a record.
    fn grow(&self, record: &mut CapabilityRecord, growth: f64, now: DateTime<Utc>) {
        let growth = growth.max(0.0);
        record.level = (record.level + growth).min(1.0);
        record.growth_rate = (record.growth_rate + growth * 0.1).min(self.config.growth_rate_cap);
        record.last_exercise = now;
    }

    /// Exercise the capabilities touched by an interaction.
    ///
    /// The database is written first; the cache only changes once the write
    /// has committed. Returns the growth applied per key.
    ///
    /// # Errors
    ///
    /// Returns an error if the capability rows cannot be written.
    pub fn exercise(
        &mut self,
        db: &mut PersistenceLayer,
        exercise: &Exercise<'_>,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<String, f64>> {
        let growth = self.growth_for(exercise);
        let updated: Vec<CapabilityRecord> = growth
            .iter()
            .map(|(&name, &g)| {
                let mut record = self
                    .records
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| CapabilityRecord::new(name, now));
                self.grow(&mut record, g, now);
                record
            })
            .collect();

        db.save_capabilities(&updated)?;
        for record in updated {
            debug!(capability = %record.name, level = record.level, "Capability exercised");
            self.records.insert(record.name.clone(), record);
        }
        Ok(growth.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    /// All records, by name.
    pub fn records(&self) -> impl Iterator<Item = &CapabilityRecord> {
        self.records.values()
    }

    /// A single record.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CapabilityRecord> {
        self.records.get(name)
    }

    /// Mean level over all capabilities (0 when none exist).
    #[must_use]
    pub fn average_level(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        self.records.values().map(|r| r.level).sum::<f64>() / self.records.len() as f64
    }

    /// Mean growth rate of capabilities exercised within the recent window.
    #[must_use]
    pub fn recent_average_growth_rate(&self, now: DateTime<Utc>) -> f64 {
        // An unrepresentable window reaches past the earliest record.
        let cutoff = Duration::try_days(self.config.recent_window_days)
            .and_then(|window| now.checked_sub_signed(window));
        let recent: Vec<f64> = self
            .records
            .values()
            .filter(|r| cutoff.is_none_or(|c| r.last_exercise >= c))
            .map(|r| r.growth_rate)
            .collect();
        if recent.is_empty() {
            0.0
        } else {
            recent.iter().sum::<f64>() / recent.len() as f64
        }
    }
}
