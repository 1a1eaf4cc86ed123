//! Concept reinforcement with time decay.
//!
//! ```text
//! sentiment_mult = 1 + sentiment_weight × bonus          bonus ∈ [-1, 1]
//! time_factor    = max(min_time_factor, 1 − hours / decay_horizon_hours)
//! delta          = base_delta × sentiment_mult × time_factor
//! strength       = min(1, strength + delta)
//! confidence     = min(1, confidence + delta × confidence_ratio)
//! ```
//!
//! The longer a concept goes unseen, the less a new sighting adds; after a
//! week the gain bottoms out at the floor. `delta` is never negative, so
//! strength and confidence can only grow.

use chrono::{DateTime, Utc};

use crate::config::ReinforcementConfig;
use crate::types::{hours_between, Concept};

/// Time factor for a concept last reinforced `hours` ago.
#[must_use]
pub fn time_factor(hours: f64, config: &ReinforcementConfig) -> f64 {
    (1.0 - hours.max(0.0) / config.decay_horizon_hours).max(config.min_time_factor)
}

/// Strength delta for one reinforcement.
#[must_use]
pub fn reinforcement_delta(hours: f64, sentiment_bonus: f64, config: &ReinforcementConfig) -> f64 {
    let sentiment_mult = 1.0 + config.sentiment_weight * sentiment_bonus.clamp(-1.0, 1.0);
    (config.base_delta * sentiment_mult * time_factor(hours, config)).max(0.0)
}

/// Sole mutator of concept strength and confidence after creation.
#[derive(Debug, Clone)]
pub struct ReinforcementEngine {
    config: ReinforcementConfig,
}

impl ReinforcementEngine {
    /// Create an engine with the given tuning.
    #[must_use]
    pub fn new(config: ReinforcementConfig) -> Self {
        Self { config }
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &ReinforcementConfig {
        &self.config
    }

    /// Return the reinforced version of `concept` at time `now`.
    ///
    /// The input is left untouched so callers can persist the result before
    /// swapping it into the cache.
    #[must_use]
    pub fn reinforce(&self, concept: &Concept, sentiment_bonus: f64, now: DateTime<Utc>) -> Concept {
        let hours = hours_between(concept.last_reinforced, now);
        let delta = reinforcement_delta(hours, sentiment_bonus, &self.config);
        let mut updated = concept.clone();
        updated.strength = (concept.strength + delta).min(1.0);
        updated.confidence = (concept.confidence + delta * self.config.confidence_ratio).min(1.0);
        updated.last_reinforced = now.max(concept.last_reinforced);
        updated
    }
}
