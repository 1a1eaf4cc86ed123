//! # NOUS Core Library
//!
//! Incremental, persistent concept-graph learner.
//!
//! Free-text interactions are turned into a weighted network of concepts
//! and the connections between them:
//!
//! - **Concepts**: normalized text units, created on first sighting and
//!   reinforced (with time decay) on every later one
//! - **Connections**: weighted links between co-occurring concepts
//! - **Interaction patterns**: fingerprints of interaction shape with a
//!   running effectiveness average
//! - **Capabilities**: scalar skill-level metrics grown per interaction
//! - **Evolution cascades**: threshold-triggered batch passes that
//!   strengthen, re-rank (PageRank) and re-cluster the whole graph
//!
//! Durable state lives in SQLite; [`graph::ConceptGraph`] is a write-through
//! cache that is only mutated after the corresponding write has committed.
//!
//! ## Cost Model
//!
//! - Interaction logging: dominated by one SQLite transaction per mutation
//! - Evolution cascade: O(seconds) on large graphs, never call it from a
//!   latency-sensitive path; analytics input is capped by
//!   [`config::CascadeConfig::max_analytics_nodes`]

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]

pub mod capability;
pub mod cascade;
pub mod config;
pub mod connection;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod events;
pub mod extraction;
pub mod graph;
pub mod metrics;
pub mod pattern;
pub mod persistence;
pub mod reinforcement;
pub mod score;
pub mod similarity;
pub mod telemetry;
pub mod types;

pub use config::NousConfig;
pub use engine::{DocumentOutcome, EvolutionEngine, EvolutionStatus, InteractionOutcome};
pub use error::NousError;
pub use types::*;
