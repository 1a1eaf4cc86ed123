//! Integration Tests: End-to-End Learning Flows
//!
//! Complete scenarios through the public engine API: chat turns, document
//! ingestion, cascades on degenerate graphs, persistence across restarts.

use std::sync::Arc;

use chrono::{Duration, Utc};

use nous_core::capability::{CapabilityTracker, CONVERSATION_HANDLING};
use nous_core::cascade::EvolutionCascade;
use nous_core::config::{CapabilityConfig, CascadeConfig, NousConfig, PersistenceConfig};
use nous_core::embedding::HashingEmbeddingProvider;
use nous_core::events::EvolutionEventKind;
use nous_core::graph::{ConceptGraphStore, EdgeOutcome};
use nous_core::metrics::NousCounters;
use nous_core::persistence::PersistenceLayer;
use nous_core::similarity::EmbeddingSimilarity;
use nous_core::{ConceptId, ConnectionKind, EvolutionEngine, ManualClock};

fn engine() -> EvolutionEngine {
    EvolutionEngine::open_in_memory(NousConfig::default()).expect("engine")
}

fn store() -> ConceptGraphStore {
    let config = NousConfig::default();
    let db = PersistenceLayer::open_in_memory(&config.persistence).expect("db");
    ConceptGraphStore::load(
        db,
        config.concept,
        config.connection,
        config.reinforcement,
        Arc::new(NousCounters::new()),
    )
    .expect("store")
}

// ---------------------------------------------------------------------------
// The python scenario
// ---------------------------------------------------------------------------

#[test]
fn python_is_created_once_then_reinforced() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let e = engine().with_clock(clock.clone());

    let first = e
        .log_interaction("I love coding in python", "That's great!", "chat", 0.6)
        .expect("first");
    assert!(first.new_concepts.contains(&"python".to_string()));
    let after_first = e.get_concept("python").expect("python").strength;

    clock.advance(Duration::minutes(5));
    let second = e
        .log_interaction("python classes are elegant", "They are.", "chat", 0.4)
        .expect("second");
    assert!(!second.new_concepts.contains(&"python".to_string()));
    assert!(second.reinforced_concepts.contains(&"python".to_string()));
    let after_second = e.get_concept("python").expect("python").strength;
    assert!(after_second > after_first);

    let python = ConceptId::from_name("python");
    let related: Vec<String> = e
        .related_concepts("python")
        .into_iter()
        .map(|(c, _)| c.name)
        .collect();
    assert!(related.contains(&"coding".to_string()));
    assert!(related.contains(&"classes".to_string()));
    assert!(e.get_concept("coding").expect("coding").related_ids.contains(&python));

    // love, coding, python, classes, elegant
    let status = e.get_evolution_status().expect("status");
    assert_eq!(status.concept_count, 5);
}

#[test]
fn concept_count_is_deterministic_for_fixed_extractor() {
    let run = || {
        let e = engine();
        for turn in ["I love coding in python", "python classes are elegant", "Rust is fast"] {
            e.log_interaction(turn, "ok", "chat", 0.0).expect("log");
        }
        let status = e.get_evolution_status().expect("status");
        (status.concept_count, status.connection_count)
    };
    assert_eq!(run(), run());
}

#[test]
fn short_chat_turns_do_not_cascade() {
    let e = engine();
    for turn in ["hello there", "I love coding in python", "python classes are elegant"] {
        let out = e.log_interaction(turn, "ok", "chat", 0.1).expect("log");
        assert!(out.cascade.is_none());
    }
    assert_eq!(e.counters().snapshot().cascades_run, 0);
}

// ---------------------------------------------------------------------------
// Graph invariants through the store
// ---------------------------------------------------------------------------

#[test]
fn self_loop_never_changes_edge_count() {
    let mut s = store();
    let now = Utc::now();
    let id = s.upsert_concept("loop", "", 0.0, now).expect("upsert").id;
    for _ in 0..3 {
        let out = s
            .add_or_strengthen_edge(&id, &id, 1.0, ConnectionKind::Semantic, now)
            .expect("edge");
        assert_eq!(out, EdgeOutcome::SelfLoop);
    }
    assert_eq!(s.graph().edge_count(), 0);
    assert_eq!(s.persistence().connection_count().expect("count"), 0);
}

#[test]
fn creation_threshold_is_exclusive() {
    let mut s = store();
    let now = Utc::now();
    let a = s.upsert_concept("a1", "", 0.0, now).expect("a").id;
    let b = s.upsert_concept("b1", "", 0.0, now).expect("b").id;
    let c = s.upsert_concept("c1", "", 0.0, now).expect("c").id;

    let at = s
        .add_or_strengthen_edge(&a, &b, 0.2, ConnectionKind::CoOccurrence, now)
        .expect("edge");
    assert_eq!(at, EdgeOutcome::BelowThreshold);
    assert_eq!(s.graph().edge_count(), 0);

    let above = s
        .add_or_strengthen_edge(&a, &c, 0.21, ConnectionKind::CoOccurrence, now)
        .expect("edge");
    assert!(above.is_created());
    assert_eq!(s.graph().edge_count(), 1);
}

// ---------------------------------------------------------------------------
// Cascades on degenerate graphs
// ---------------------------------------------------------------------------

#[test]
fn cascade_on_empty_and_single_node_graph() {
    let e = engine();
    let report = e.run_evolution_cascade();
    assert!(report.clusters.is_empty());
    assert!(report.failed_steps.is_empty());

    e.log_interaction("python", "", "chat", 0.0).expect("log");
    let report = e.run_evolution_cascade();
    assert!(report.clusters.is_empty());
    assert!(report.failed_steps.is_empty());
    assert!(e.identify_knowledge_clusters().expect("clusters").is_empty());
}

#[test]
fn cascade_runs_directly_on_a_store() {
    let mut s = store();
    let cascade = EvolutionCascade::new(CascadeConfig::default(), Arc::new(NousCounters::new()));
    let report = cascade.run(&mut s, 0, 0, Utc::now());
    assert!(report.clusters.is_empty());
    let events = s.persistence().recent_events(5).expect("events");
    assert_eq!(events.len(), 2);
}

#[test]
fn document_ingestion_forms_clusters_above_two_members() {
    let e = engine();
    let text = "Graph theory studies nodes and edges. PageRank ranks nodes in a graph. \
                Communities group densely linked nodes. Modularity scores communities.";
    let keywords: Vec<String> = ["graph theory", "nodes", "edges", "pagerank", "communities", "modularity"]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
    let out = e
        .process_document_knowledge("graphs.md", text, &[], &keywords)
        .expect("ingest");
    assert!(out.evolution_triggered);
    assert!(out.connections_formed > 0);
    for cluster in &out.knowledge_clusters {
        assert!(cluster.len() > 2);
    }
    for cluster in e.identify_knowledge_clusters().expect("clusters") {
        assert!(cluster.len() > 2);
    }

    let events = e.get_evolution_status().expect("status").recent_events;
    assert!(
        events
            .iter()
            .any(|ev| matches!(&ev.kind, EvolutionEventKind::DocumentIngested { source_name, .. } if source_name == "graphs.md"))
    );
}

#[test]
fn cascade_thresholds_are_configurable() {
    let mut config = NousConfig::default();
    config.cascade.new_concept_threshold = 1;
    let e = EvolutionEngine::open_in_memory(config).expect("engine");
    let out = e
        .log_interaction("I love coding in python", "", "chat", 0.0)
        .expect("log");
    assert!(out.cascade.is_some());
    assert_eq!(e.counters().snapshot().cascades_run, 1);
}

// ---------------------------------------------------------------------------
// Persistence across restarts
// ---------------------------------------------------------------------------

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nous.db");

    let (concepts, connections, python_strength) = {
        let e = EvolutionEngine::open(&path, NousConfig::default()).expect("open");
        e.log_interaction("I love coding in python", "Sure!", "question", 0.5)
            .expect("log");
        e.log_interaction("python classes are elegant", "Yes", "question", 0.5)
            .expect("log");
        let status = e.get_evolution_status().expect("status");
        (
            status.concept_count,
            status.connection_count,
            e.get_concept("python").expect("python").strength,
        )
    };

    let reopened = EvolutionEngine::open(&path, NousConfig::default()).expect("reopen");
    let status = reopened.get_evolution_status().expect("status");
    assert_eq!(status.concept_count, concepts);
    assert_eq!(status.connection_count, connections);
    let strength = reopened.get_concept("python").expect("python").strength;
    assert!((strength - python_strength).abs() < 1e-12);
    assert!(status.capabilities.iter().any(|c| c.name == CONVERSATION_HANDLING));
    assert!(reopened.integrity_check().expect("integrity"));
}

#[test]
fn backup_is_a_loadable_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let e = EvolutionEngine::open(dir.path().join("live.db"), NousConfig::default()).expect("open");
    e.log_interaction("I love coding in python", "", "chat", 0.0).expect("log");

    let dest = dir.path().join("copy.db");
    e.backup(&dest).expect("backup");
    let copy = EvolutionEngine::open(&dest, NousConfig::default()).expect("open copy");
    assert_eq!(copy.get_evolution_status().expect("status").concept_count, 3);

    e.create_rotating_backup().expect("rotate");
    assert!(dir.path().join("live.db.bak.1").exists());
}

#[test]
fn capabilities_reload_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("caps.db");
    {
        let e = EvolutionEngine::open(&path, NousConfig::default()).expect("open");
        e.log_interaction("tell me a story", "Once upon a time...", "creative", 0.3)
            .expect("log");
    }
    let db = PersistenceLayer::open(&path, &PersistenceConfig::default()).expect("db");
    let tracker = CapabilityTracker::load(CapabilityConfig::default(), &db).expect("load");
    assert!(tracker.get("creativity").is_some());
    assert!(tracker.average_level() > 0.0);
}

// ---------------------------------------------------------------------------
// Pluggable strategies
// ---------------------------------------------------------------------------

#[test]
fn embedding_similarity_plugs_in() {
    let provider = HashingEmbeddingProvider::new(64).expect("provider");
    let similarity = EmbeddingSimilarity::new(provider, std::num::NonZeroUsize::MIN);
    let e = engine().with_similarity(Arc::new(similarity));
    let out = e
        .log_interaction("pythonic python code", "", "chat", 0.0)
        .expect("log");
    assert!(!out.new_connections.is_empty());
}

#[test]
fn invalid_config_is_rejected() {
    let mut config = NousConfig::default();
    config.cascade.pagerank_damping = 2.0;
    assert!(EvolutionEngine::open_in_memory(config).is_err());
}

#[test]
fn non_finite_threshold_from_toml_is_rejected() {
    let config = NousConfig::from_toml("[connection]\ncreation_threshold = nan\n").expect("parse");
    assert!(EvolutionEngine::open_in_memory(config).is_err());

    let config = NousConfig::from_toml("[cascade]\npagerank_boost = inf\n").expect("parse");
    assert!(EvolutionEngine::open_in_memory(config).is_err());
}

#[test]
fn unrepresentable_recent_window_is_rejected() {
    let config =
        NousConfig::from_toml("[capability]\nrecent_window_days = 9223372036854775807\n").expect("parse");
    assert!(EvolutionEngine::open_in_memory(config).is_err());
}

#[test]
fn prior_only_pairs_never_link() {
    // Fifteen unrelated words far apart: only the co-occurrence prior remains.
    let text = [
        "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "india",
        "juliet", "kilo", "lima", "mike", "november", "oscar",
    ]
    .join(&format!("{} ", " the".repeat(30)));
    let out = engine().log_interaction(&text, "", "chat", 0.0).expect("log");
    assert!(out.new_connections.is_empty());
}
