//! Fixture-based tests over recorded onset sequences.
//!
//! Each .json file in tests/fixtures/ is an onset list as the classifier emits it.

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use sticking::{DrumType, EngineConfig, HypothesisList, OnsetSequence, StickingEngine};

fn load_fixture(name: &str) -> OnsetSequence {
    let fixture_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(format!("{}.json", name));

    let content = fs::read_to_string(&fixture_path)
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", name, e));

    serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("Fixture {} is not a valid onset sequence: {}", name, e))
}

fn transcribe_fixture(name: &str) -> (OnsetSequence, HypothesisList) {
    let onsets = load_fixture(name);
    let engine = StickingEngine::new(EngineConfig::default()).unwrap();
    let list = engine.transcribe(&onsets).unwrap();

    for h in &list {
        assert_eq!(h.sticking.len(), onsets.len(), "Fixture {} length mismatch", name);
        for (symbol, event) in h.sticking.iter().zip(onsets.iter()) {
            assert_eq!(symbol.hand().is_none(), event.drum_type == DrumType::Kick);
        }
    }

    let json = list.to_json();
    assert!(json["primary"]["sticking"].is_string());
    assert_eq!(
        json["alternatives"].as_array().map(Vec::len),
        Some(list.len() - 1)
    );

    (onsets, list)
}

#[test]
fn test_rock_beat() {
    let (onsets, list) = transcribe_fixture("rock_beat");
    assert_eq!(onsets.len(), 24);
    assert_eq!(list.len(), 3);
}

#[test]
fn test_snare_roll_fill() {
    let (onsets, list) = transcribe_fixture("snare_roll_fill");
    let primary = list.primary();

    // Fast snare hits keep the leading hand, the slower fill alternates.
    assert_eq!(
        primary.sticking_string(),
        "R R R R R R R R R R R R L R L R L K"
    );
    assert_eq!(primary.pattern_label, "12-stroke run at beat 1");
    assert_eq!(
        primary.dynamics_notation(&onsets, 0.35),
        "RrrrRrrrRrrrLRLRLK"
    );
}
