//! End-to-end scenarios exercising the reader, detector, aggregator, and
//! comparator together.

use kerncycle::{
    aggregate, compare_cycles, detect_cycles, select_phase, ComparatorConfig, ComparatorMode,
    DetectorConfig, KernelEvent, Phase,
};

fn evt(name: &str, dur: f64) -> KernelEvent {
    KernelEvent {
        name: name.to_string(),
        timestamp: 0.0,
        duration: dur,
        pid: 1,
        tid: 1,
    }
}

/// A config scaled for a handful of toy events instead of a real trace: the
/// production defaults (`min_cycle_length: 10`, `anchor_max_share: 1/5`)
/// are tuned for traces with thousands of repetitions and reject every
/// candidate in a stream this small by construction.
fn toy_detector_config() -> DetectorConfig {
    DetectorConfig {
        min_cycle_length: 1,
        anchor_min_count: 2,
        anchor_max_share: 1.0,
        ..DetectorConfig::default()
    }
}

/// S1: basic detection. `[A,B,C]` repeating, all durations 1.0. Seven
/// repetitions (not a round number) because the detector declines outright
/// below 20 events and content verification never accepts fewer than 5
/// matching reps.
#[test]
fn s1_basic_detection_end_to_end() {
    let mut events = Vec::new();
    for _ in 0..7 {
        events.push(evt("A", 1.0));
        events.push(evt("B", 1.0));
        events.push(evt("C", 1.0));
    }
    let config = toy_detector_config();
    let descriptors = detect_cycles(&events, &config);
    assert_eq!(descriptors.len(), 1);

    let result = aggregate(&events, &descriptors[0]);
    assert_eq!(result.positions.len(), 3);
    for p in &result.positions {
        assert_eq!(p.count, 7);
        assert_eq!(p.avg, 1.0);
        assert_eq!(p.stddev, 0.0);
    }
}

/// S2: sub-cycle refinement. Eight outer repetitions of a marker kernel
/// followed by five inner `[A,B,C,D]` groups; the detector should settle
/// on the 4-long inner cycle. The marker gives the outer unit its own
/// periodicity to be discovered by in the first place — a flat, unmarked
/// `[A,B,C,D]` repeat has no periodicity longer than 4, since every name
/// recurs at that same share.
#[test]
fn s2_sub_cycle_end_to_end() {
    let mut events = Vec::new();
    for _ in 0..8 {
        events.push(evt("OUTER", 1.0));
        for _ in 0..5 {
            events.push(evt("A", 1.0));
            events.push(evt("B", 1.0));
            events.push(evt("C", 1.0));
            events.push(evt("D", 1.0));
        }
    }
    let config = DetectorConfig::default();
    let descriptors = detect_cycles(&events, &config);
    let best = descriptors.iter().max_by_key(|d| d.num_repetitions).unwrap();
    assert_eq!(best.cycle_length, 4);
    assert_eq!(best.num_repetitions, 40);

    let result = aggregate(&events, best);
    assert_eq!(result.positions.len(), 4);
}

/// S3: signature similarity. Baseline and new positions share a signature
/// but differ in template parameters; align mode reports a `similar` match.
#[test]
fn s3_signature_similarity_end_to_end() {
    let baseline_events: Vec<KernelEvent> = (0..6).map(|_| evt("k<float,128>", 1.0)).collect();
    let new_events: Vec<KernelEvent> = (0..6).map(|_| evt("k<double,64>", 1.2)).collect();

    let descriptor = kerncycle::CycleDescriptor {
        start_index: 0,
        cycle_length: 1,
        num_repetitions: 6,
        repetition_starts: (0..6).collect(),
        anchor_name: None,
        signature: String::new(),
    };
    let baseline_result = aggregate(&baseline_events, &descriptor);
    let new_result = aggregate(&new_events, &descriptor);

    let config = ComparatorConfig {
        mode: ComparatorMode::Align,
        improvement_threshold_pct: 5.0,
    };
    let comparison = compare_cycles(&baseline_result, "baseline", &new_result, "new", &config);
    assert_eq!(comparison.matches.len(), 1);
    assert_eq!(comparison.matches[0].match_type, kerncycle::MatchType::Similar);
    let pct = comparison.matches[0].change_pct().unwrap();
    assert!((pct - 20.0).abs() < 1e-9);
}

/// S4: rotation detection. Baseline `[A,B,C,D,E]`; new `[C,D,E,A,B]`.
#[test]
fn s4_rotation_detection_end_to_end() {
    let descriptor = kerncycle::CycleDescriptor {
        start_index: 0,
        cycle_length: 5,
        num_repetitions: 1,
        repetition_starts: vec![0],
        anchor_name: None,
        signature: String::new(),
    };
    let baseline_events: Vec<KernelEvent> = ["A", "B", "C", "D", "E"].iter().map(|n| evt(n, 1.0)).collect();
    let new_events: Vec<KernelEvent> = ["C", "D", "E", "A", "B"].iter().map(|n| evt(n, 1.0)).collect();
    let baseline_result = aggregate(&baseline_events, &descriptor);
    let new_result = aggregate(&new_events, &descriptor);

    let config = ComparatorConfig {
        mode: ComparatorMode::Align,
        improvement_threshold_pct: 5.0,
    };
    let comparison = compare_cycles(&baseline_result, "baseline", &new_result, "new", &config);
    assert_eq!(comparison.matches.len(), 5);
    assert!(comparison.matches.iter().all(|m| m.match_type == kerncycle::MatchType::Exact));
}

/// S6: comparison change classification at the three thresholds.
#[test]
fn s6_change_classification_end_to_end() {
    let descriptor = kerncycle::CycleDescriptor {
        start_index: 0,
        cycle_length: 1,
        num_repetitions: 1,
        repetition_starts: vec![0],
        anchor_name: None,
        signature: String::new(),
    };
    let baseline_events = vec![evt("K", 100.0)];
    let baseline_result = aggregate(&baseline_events, &descriptor);
    let config = ComparatorConfig::default();

    for (new_avg, expected) in [
        (93.0, kerncycle::compare::Classification::Improved),
        (106.0, kerncycle::compare::Classification::Regressed),
        (103.0, kerncycle::compare::Classification::Neutral),
    ] {
        let new_events = vec![evt("K", new_avg)];
        let new_result = aggregate(&new_events, &descriptor);
        let comparison = compare_cycles(&baseline_result, "baseline", &new_result, "new", &config);
        assert_eq!(comparison.matches[0].classify(&config), expected);
    }
}

/// When the significant set has exactly one descriptor, prefill, decode,
/// and auto phase selection must all resolve to it.
#[test]
fn phase_selection_degenerates_with_single_pattern() {
    let mut events = Vec::new();
    for _ in 0..7 {
        events.push(evt("A", 1.0));
        events.push(evt("B", 1.0));
        events.push(evt("C", 1.0));
    }
    let config = toy_detector_config();
    let descriptors = detect_cycles(&events, &config);
    assert_eq!(descriptors.len(), 1);

    let prefill = select_phase(&descriptors, Phase::Prefill, events.len(), &config);
    let decode = select_phase(&descriptors, Phase::Decode, events.len(), &config);
    let auto = select_phase(&descriptors, Phase::Auto, events.len(), &config);
    assert_eq!(prefill, decode);
    assert_eq!(decode, auto);
}
