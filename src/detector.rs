//! Cycle (periodic pattern) detector.

use std::collections::HashMap;

use crate::config::{DetectorConfig, NormalizerConfig, Phase};
use crate::event::KernelEvent;
use crate::signature::{fnv1a_64, normalize_kernel_name, signature};

/// One detected repeating pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleDescriptor {
    pub start_index: usize,
    pub cycle_length: usize,
    pub num_repetitions: usize,
    pub repetition_starts: Vec<usize>,
    pub anchor_name: Option<String>,
    pub signature: String,
}

impl CycleDescriptor {
    fn temporal_center(&self) -> f64 {
        let last_start = *self.repetition_starts.last().unwrap();
        let last_end = last_start + self.cycle_length;
        (self.start_index + last_end) as f64 / 2.0
    }

    fn coverage(&self) -> usize {
        self.num_repetitions * self.cycle_length
    }
}

/// Find every significant periodic pattern in `events`.
///
/// Returns an empty vector if no anchor candidate survives regularity or
/// content verification — the caller decides whether that's an error.
pub fn detect_cycles(events: &[KernelEvent], config: &DetectorConfig) -> Vec<CycleDescriptor> {
    let n = events.len();
    if n < 20 {
        return Vec::new();
    }

    let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
    let hashes: Vec<u64> = names.iter().map(|n| fnv1a_64(n.as_bytes())).collect();

    // Step 1: anchor candidates, ordered by occurrence count descending.
    let mut counts: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, name) in names.iter().enumerate() {
        counts.entry(name).or_default().push(i);
    }

    let max_share = (n as f64 * config.anchor_max_share).floor() as usize;
    let mut candidates: Vec<(&str, Vec<usize>)> = counts
        .into_iter()
        .filter(|(_, positions)| {
            let c = positions.len();
            c >= config.anchor_min_count && c <= max_share.max(config.anchor_min_count)
        })
        .collect();
    // Tie-break by name: HashMap iteration order is randomized per process,
    // and occurrence-count ties are the common case (most kernel names
    // occur exactly once per repetition), so count-only ordering would make
    // anchor selection nondeterministic across runs of the same trace.
    candidates.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

    let mut found: Vec<CycleDescriptor> = Vec::new();

    for (anchor_name, positions) in &candidates {
        if let Some(desc) = verify_candidate(positions, &hashes, n, config) {
            let mut desc = desc;
            desc.anchor_name = Some(anchor_name.to_string());

            // Step 4: sub-cycle refinement.
            if desc.cycle_length > 20 {
                if let Some(refined) = refine_sub_cycle(events, &desc, config) {
                    found.push(refined);
                    continue;
                }
            }
            found.push(desc);
        }
    }

    group_by_signature(events, found, config)
}

/// Alternative detector path: anchor selection and verification against
/// *normalized names* (direct equality) rather than signature hashes. When
/// `normalizer.triton_digit_strip` is on, names beginning `triton_` first
/// collapse through [`normalize_kernel_name`], so numerically-indexed
/// Triton kernel launches count as one anchor instead of many near-misses.
/// No sub-cycle refinement is attempted on this path.
pub fn detect_cycles_by_name(
    events: &[KernelEvent],
    config: &DetectorConfig,
    normalizer: &NormalizerConfig,
) -> Vec<CycleDescriptor> {
    let n = events.len();
    if n < 20 {
        return Vec::new();
    }

    let names: Vec<String> = events
        .iter()
        .map(|e| {
            if normalizer.triton_digit_strip {
                normalize_kernel_name(&e.name)
            } else {
                e.name.clone()
            }
        })
        .collect();

    let mut counts: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, name) in names.iter().enumerate() {
        counts.entry(name.as_str()).or_default().push(i);
    }

    let max_share = (n as f64 * config.anchor_max_share).floor() as usize;
    let mut candidates: Vec<(&str, Vec<usize>)> = counts
        .into_iter()
        .filter(|(_, positions)| {
            let c = positions.len();
            c >= config.anchor_min_count && c <= max_share.max(config.anchor_min_count)
        })
        .collect();
    // See the matching comment in `detect_cycles`: a name tie-break keeps
    // anchor selection deterministic across runs.
    candidates.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));

    let mut found: Vec<CycleDescriptor> = Vec::new();
    for (anchor_name, positions) in &candidates {
        if let Some(mut desc) = verify_candidate_by_name(positions, &names, n, config) {
            desc.anchor_name = Some(anchor_name.to_string());
            found.push(desc);
        }
    }

    group_by_signature(events, found, config)
}

/// Same regularity/content-verification rules as [`verify_candidate`], but
/// matching repetitions by direct name equality instead of hash equality.
fn verify_candidate_by_name(
    positions: &[usize],
    names: &[String],
    n: usize,
    config: &DetectorConfig,
) -> Option<CycleDescriptor> {
    if positions.len() < 2 {
        return None;
    }
    let cycle_length = positions[1] - positions[0];
    if cycle_length < config.min_cycle_length {
        return None;
    }

    let tolerance = ((cycle_length as f64) * config.regularity_tolerance).max(1.0);
    for w in positions.windows(2).skip(1) {
        let gap = w[1] as isize - w[0] as isize;
        if (gap - cycle_length as isize).unsigned_abs() as f64 > tolerance {
            return None;
        }
    }

    let p0 = positions[0];
    if p0 + cycle_length > n {
        return None;
    }
    let reference = &names[p0..p0 + cycle_length];

    let mut matching_reps = 0usize;
    for &p in positions {
        if p + cycle_length > n {
            break;
        }
        let window = &names[p..p + cycle_length];
        let matches = reference.iter().zip(window.iter()).filter(|(a, b)| a == b).count();
        let ratio = matches as f64 / cycle_length as f64;
        if ratio >= config.exact_match_threshold {
            matching_reps += 1;
        } else {
            break;
        }
    }

    if matching_reps < 5 {
        return None;
    }

    let repetition_starts: Vec<usize> = positions.iter().take(matching_reps).copied().collect();

    Some(CycleDescriptor {
        start_index: p0,
        cycle_length,
        num_repetitions: matching_reps,
        repetition_starts,
        anchor_name: None,
        signature: String::new(),
    })
}

/// Steps 2–3: regularity test plus content verification for one anchor
/// candidate's ordered occurrence positions.
fn verify_candidate(
    positions: &[usize],
    hashes: &[u64],
    n: usize,
    config: &DetectorConfig,
) -> Option<CycleDescriptor> {
    if positions.len() < 2 {
        return None;
    }
    let cycle_length = positions[1] - positions[0];
    if cycle_length < config.min_cycle_length {
        return None;
    }

    let tolerance = ((cycle_length as f64) * config.regularity_tolerance).max(1.0);
    for w in positions.windows(2).skip(1) {
        let gap = w[1] as isize - w[0] as isize;
        if (gap - cycle_length as isize).unsigned_abs() as f64 > tolerance {
            return None;
        }
    }

    // Step 3: content verification against the reference window.
    let p0 = positions[0];
    if p0 + cycle_length > n {
        return None;
    }
    let reference = &hashes[p0..p0 + cycle_length];

    let mut matching_reps = 0usize;
    for &p in positions {
        if p + cycle_length > n {
            break;
        }
        let window = &hashes[p..p + cycle_length];
        let matches = reference
            .iter()
            .zip(window.iter())
            .filter(|(a, b)| a == b)
            .count();
        let ratio = matches as f64 / cycle_length as f64;
        if ratio >= config.exact_match_threshold {
            matching_reps += 1;
        } else {
            break;
        }
    }

    if matching_reps < 5 {
        return None;
    }

    let repetition_starts: Vec<usize> = positions
        .iter()
        .take(matching_reps)
        .copied()
        .collect();

    Some(CycleDescriptor {
        start_index: p0,
        cycle_length,
        num_repetitions: matching_reps,
        repetition_starts,
        anchor_name: None,
        signature: String::new(),
    })
}

/// Step 4: sub-cycle refinement. Looks for the smallest signature-level
/// periodic pattern inside one repetition's worth of events, and if it
/// verifies across subsequent repetitions, replaces the outer descriptor.
fn refine_sub_cycle(
    events: &[KernelEvent],
    outer: &CycleDescriptor,
    config: &DetectorConfig,
) -> Option<CycleDescriptor> {
    let window_start = outer.start_index;
    let window_sigs: Vec<String> = events[window_start..window_start + outer.cycle_length]
        .iter()
        .map(|e| signature(&e.name))
        .collect();

    // Find candidate sub-cycle signatures and their in-window positions.
    let mut sig_positions: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, s) in window_sigs.iter().enumerate() {
        sig_positions.entry(s.as_str()).or_default().push(i);
    }

    let mut sub_candidates: Vec<(usize, Vec<usize>)> = sig_positions
        .into_iter()
        .filter(|(_, pos)| pos.len() >= config.min_sub_reps)
        .map(|(_, pos)| {
            let len = if pos.len() >= 2 { pos[1] - pos[0] } else { 0 };
            (len, pos)
        })
        .filter(|(len, _)| *len > 0)
        .collect();

    // Check in-window regularity at the sub-cycle tolerance, keep the
    // smallest surviving sub-cycle length.
    sub_candidates.retain(|(len, pos)| {
        let tolerance = ((*len as f64) * config.sub_cycle_tolerance).max(1.0);
        pos.windows(2).skip(1).all(|w| {
            let gap = w[1] as isize - w[0] as isize;
            (gap - *len as isize).unsigned_abs() as f64 <= tolerance
        })
    });
    sub_candidates.sort_by_key(|(len, _)| *len);

    let (sub_len, in_window_positions) = sub_candidates.into_iter().next()?;

    // Verify the signature pattern repeats across subsequent outer windows.
    let outer_sigs: Vec<String> = window_sigs;
    let n = events.len();
    let mut matching_outer_reps = 0usize;
    for &outer_start in &outer.repetition_starts {
        if outer_start + outer.cycle_length > n {
            break;
        }
        let this_window_sigs: Vec<String> = events
            [outer_start..outer_start + outer.cycle_length]
            .iter()
            .map(|e| signature(&e.name))
            .collect();
        let matches = outer_sigs
            .iter()
            .zip(this_window_sigs.iter())
            .filter(|(a, b)| a == b)
            .count();
        let ratio = matches as f64 / outer.cycle_length as f64;
        if ratio >= config.sub_cycle_match_threshold {
            matching_outer_reps += 1;
        } else {
            break;
        }
    }

    if matching_outer_reps < config.min_sub_reps {
        return None;
    }

    // Cross-product of outer starts and in-window sub-cycle positions.
    let mut repetition_starts = Vec::with_capacity(matching_outer_reps * in_window_positions.len());
    for &outer_start in outer.repetition_starts.iter().take(matching_outer_reps) {
        for &in_window in &in_window_positions {
            repetition_starts.push(outer_start + in_window);
        }
    }
    repetition_starts.sort_unstable();

    let num_repetitions = repetition_starts.len();
    let start_index = repetition_starts[0];

    Some(CycleDescriptor {
        start_index,
        cycle_length: sub_len,
        num_repetitions,
        repetition_starts,
        anchor_name: outer.anchor_name.clone(),
        signature: String::new(),
    })
}

/// Step 5: group descriptors by their first-`min(10, cycle_length)`-events
/// signature, keeping only the highest-`num_repetitions` one per group.
///
/// The grouping key is the lexicographically smallest rotation of that
/// signature window rather than the window taken literally at
/// `start_index`: two anchors witnessing the very same repeating unit at
/// different starting phases (e.g. an `[A,B,C]` repeat found once via `A`
/// and once via `B`) would otherwise join-to different strings purely
/// because of where each anchor happens to start, and survive as separate,
/// redundant descriptors instead of collapsing into one.
fn group_by_signature(
    events: &[KernelEvent],
    descriptors: Vec<CycleDescriptor>,
    _config: &DetectorConfig,
) -> Vec<CycleDescriptor> {
    let mut groups: HashMap<String, CycleDescriptor> = HashMap::new();
    for mut desc in descriptors {
        let full_sigs: Vec<String> = events[desc.start_index..desc.start_index + desc.cycle_length]
            .iter()
            .map(|e| signature(&e.name))
            .collect();
        let take = desc.cycle_length.min(10);

        let mut canonical: Option<String> = None;
        for r in 0..desc.cycle_length {
            let joined = (0..take)
                .map(|i| full_sigs[(r + i) % desc.cycle_length].as_str())
                .collect::<Vec<_>>()
                .join("|");
            if canonical.as_deref().map(|c| joined.as_str() < c).unwrap_or(true) {
                canonical = Some(joined);
            }
        }
        let sig = canonical.unwrap_or_default();
        desc.signature = full_sigs[..take].join("|");

        groups
            .entry(sig)
            .and_modify(|existing| {
                if desc.num_repetitions > existing.num_repetitions {
                    *existing = desc.clone();
                }
            })
            .or_insert(desc);
    }
    let mut out: Vec<CycleDescriptor> = groups.into_values().collect();
    out.sort_by_key(|d| d.start_index);
    out
}

/// Phase selection: pick one descriptor out of the full significant set.
pub fn select_phase<'a>(
    descriptors: &'a [CycleDescriptor],
    phase: Phase,
    total_events: usize,
    config: &DetectorConfig,
) -> Option<&'a CycleDescriptor> {
    if descriptors.is_empty() {
        return None;
    }

    let threshold = (total_events as f64 * config.significance_share).ceil() as usize;
    let filtered: Vec<&CycleDescriptor> = descriptors
        .iter()
        .filter(|d| d.coverage() >= threshold)
        .collect();
    let pool: Vec<&CycleDescriptor> = if filtered.is_empty() {
        descriptors.iter().collect()
    } else {
        filtered
    };

    match phase {
        Phase::Prefill => pool
            .into_iter()
            .min_by(|a, b| a.temporal_center().partial_cmp(&b.temporal_center()).unwrap()),
        Phase::Decode => pool
            .into_iter()
            .max_by(|a, b| a.temporal_center().partial_cmp(&b.temporal_center()).unwrap()),
        Phase::Auto => pool.into_iter().max_by_key(|d| d.num_repetitions),
    }
}

/// Outcome of the quick probe used by the early-stop trace reader.
#[derive(Debug, Clone, PartialEq)]
pub struct QuickProbeResult {
    pub cycle_length: usize,
    pub num_repetitions: usize,
}

/// Cheap periodicity probe run against the buffer accumulated so far by the
/// early-stop reader variant. Operates on names only (no hashing of the
/// full stream), and only ever looks at the most common position gap among
/// `>5`-occurrence names.
pub fn quick_probe(names: &[&str], min_cycle: usize, max_cycle: usize) -> Option<QuickProbeResult> {
    let n = names.len();
    if n < 20 {
        return None;
    }

    let mut counts: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, name) in names.iter().enumerate() {
        counts.entry(name).or_default().push(i);
    }

    let mut best: Option<QuickProbeResult> = None;
    for (_, positions) in counts.iter().filter(|(_, p)| p.len() > 5) {
        if positions.len() < 2 {
            continue;
        }
        let gap = positions[1] - positions[0];
        if gap < min_cycle || gap > max_cycle {
            continue;
        }

        let tolerance = (gap as f64 * 0.05).max(1.0);
        let mut reps = 1usize;
        for w in positions.windows(2) {
            let this_gap = w[1] as isize - w[0] as isize;
            if (this_gap - gap as isize).unsigned_abs() as f64 <= tolerance {
                reps += 1;
            } else {
                break;
            }
        }
        if reps < 4 {
            continue;
        }

        // 90% match threshold: verify by name equality across windows.
        let p0 = positions[0];
        if p0 + gap > n {
            continue;
        }
        let reference = &names[p0..p0 + gap];
        let mut matching_reps = 0usize;
        for &p in positions.iter().take(reps) {
            if p + gap > n {
                break;
            }
            let window = &names[p..p + gap];
            let matches = reference.iter().zip(window.iter()).filter(|(a, b)| a == b).count();
            if matches as f64 / gap as f64 >= 0.90 {
                matching_reps += 1;
            } else {
                break;
            }
        }
        if matching_reps < 5 {
            continue;
        }

        let candidate = QuickProbeResult {
            cycle_length: gap,
            num_repetitions: matching_reps,
        };
        if best.as_ref().map(|b| candidate.num_repetitions > b.num_repetitions).unwrap_or(true) {
            best = Some(candidate);
        }
    }
    best
}
