//! Batch pairing of per-cycle CSV files discovered under the
//! `<base>_cycle_N.csv` naming convention, for `compare-all`.
//!
//! Two pairing strategies are offered: straightforward index alignment, and
//! "smart" pairing by weighted-Jaccard similarity of signature time-shares
//! (greedy descending, threshold 0.2), for cases where cycle indices shift
//! between a baseline and a new run but the underlying kernel content
//! didn't.

use std::collections::HashMap;

use crate::signature::signature;
use crate::stats::KernelStats;

/// Similarity threshold below which a smart-matched pair is rejected rather
/// than forced.
pub const SMART_MATCH_THRESHOLD: f64 = 0.2;

/// One discovered per-cycle CSV, identified by its index in the
/// `<base>_cycle_N.csv` sequence.
#[derive(Debug, Clone)]
pub struct CycleFile {
    pub index: usize,
    pub positions: Vec<KernelStats>,
}

/// Signature -> fraction of total cycle time spent at that signature,
/// summed across all positions sharing it.
fn time_shares(positions: &[KernelStats]) -> HashMap<String, f64> {
    let total: f64 = positions.iter().map(|p| p.avg).sum();
    let mut shares: HashMap<String, f64> = HashMap::new();
    if total <= 0.0 {
        return shares;
    }
    for p in positions {
        let sig = signature(&p.name);
        *shares.entry(sig).or_insert(0.0) += p.avg / total;
    }
    shares
}

/// Weighted-Jaccard similarity of two signature time-share distributions:
/// `sum(min(a_i, b_i)) / sum(max(a_i, b_i))` over the union of signatures.
fn weighted_jaccard(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    let mut seen = std::collections::HashSet::new();

    for (sig, &share_a) in a {
        let share_b = b.get(sig).copied().unwrap_or(0.0);
        numerator += share_a.min(share_b);
        denominator += share_a.max(share_b);
        seen.insert(sig.as_str());
    }
    for (sig, &share_b) in b {
        if seen.contains(sig.as_str()) {
            continue;
        }
        numerator += 0.0f64.min(share_b);
        denominator += share_b.max(0.0);
    }

    if denominator <= 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// A baseline/new pairing chosen by either strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pairing {
    pub baseline_index: usize,
    pub new_index: usize,
    pub similarity: Option<f64>,
}

/// Pairs baseline and new cycle files by matching index. Baseline files
/// with no new file at the same index, and vice versa, are left unpaired.
pub fn pair_by_index(baseline: &[CycleFile], new: &[CycleFile]) -> Vec<Pairing> {
    let new_by_index: HashMap<usize, &CycleFile> = new.iter().map(|f| (f.index, f)).collect();
    baseline
        .iter()
        .filter_map(|b| {
            new_by_index.get(&b.index).map(|_| Pairing {
                baseline_index: b.index,
                new_index: b.index,
                similarity: None,
            })
        })
        .collect()
}

/// Pairs baseline and new cycle files by greedy descending weighted-Jaccard
/// similarity of their signature time-share distributions. Every candidate
/// pair is scored up front; the highest-similarity pair is committed first,
/// both files are removed from further consideration, and the process
/// repeats. A pair whose similarity falls below
/// [`SMART_MATCH_THRESHOLD`] is never committed, even if it's the best
/// remaining candidate.
pub fn pair_smart(baseline: &[CycleFile], new: &[CycleFile]) -> Vec<Pairing> {
    let baseline_shares: Vec<HashMap<String, f64>> =
        baseline.iter().map(|f| time_shares(&f.positions)).collect();
    let new_shares: Vec<HashMap<String, f64>> = new.iter().map(|f| time_shares(&f.positions)).collect();

    let mut candidates: Vec<(usize, usize, f64)> = Vec::with_capacity(baseline.len() * new.len());
    for (bi, bshare) in baseline_shares.iter().enumerate() {
        for (ni, nshare) in new_shares.iter().enumerate() {
            let sim = weighted_jaccard(bshare, nshare);
            if sim >= SMART_MATCH_THRESHOLD {
                candidates.push((bi, ni, sim));
            }
        }
    }
    candidates.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap());

    let mut baseline_taken = vec![false; baseline.len()];
    let mut new_taken = vec![false; new.len()];
    let mut out = Vec::new();

    for (bi, ni, sim) in candidates {
        if baseline_taken[bi] || new_taken[ni] {
            continue;
        }
        baseline_taken[bi] = true;
        new_taken[ni] = true;
        out.push(Pairing {
            baseline_index: baseline[bi].index,
            new_index: new[ni].index,
            similarity: Some(sim),
        });
    }

    out.sort_by_key(|p| p.baseline_index);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(name: &str, avg: f64) -> KernelStats {
        KernelStats {
            name: name.to_string(),
            index_in_cycle: 0,
            count: 1,
            total_duration: avg,
            min: avg,
            max: avg,
            avg,
            stddev: 0.0,
        }
    }

    #[test]
    fn pair_by_index_matches_only_shared_indices() {
        let baseline = vec![
            CycleFile { index: 0, positions: vec![stats("A", 1.0)] },
            CycleFile { index: 1, positions: vec![stats("B", 1.0)] },
        ];
        let new = vec![CycleFile { index: 1, positions: vec![stats("B", 1.0)] }];
        let pairs = pair_by_index(&baseline, &new);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].baseline_index, 1);
        assert_eq!(pairs[0].new_index, 1);
    }

    #[test]
    fn pair_smart_matches_by_content_not_position() {
        // Baseline cycle 0 looks like new cycle 1, and vice versa: a smart
        // match should cross the positional indices, unlike pair_by_index.
        let baseline = vec![
            CycleFile { index: 0, positions: vec![stats("A", 9.0), stats("B", 1.0)] },
            CycleFile { index: 1, positions: vec![stats("C", 1.0), stats("D", 9.0)] },
        ];
        let new = vec![
            CycleFile { index: 0, positions: vec![stats("C", 1.0), stats("D", 9.0)] },
            CycleFile { index: 1, positions: vec![stats("A", 9.0), stats("B", 1.0)] },
        ];
        let pairs = pair_smart(&baseline, &new);
        assert_eq!(pairs.len(), 2);
        let p0 = pairs.iter().find(|p| p.baseline_index == 0).unwrap();
        assert_eq!(p0.new_index, 1);
        let p1 = pairs.iter().find(|p| p.baseline_index == 1).unwrap();
        assert_eq!(p1.new_index, 0);
    }

    #[test]
    fn pair_smart_rejects_below_threshold() {
        let baseline = vec![CycleFile { index: 0, positions: vec![stats("A", 1.0)] }];
        let new = vec![CycleFile { index: 0, positions: vec![stats("Z", 1.0)] }];
        let pairs = pair_smart(&baseline, &new);
        assert!(pairs.is_empty());
    }

    #[test]
    fn weighted_jaccard_identical_distributions_is_one() {
        let a = time_shares(&[stats("A", 1.0), stats("B", 1.0)]);
        let b = time_shares(&[stats("A", 1.0), stats("B", 1.0)]);
        assert!((weighted_jaccard(&a, &b) - 1.0).abs() < 1e-9);
    }
}
