//! Kernel-sequence comparator: LCS alignment with rotation search, and
//! greedy signature matching.

use indexmap::IndexMap;
use log::info;

use crate::config::{ComparatorConfig, ComparatorMode};
use crate::signature::signature;
use crate::stats::{CycleResult, KernelStats};

pub const REMOVED_SENTINEL: &str = ".";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Exact,
    Similar,
    NewOnly,
    Removed,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Similar => "similar",
            MatchType::NewOnly => "new_only",
            MatchType::Removed => "removed",
        }
    }
}

/// One side's timing summary within a [`KernelMatch`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Timing {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
}

impl From<&KernelStats> for Timing {
    fn from(k: &KernelStats) -> Self {
        Timing {
            avg: k.avg,
            min: k.min,
            max: k.max,
            stddev: k.stddev,
        }
    }
}

/// One aligned pair of kernels between a baseline and a new cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelMatch {
    pub index: usize,
    pub baseline_kernels: Vec<String>,
    pub new_kernel: Option<String>,
    pub baseline_timing: Option<Timing>,
    pub new_timing: Option<Timing>,
    pub match_type: MatchType,
    pub signature: String,
}

/// Change classification used by writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Improved,
    Regressed,
    Neutral,
    New,
}

impl KernelMatch {
    /// `Δ% = (new.avg - baseline.avg) / baseline.avg * 100`, `None` if
    /// either side lacks timing.
    pub fn change_pct(&self) -> Option<f64> {
        let b = self.baseline_timing?;
        let n = self.new_timing?;
        if b.avg == 0.0 {
            return None;
        }
        Some((n.avg - b.avg) / b.avg * 100.0)
    }

    pub fn classify(&self, config: &ComparatorConfig) -> Classification {
        match self.match_type {
            MatchType::NewOnly => Classification::New,
            MatchType::Removed => Classification::Improved,
            _ => match self.change_pct() {
                Some(pct) if pct < -config.improvement_threshold_pct => Classification::Improved,
                Some(pct) if pct > config.improvement_threshold_pct => Classification::Regressed,
                Some(_) => Classification::Neutral,
                None => Classification::Neutral,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    pub baseline_name: String,
    pub new_name: String,
    pub baseline_kernel_count: usize,
    pub new_kernel_count: usize,
    pub matches: Vec<KernelMatch>,
    pub total_time: f64,
}

struct Side {
    names: Vec<String>,
    sigs: Vec<String>,
    timing: Vec<Timing>,
}

fn side_of(result: &CycleResult) -> Side {
    let names: Vec<String> = result.positions.iter().map(|p| p.name.clone()).collect();
    let sigs: Vec<String> = names.iter().map(|n| signature(n)).collect();
    let timing: Vec<Timing> = result.positions.iter().map(Timing::from).collect();
    Side { names, sigs, timing }
}

/// Compare two cycle results under the configured mode.
pub fn compare(
    baseline: &CycleResult,
    baseline_name: &str,
    new: &CycleResult,
    new_name: &str,
    config: &ComparatorConfig,
) -> ComparisonResult {
    let base = side_of(baseline);
    let newer = side_of(new);

    let mut matches = match config.mode {
        ComparatorMode::Align => align_compare(&base, &newer),
        ComparatorMode::Match => greedy_match_compare(&base, &newer),
    };

    for (i, m) in matches.iter_mut().enumerate() {
        m.index = i;
    }

    let total_time: f64 = matches
        .iter()
        .filter_map(|m| m.new_timing.map(|t| t.avg))
        .sum();

    ComparisonResult {
        baseline_name: baseline_name.to_string(),
        new_name: new_name.to_string(),
        baseline_kernel_count: base.names.len(),
        new_kernel_count: newer.names.len(),
        matches,
        total_time,
    }
}

/// Mode `align`: LCS with rotation search.
fn align_compare(base: &Side, newer: &Side) -> Vec<KernelMatch> {
    let m = base.names.len();
    let n = newer.names.len();

    let (rotated_names, rotated_sigs, rotated_timing) = if m == n && m > 0 {
        let (best_rotation, _) = best_rotation(&base.sigs, &newer.sigs);
        if best_rotation > 0 {
            info!("align mode: applying rotation {best_rotation} to baseline");
        }
        (
            rotate(&base.names, best_rotation),
            rotate(&base.sigs, best_rotation),
            rotate(&base.timing, best_rotation),
        )
    } else {
        (base.names.clone(), base.sigs.clone(), base.timing.clone())
    };

    let dp = lcs_table(&rotated_sigs, &newer.sigs);
    backtrack(
        &dp,
        &rotated_names,
        &rotated_sigs,
        &rotated_timing,
        &newer.names,
        &newer.sigs,
        &newer.timing,
    )
}

/// Finds the rotation `r` of `base_sigs` maximizing `LCS(rotate(base, r), new)`.
/// Returns `(rotation, lcs_len)`.
fn best_rotation(base_sigs: &[String], new_sigs: &[String]) -> (usize, usize) {
    let m = base_sigs.len();
    let mut best = (0usize, 0usize);
    for r in 0..m {
        let rotated = rotate(base_sigs, r);
        let dp = lcs_table(&rotated, new_sigs);
        let len = dp[m][new_sigs.len()];
        if len > best.1 {
            best = (r, len);
        }
    }
    best
}

fn rotate<T: Clone>(v: &[T], r: usize) -> Vec<T> {
    if v.is_empty() {
        return Vec::new();
    }
    let r = r % v.len();
    let mut out = Vec::with_capacity(v.len());
    out.extend_from_slice(&v[r..]);
    out.extend_from_slice(&v[..r]);
    out
}

/// Standard LCS dynamic-programming table over `a` vs `b` (signature
/// equality).
fn lcs_table(a: &[String], b: &[String]) -> Vec<Vec<usize>> {
    let m = a.len();
    let n = b.len();
    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            dp[i][j] = if a[i - 1] == b[j - 1] {
                dp[i - 1][j - 1] + 1
            } else {
                dp[i - 1][j].max(dp[i][j - 1])
            };
        }
    }
    dp
}

#[allow(clippy::too_many_arguments)]
fn backtrack(
    dp: &[Vec<usize>],
    base_names: &[String],
    base_sigs: &[String],
    base_timing: &[Timing],
    new_names: &[String],
    new_sigs: &[String],
    new_timing: &[Timing],
) -> Vec<KernelMatch> {
    let mut i = base_names.len();
    let mut j = new_names.len();
    let mut out = Vec::new();

    while i > 0 || j > 0 {
        if i > 0 && j > 0 && base_sigs[i - 1] == new_sigs[j - 1] {
            let match_type = if base_names[i - 1] == new_names[j - 1] {
                MatchType::Exact
            } else {
                MatchType::Similar
            };
            out.push(KernelMatch {
                index: 0,
                baseline_kernels: vec![base_names[i - 1].clone()],
                new_kernel: Some(new_names[j - 1].clone()),
                baseline_timing: Some(base_timing[i - 1]),
                new_timing: Some(new_timing[j - 1]),
                match_type,
                signature: base_sigs[i - 1].clone(),
            });
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || dp[i][j - 1] >= dp[i - 1][j]) {
            out.push(KernelMatch {
                index: 0,
                baseline_kernels: Vec::new(),
                new_kernel: Some(new_names[j - 1].clone()),
                baseline_timing: None,
                new_timing: Some(new_timing[j - 1]),
                match_type: MatchType::NewOnly,
                signature: new_sigs[j - 1].clone(),
            });
            j -= 1;
        } else {
            out.push(KernelMatch {
                index: 0,
                baseline_kernels: vec![base_names[i - 1].clone()],
                new_kernel: None,
                baseline_timing: Some(base_timing[i - 1]),
                new_timing: None,
                match_type: MatchType::Removed,
                signature: base_sigs[i - 1].clone(),
            });
            i -= 1;
        }
    }

    out.reverse();
    out
}

/// Mode `match`: greedy signature matching, each baseline kernel claimed at
/// most once.
fn greedy_match_compare(base: &Side, newer: &Side) -> Vec<KernelMatch> {
    // Index baseline kernels by name and by signature, each a queue of
    // (original_index, preserving insertion order).
    let mut by_name: IndexMap<&str, Vec<usize>> = IndexMap::new();
    let mut by_sig: IndexMap<&str, Vec<usize>> = IndexMap::new();
    for (idx, name) in base.names.iter().enumerate() {
        by_name.entry(name.as_str()).or_default().push(idx);
        by_sig.entry(base.sigs[idx].as_str()).or_default().push(idx);
    }

    let mut claimed = vec![false; base.names.len()];
    let mut out = Vec::new();

    for j in 0..newer.names.len() {
        let name = &newer.names[j];
        let sig = &newer.sigs[j];

        let mut claimed_idx: Option<usize> = None;
        if let Some(queue) = by_name.get(name.as_str()) {
            for &idx in queue {
                if !claimed[idx] {
                    claimed_idx = Some(idx);
                    break;
                }
            }
        }
        let match_type = if claimed_idx.is_some() {
            MatchType::Exact
        } else {
            if let Some(queue) = by_sig.get(sig.as_str()) {
                for &idx in queue {
                    if !claimed[idx] {
                        claimed_idx = Some(idx);
                        break;
                    }
                }
            }
            MatchType::Similar
        };

        if let Some(idx) = claimed_idx {
            claimed[idx] = true;
            out.push(KernelMatch {
                index: 0,
                baseline_kernels: vec![base.names[idx].clone()],
                new_kernel: Some(name.clone()),
                baseline_timing: Some(base.timing[idx]),
                new_timing: Some(newer.timing[j]),
                match_type,
                signature: sig.clone(),
            });
        } else {
            out.push(KernelMatch {
                index: 0,
                baseline_kernels: Vec::new(),
                new_kernel: Some(name.clone()),
                baseline_timing: None,
                new_timing: Some(newer.timing[j]),
                match_type: MatchType::NewOnly,
                signature: sig.clone(),
            });
        }
    }

    // Any unclaimed baseline kernel becomes `removed`, appended in baseline
    // order.
    for idx in 0..base.names.len() {
        if !claimed[idx] {
            out.push(KernelMatch {
                index: 0,
                baseline_kernels: vec![base.names[idx].clone()],
                new_kernel: None,
                baseline_timing: Some(base.timing[idx]),
                new_timing: None,
                match_type: MatchType::Removed,
                signature: base.sigs[idx].clone(),
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::CycleDescriptor;
    use crate::event::KernelEvent;
    use crate::stats::aggregate;

    fn cycle_result(names: &[&str], durations: &[f64]) -> CycleResult {
        let events: Vec<KernelEvent> = names
            .iter()
            .zip(durations.iter())
            .map(|(n, d)| KernelEvent {
                name: n.to_string(),
                timestamp: 0.0,
                duration: *d,
                pid: 1,
                tid: 1,
            })
            .collect();
        let descriptor = CycleDescriptor {
            start_index: 0,
            cycle_length: names.len(),
            num_repetitions: 1,
            repetition_starts: vec![0],
            anchor_name: None,
            signature: String::new(),
        };
        aggregate(&events, &descriptor)
    }

    #[test]
    fn single_identical_kernel_align_mode_is_exact() {
        let b = cycle_result(&["K"], &[1.0]);
        let n = cycle_result(&["K"], &[1.0]);
        let config = ComparatorConfig {
            mode: ComparatorMode::Align,
            improvement_threshold_pct: 5.0,
        };
        let result = compare(&b, "base", &n, "new", &config);
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].match_type, MatchType::Exact);
    }

    /// S4: rotation detection. Baseline [A,B,C,D,E]; new [C,D,E,A,B].
    #[test]
    fn s4_rotation_detection() {
        let b = cycle_result(&["A", "B", "C", "D", "E"], &[1.0; 5]);
        let n = cycle_result(&["C", "D", "E", "A", "B"], &[1.0; 5]);
        let config = ComparatorConfig {
            mode: ComparatorMode::Align,
            improvement_threshold_pct: 5.0,
        };
        let result = compare(&b, "base", &n, "new", &config);
        assert_eq!(result.matches.len(), 5);
        assert!(result.matches.iter().all(|m| m.match_type == MatchType::Exact));
    }

    /// S5: fusion, align mode. Baseline [X,Y,Z]; new [XY_fused, Z] where
    /// signature(XY_fused) matches neither X nor Y.
    #[test]
    fn s5_fusion_align_mode() {
        let b = cycle_result(&["X", "Y", "Z"], &[1.0, 1.0, 1.0]);
        let n = cycle_result(&["XY_fused", "Z"], &[2.0, 1.0]);
        let config = ComparatorConfig {
            mode: ComparatorMode::Align,
            improvement_threshold_pct: 5.0,
        };
        let result = compare(&b, "base", &n, "new", &config);
        let exact_count = result.matches.iter().filter(|m| m.match_type == MatchType::Exact).count();
        let new_only_count = result.matches.iter().filter(|m| m.match_type == MatchType::NewOnly).count();
        let removed_count = result.matches.iter().filter(|m| m.match_type == MatchType::Removed).count();
        assert_eq!(exact_count, 1);
        assert_eq!(new_only_count, 1);
        assert_eq!(removed_count, 2);
    }

    /// S5: fusion, match mode.
    #[test]
    fn s5_fusion_match_mode() {
        let b = cycle_result(&["X", "Y", "Z"], &[1.0, 1.0, 1.0]);
        let n = cycle_result(&["XY_fused", "Z"], &[2.0, 1.0]);
        let config = ComparatorConfig {
            mode: ComparatorMode::Match,
            improvement_threshold_pct: 5.0,
        };
        let result = compare(&b, "base", &n, "new", &config);
        let exact_count = result.matches.iter().filter(|m| m.match_type == MatchType::Exact).count();
        let new_only_count = result.matches.iter().filter(|m| m.match_type == MatchType::NewOnly).count();
        let removed_count = result.matches.iter().filter(|m| m.match_type == MatchType::Removed).count();
        assert_eq!(exact_count, 1);
        assert_eq!(new_only_count, 1);
        assert_eq!(removed_count, 2);
    }

    /// S6: change classification.
    #[test]
    fn s6_change_classification() {
        let config = ComparatorConfig::default();
        let b = cycle_result(&["K"], &[100.0]);

        let n_improved = cycle_result(&["K"], &[93.0]);
        let result = compare(&b, "b", &n_improved, "n", &config);
        assert_eq!(result.matches[0].classify(&config), Classification::Improved);

        let n_regressed = cycle_result(&["K"], &[106.0]);
        let result = compare(&b, "b", &n_regressed, "n", &config);
        assert_eq!(result.matches[0].classify(&config), Classification::Regressed);

        let n_neutral = cycle_result(&["K"], &[103.0]);
        let result = compare(&b, "b", &n_neutral, "n", &config);
        assert_eq!(result.matches[0].classify(&config), Classification::Neutral);
    }

    #[test]
    fn match_mode_permutation_has_no_removed_or_new_only() {
        let b = cycle_result(&["A", "B", "C"], &[1.0, 2.0, 3.0]);
        let n = cycle_result(&["C", "A", "B"], &[3.1, 1.1, 2.1]);
        let config = ComparatorConfig {
            mode: ComparatorMode::Match,
            improvement_threshold_pct: 5.0,
        };
        let result = compare(&b, "b", &n, "n", &config);
        assert!(result
            .matches
            .iter()
            .all(|m| m.match_type == MatchType::Exact));
    }

    #[test]
    fn each_kernel_appears_in_at_most_one_match() {
        let b = cycle_result(&["A", "A", "B"], &[1.0, 1.0, 1.0]);
        let n = cycle_result(&["A", "B", "B"], &[1.0, 1.0, 1.0]);
        let config = ComparatorConfig {
            mode: ComparatorMode::Match,
            improvement_threshold_pct: 5.0,
        };
        let result = compare(&b, "b", &n, "n", &config);
        let total_baseline_refs: usize = result.matches.iter().map(|m| m.baseline_kernels.len()).sum();
        let total_new_refs: usize = result.matches.iter().filter(|m| m.new_kernel.is_some()).count();
        assert_eq!(total_baseline_refs, 3);
        assert_eq!(total_new_refs, 3);
    }
}
