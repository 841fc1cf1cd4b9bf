//! Explicit configuration structures for every tunable the engine exposes.
//! No ambient/global state: callers build one of these and pass it in.

/// Knobs consumed by [`crate::detector::detect_cycles`].
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub min_cycle_length: usize,
    pub anchor_min_count: usize,
    pub anchor_max_share: f64,
    pub regularity_tolerance: f64,
    pub exact_match_threshold: f64,
    pub sub_cycle_tolerance: f64,
    pub sub_cycle_match_threshold: f64,
    pub min_sub_reps: usize,
    pub significance_share: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        DetectorConfig {
            min_cycle_length: 10,
            anchor_min_count: 5,
            anchor_max_share: 1.0 / 5.0,
            regularity_tolerance: 1.0 / 20.0,
            exact_match_threshold: 0.95,
            sub_cycle_tolerance: 1.0 / 10.0,
            sub_cycle_match_threshold: 0.80,
            min_sub_reps: 3,
            significance_share: 1.0 / 100.0,
        }
    }
}

/// Comparator mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparatorMode {
    Align,
    Match,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparatorConfig {
    pub mode: ComparatorMode,
    pub improvement_threshold_pct: f64,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        ComparatorConfig {
            mode: ComparatorMode::Align,
            improvement_threshold_pct: 5.0,
        }
    }
}

/// Phase selector knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Auto,
    Prefill,
    Decode,
}

/// Normalizer knob: whether the triton-specific secondary normalization
/// (`normalize_kernel_name`) is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizerConfig {
    pub triton_digit_strip: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        NormalizerConfig {
            triton_digit_strip: true,
        }
    }
}

/// Hints for the early-stop trace-reader variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarlyStopHints {
    pub min_cycle: usize,
    pub max_cycle: usize,
}
