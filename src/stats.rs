//! Per-position statistics aggregation for one detected cycle.

use crate::detector::CycleDescriptor;
use crate::event::KernelEvent;

/// Aggregated stats for one position within a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelStats {
    pub name: String,
    pub index_in_cycle: usize,
    pub count: usize,
    pub total_duration: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub stddev: f64,
}

/// A [`CycleDescriptor`] plus its per-position stats.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleResult {
    pub descriptor: CycleDescriptor,
    pub positions: Vec<KernelStats>,
    pub avg_cycle_time: f64,
    pub total_cycle_time: f64,
}

/// Aggregate per-position kernel statistics across every repetition of one
/// detected cycle.
///
/// Population stddev is used (`sqrt(sum((d - avg)^2) / count)`); see
/// `DESIGN.md` for why this is the chosen formula over the sample variant.
pub fn aggregate(events: &[KernelEvent], descriptor: &CycleDescriptor) -> CycleResult {
    let mut positions = Vec::with_capacity(descriptor.cycle_length);

    for j in 0..descriptor.cycle_length {
        let mut durations: Vec<f64> = Vec::with_capacity(descriptor.num_repetitions);
        for &rep_start in &descriptor.repetition_starts {
            durations.push(events[rep_start + j].duration);
        }

        let name = events[descriptor.repetition_starts[0] + j].name.clone();
        let count = durations.len();
        let total_duration: f64 = durations.iter().sum();
        let avg = total_duration / count as f64;
        let min = durations.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = durations.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let stddev = if count < 2 {
            0.0
        } else {
            let variance: f64 = durations.iter().map(|d| (d - avg) * (d - avg)).sum::<f64>() / count as f64;
            variance.sqrt()
        };

        positions.push(KernelStats {
            name,
            index_in_cycle: j,
            count,
            total_duration,
            min,
            max,
            avg,
            stddev,
        });
    }

    let avg_cycle_time: f64 = positions.iter().map(|p| p.avg).sum();
    let mut total_cycle_time = 0.0;
    for &rep_start in &descriptor.repetition_starts {
        for j in 0..descriptor.cycle_length {
            total_cycle_time += events[rep_start + j].duration;
        }
    }

    CycleResult {
        descriptor: descriptor.clone(),
        positions,
        avg_cycle_time,
        total_cycle_time,
    }
}
