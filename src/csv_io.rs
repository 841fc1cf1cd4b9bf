//! CSV reader/writer for cycle and comparison results.
//!
//! The reader is part of the comparator's CSV-ingestion path
//! (`ComparisonInputInvalid` on missing mandatory columns); the writer
//! produces the canonical on-disk result format.

use std::io::Write;

use crate::compare::ComparisonResult;
use crate::error::EngineError;
use crate::stats::{CycleResult, KernelStats};

/// Writes one [`CycleResult`] as a metadata comment block, a blank row,
/// then the data header and rows.
pub fn write_cycle_csv<W: Write>(mut w: W, result: &CycleResult) -> Result<(), EngineError> {
    writeln!(w, "# Cycle Statistics")?;
    writeln!(w, "# Iterations,{}", result.descriptor.num_repetitions)?;
    writeln!(w, "# Kernels per cycle,{}", result.descriptor.cycle_length)?;
    writeln!(w, "# Avg cycle time (us),{:.3}", result.avg_cycle_time)?;
    writeln!(w, "# Total time (us),{:.3}", result.total_cycle_time)?;
    writeln!(w)?;
    writeln!(
        w,
        "index,kernel_name,avg_duration_us,min_duration_us,max_duration_us,stddev_us,count,pct_of_cycle"
    )?;
    for p in &result.positions {
        let pct = if result.avg_cycle_time != 0.0 {
            p.avg / result.avg_cycle_time * 100.0
        } else {
            0.0
        };
        writeln!(
            w,
            "{},{},{:.3},{:.3},{:.3},{:.3},{},{:.4}",
            p.index_in_cycle, p.name, p.avg, p.min, p.max, p.stddev, p.count, pct
        )?;
    }
    Ok(())
}

/// Writes a [`ComparisonResult`] in the flat comparison-CSV format.
pub fn write_comparison_csv<W: Write>(mut w: W, result: &ComparisonResult) -> Result<(), EngineError> {
    writeln!(w, "eager_kernel,compiled_kernel,duration_us,match_type")?;
    writeln!(
        w,
        "Total ({} eager kernels),({} compiled kernels),{:.3},",
        result.baseline_kernel_count, result.new_kernel_count, result.total_time
    )?;

    for m in &result.matches {
        let new_kernel = m.new_kernel.as_deref().unwrap_or(crate::compare::REMOVED_SENTINEL);
        let duration = m
            .new_timing
            .map(|t| format!("{:.3}", t.avg))
            .unwrap_or_default();

        if m.baseline_kernels.is_empty() {
            writeln!(w, ",{},{},{}", new_kernel, duration, m.match_type.as_str())?;
        } else {
            writeln!(
                w,
                "{},{},{},{}",
                m.baseline_kernels[0],
                new_kernel,
                duration,
                m.match_type.as_str()
            )?;
            for extra in &m.baseline_kernels[1..] {
                writeln!(w, "{},{},,{}", extra, crate::compare::REMOVED_SENTINEL, m.match_type.as_str())?;
            }
        }
    }
    Ok(())
}

/// Reads back a [`CycleResult`]'s positions from a single-cycle CSV,
/// skipping the leading `#`-comment metadata block. Used by the
/// compare-from-CSV ingestion path; requires at minimum `kernel_name` and
/// `avg_duration_us` columns, or returns `ComparisonInputInvalid`.
pub fn read_cycle_csv_positions(data: &str) -> Result<Vec<KernelStats>, EngineError> {
    let data_without_comments: String = data
        .lines()
        .filter(|l| !l.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data_without_comments.as_bytes());

    let headers = reader.headers()?.clone();
    let name_idx = headers.iter().position(|h| h == "kernel_name");
    let avg_idx = headers.iter().position(|h| h == "avg_duration_us");
    let (name_idx, avg_idx) = match (name_idx, avg_idx) {
        (Some(n), Some(a)) => (n, a),
        _ => {
            return Err(EngineError::ComparisonInputInvalid(
                "CSV is missing mandatory kernel_name/avg_duration_us columns".to_string(),
            ))
        }
    };
    let index_idx = headers.iter().position(|h| h == "index");
    let min_idx = headers.iter().position(|h| h == "min_duration_us");
    let max_idx = headers.iter().position(|h| h == "max_duration_us");
    let stddev_idx = headers.iter().position(|h| h == "stddev_us");
    let count_idx = headers.iter().position(|h| h == "count");

    let mut out = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;
        let name = record
            .get(name_idx)
            .ok_or_else(|| EngineError::ComparisonInputInvalid("row missing kernel_name".into()))?
            .to_string();
        let avg: f64 = record
            .get(avg_idx)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| EngineError::ComparisonInputInvalid("row has non-numeric avg_duration_us".into()))?;

        let index_in_cycle = index_idx
            .and_then(|i| record.get(i))
            .and_then(|s| s.parse().ok())
            .unwrap_or(row_idx);
        let min = min_idx.and_then(|i| record.get(i)).and_then(|s| s.parse().ok()).unwrap_or(avg);
        let max = max_idx.and_then(|i| record.get(i)).and_then(|s| s.parse().ok()).unwrap_or(avg);
        let stddev = stddev_idx.and_then(|i| record.get(i)).and_then(|s| s.parse().ok()).unwrap_or(0.0);
        let count = count_idx.and_then(|i| record.get(i)).and_then(|s| s.parse().ok()).unwrap_or(1);

        out.push(KernelStats {
            name,
            index_in_cycle,
            count,
            total_duration: avg * count as f64,
            min,
            max,
            avg,
            stddev,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::CycleDescriptor;
    use crate::event::KernelEvent;
    use crate::stats::aggregate;

    fn sample_cycle_result() -> CycleResult {
        let events = vec![
            KernelEvent { name: "A".into(), timestamp: 0.0, duration: 1.0, pid: 1, tid: 1 },
            KernelEvent { name: "B".into(), timestamp: 1.0, duration: 2.0, pid: 1, tid: 1 },
            KernelEvent { name: "A".into(), timestamp: 2.0, duration: 1.5, pid: 1, tid: 1 },
            KernelEvent { name: "B".into(), timestamp: 3.0, duration: 2.5, pid: 1, tid: 1 },
        ];
        let descriptor = CycleDescriptor {
            start_index: 0,
            cycle_length: 2,
            num_repetitions: 2,
            repetition_starts: vec![0, 2],
            anchor_name: Some("A".into()),
            signature: "A|B".into(),
        };
        aggregate(&events, &descriptor)
    }

    #[test]
    fn csv_round_trip_preserves_name_avg_min_max_stddev() {
        let result = sample_cycle_result();
        let mut buf = Vec::new();
        write_cycle_csv(&mut buf, &result).unwrap();
        let text = String::from_utf8(buf).unwrap();

        let positions = read_cycle_csv_positions(&text).unwrap();
        assert_eq!(positions.len(), result.positions.len());
        for (original, read_back) in result.positions.iter().zip(positions.iter()) {
            assert_eq!(original.name, read_back.name);
            assert!((original.avg - read_back.avg).abs() < 1e-6);
            assert!((original.min - read_back.min).abs() < 1e-6);
            assert!((original.max - read_back.max).abs() < 1e-6);
            assert!((original.stddev - read_back.stddev).abs() < 1e-6);
        }
    }

    #[test]
    fn missing_mandatory_columns_is_comparison_input_invalid() {
        let bad_csv = "foo,bar\n1,2\n";
        let err = read_cycle_csv_positions(bad_csv).unwrap_err();
        match err {
            EngineError::ComparisonInputInvalid(_) => {}
            other => panic!("expected ComparisonInputInvalid, got {other:?}"),
        }
    }
}
