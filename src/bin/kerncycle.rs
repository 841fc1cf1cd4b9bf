//! Thin CLI driver: argument parsing and dispatch only. All algorithmic
//! work happens in the `kerncycle` library.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use kerncycle::{
    aggregate, compare_cycles, csv_io, detect_cycles, read_trace_events, select_phase, xlsx,
    batch::{pair_by_index, pair_smart, CycleFile},
    ComparatorConfig, ComparatorMode, CycleDescriptor, CycleResult, DetectorConfig, EngineError,
    KernelStats, Phase,
};

#[derive(Debug, Parser)]
#[command(
    name = "kerncycle",
    version,
    about = "Cycle detection and comparison for GPU kernel execution traces."
)]
struct Opt {
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Detect periodic cycles in a trace and emit per-cycle CSV files.
    /// This is the implied action when no other subcommand is given.
    Analyze(AnalyzeArgs),
    /// Compare two per-cycle CSV files.
    CompareCsv(CompareCsvArgs),
    /// Pair up and compare per-cycle CSV files from two batch runs into one workbook.
    CompareAll(CompareAllArgs),
}

#[derive(Debug, clap::Args)]
struct AnalyzeArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
    #[arg(long, value_enum, default_value_t = AnalyzeModeArg::All)]
    mode: AnalyzeModeArg,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum AnalyzeModeArg {
    All,
    Llm,
}

#[derive(Debug, clap::Args)]
struct CompareCsvArgs {
    #[arg(long)]
    baseline: PathBuf,
    #[arg(long)]
    new: PathBuf,
    #[arg(long, value_enum, default_value_t = ComparatorModeArg::Align)]
    mode: ComparatorModeArg,
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum ComparatorModeArg {
    Align,
    Match,
}

impl From<ComparatorModeArg> for ComparatorMode {
    fn from(m: ComparatorModeArg) -> Self {
        match m {
            ComparatorModeArg::Align => ComparatorMode::Align,
            ComparatorModeArg::Match => ComparatorMode::Match,
        }
    }
}

#[derive(Debug, clap::Args)]
struct CompareAllArgs {
    #[arg(long)]
    baseline: PathBuf,
    #[arg(long)]
    new: PathBuf,
    #[arg(long)]
    output: PathBuf,
    #[arg(long, default_value_t = false)]
    smart: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let opt = Opt::parse();

    let result = match opt.action {
        Action::Analyze(args) => run_analyze(&args),
        Action::CompareCsv(args) => run_compare_csv(&args),
        Action::CompareAll(args) => run_compare_all(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("kerncycle: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_analyze(args: &AnalyzeArgs) -> Result<(), EngineError> {
    let events = read_trace_events(&args.input)?;
    if events.is_empty() {
        return Err(EngineError::NoKernelEvents(args.input.clone()));
    }
    if events.len() < 20 {
        return Err(EngineError::InsufficientEvents {
            found: events.len(),
            needed: 20,
        });
    }

    let detector_config = DetectorConfig::default();
    let descriptors = detect_cycles(&events, &detector_config);
    if descriptors.is_empty() {
        return Err(EngineError::NoCycleFound);
    }

    match args.mode {
        AnalyzeModeArg::All => {
            for (i, descriptor) in descriptors.iter().enumerate() {
                let result = aggregate(&events, descriptor);
                let path = format!("{}_cycle_{}.csv", args.output.display(), i);
                write_cycle_result(&path, &result)?;
            }
        }
        AnalyzeModeArg::Llm => {
            if let Some(d) = select_phase(&descriptors, Phase::Prefill, events.len(), &detector_config) {
                let result = aggregate(&events, d);
                let path = format!("{}_prefill.csv", args.output.display());
                write_cycle_result(&path, &result)?;
            }
            if let Some(d) = select_phase(&descriptors, Phase::Decode, events.len(), &detector_config) {
                let result = aggregate(&events, d);
                let path = format!("{}_decode.csv", args.output.display());
                write_cycle_result(&path, &result)?;
            }
        }
    }

    Ok(())
}

fn write_cycle_result(path: &str, result: &CycleResult) -> Result<(), EngineError> {
    let file = File::create(path)?;
    csv_io::write_cycle_csv(file, result)?;
    log::info!("wrote {path}");
    Ok(())
}

/// Wraps standalone positions (e.g. read back from a CSV) in a
/// [`CycleResult`] so they can flow through [`compare_cycles`], which only
/// ever reads the `positions` field. The descriptor and cycle-time fields
/// are not meaningful for CSV-sourced data and are filled with placeholders.
fn cycle_result_from_positions(positions: Vec<KernelStats>) -> CycleResult {
    let cycle_length = positions.len();
    let avg_cycle_time: f64 = positions.iter().map(|p| p.avg).sum();
    CycleResult {
        descriptor: CycleDescriptor {
            start_index: 0,
            cycle_length,
            num_repetitions: positions.first().map(|p| p.count).unwrap_or(0),
            repetition_starts: Vec::new(),
            anchor_name: None,
            signature: String::new(),
        },
        positions,
        avg_cycle_time,
        total_cycle_time: avg_cycle_time,
    }
}

fn read_cycle_csv_file(path: &Path) -> Result<CycleResult, EngineError> {
    let text = fs::read_to_string(path)?;
    let positions = csv_io::read_cycle_csv_positions(&text)?;
    Ok(cycle_result_from_positions(positions))
}

fn run_compare_csv(args: &CompareCsvArgs) -> Result<(), EngineError> {
    let baseline = read_cycle_csv_file(&args.baseline)?;
    let new = read_cycle_csv_file(&args.new)?;

    let config = ComparatorConfig {
        mode: args.mode.into(),
        improvement_threshold_pct: ComparatorConfig::default().improvement_threshold_pct,
    };

    let baseline_name = args.baseline.display().to_string();
    let new_name = args.new.display().to_string();
    let result = compare_cycles(&baseline, &baseline_name, &new, &new_name, &config);

    match &args.output {
        Some(path) => {
            let file = File::create(path)?;
            csv_io::write_comparison_csv(file, &result)?;
            log::info!("wrote {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            csv_io::write_comparison_csv(stdout.lock(), &result)?;
        }
    }
    Ok(())
}

/// Discovers `<base>_cycle_<n>.csv` files for a given base path, sorted by
/// `n`, and loads each into a [`CycleFile`].
fn discover_cycle_files(base: &Path) -> Result<Vec<CycleFile>, EngineError> {
    let dir = base.parent().unwrap_or_else(|| Path::new("."));
    let stem = base
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prefix = format!("{stem}_cycle_");

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(rest) = name.strip_prefix(&prefix) else {
            continue;
        };
        let Some(index_str) = rest.strip_suffix(".csv") else {
            continue;
        };
        let Ok(index) = index_str.parse::<usize>() else {
            continue;
        };
        let text = fs::read_to_string(entry.path())?;
        let positions = csv_io::read_cycle_csv_positions(&text)?;
        files.push(CycleFile { index, positions });
    }
    files.sort_by_key(|f| f.index);
    Ok(files)
}

fn run_compare_all(args: &CompareAllArgs) -> Result<(), EngineError> {
    let baseline_files = discover_cycle_files(&args.baseline)?;
    let new_files = discover_cycle_files(&args.new)?;

    let pairings = if args.smart {
        pair_smart(&baseline_files, &new_files)
    } else {
        pair_by_index(&baseline_files, &new_files)
    };

    let baseline_by_index: std::collections::HashMap<usize, &CycleFile> =
        baseline_files.iter().map(|f| (f.index, f)).collect();
    let new_by_index: std::collections::HashMap<usize, &CycleFile> =
        new_files.iter().map(|f| (f.index, f)).collect();

    let config = ComparatorConfig::default();
    let mut results = Vec::new();
    let mut sheet_names = Vec::new();

    for pairing in &pairings {
        let baseline = baseline_by_index[&pairing.baseline_index];
        let new = new_by_index[&pairing.new_index];
        let baseline_result = cycle_result_from_positions(baseline.positions.clone());
        let new_result = cycle_result_from_positions(new.positions.clone());

        let baseline_name = format!("cycle_{}", pairing.baseline_index);
        let new_name = format!("cycle_{}", pairing.new_index);
        let result = compare_cycles(&baseline_result, &baseline_name, &new_result, &new_name, &config);

        sheet_names.push(format!("cycle_{}_vs_{}", pairing.baseline_index, pairing.new_index));
        results.push(result);

        if let Some(sim) = pairing.similarity {
            log::info!(
                "paired baseline cycle {} with new cycle {} (similarity {sim:.3})",
                pairing.baseline_index,
                pairing.new_index
            );
        }
    }

    xlsx::write_multi_comparison_workbook(&args.output, &results, &sheet_names, &config)?;
    log::info!("wrote {}", args.output.display());
    Ok(())
}
