use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the trace-analysis engine.
///
/// Variants map directly onto the error kinds catalogued in the design doc:
/// parsing/detection errors are returned to the caller, while a single
/// malformed trace event never aborts the stream (it is counted and logged,
/// not surfaced here).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("could not read trace file {path:?}: {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: InputUnreadableReason,
    },

    #[error("trace file {0:?} parsed but contained no retained kernel events")]
    NoKernelEvents(PathBuf),

    #[error("only {found} events retained (need at least {needed}) for cycle detection")]
    InsufficientEvents { found: usize, needed: usize },

    #[error("no significant periodic pattern found in the event stream")]
    NoCycleFound,

    #[error("comparison input invalid: {0}")]
    ComparisonInputInvalid(String),

    #[error("batch comparison given {sheet_names} sheet names for {comparisons} comparisons")]
    MismatchedSheetNames {
        sheet_names: usize,
        comparisons: usize,
    },
}

#[derive(Debug, Error)]
pub enum InputUnreadableReason {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("top-level JSON value is not an object")]
    NotAnObject,
    #[error("top-level object has no `traceEvents` array")]
    MissingTraceEvents,
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::InputUnreadable {
            path: PathBuf::new(),
            source: InputUnreadableReason::Io(e),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::InputUnreadable {
            path: PathBuf::new(),
            source: InputUnreadableReason::Json(e),
        }
    }
}

impl From<csv::Error> for EngineError {
    fn from(e: csv::Error) -> Self {
        EngineError::ComparisonInputInvalid(e.to_string())
    }
}
