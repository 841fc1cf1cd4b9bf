use serde::Deserialize;

/// A single GPU kernel completion, retained from a trace's `traceEvents`
/// array. Only complete-duration (`ph == "X"`) samples from the `"kernel"`
/// category are ever turned into one of these.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelEvent {
    pub name: String,
    pub timestamp: f64,
    pub duration: f64,
    pub pid: i64,
    pub tid: i64,
}

/// Wire-format mirror of one `traceEvents[]` element. Fields beyond the ones
/// the retention predicate needs are parsed so their types can be validated,
/// but otherwise ignored (`args` in particular is never interpreted).
#[derive(Debug, Deserialize)]
pub(crate) struct RawTraceEvent {
    pub name: String,
    pub cat: String,
    pub ph: String,
    pub ts: f64,
    #[serde(default)]
    pub dur: f64,
    #[serde(default)]
    pub pid: i64,
    #[serde(default)]
    pub tid: i64,
    #[serde(default, skip_serializing)]
    #[allow(dead_code)]
    pub args: Option<serde_json::Value>,
}

impl RawTraceEvent {
    /// Retention predicate: `cat == "kernel" && ph == "X"`.
    pub(crate) fn is_kernel_complete_sample(&self) -> bool {
        self.cat == "kernel" && self.ph == "X"
    }
}

impl From<RawTraceEvent> for KernelEvent {
    fn from(raw: RawTraceEvent) -> Self {
        KernelEvent {
            name: raw.name,
            timestamp: raw.ts,
            duration: raw.dur,
            pid: raw.pid,
            tid: raw.tid,
        }
    }
}

/// Tries to turn one raw JSON array element into a retained [`KernelEvent`].
/// Returns `None` for anything that fails to parse or fails the retention
/// predicate — malformed elements are skipped, never fatal.
pub(crate) fn try_retain(value: &serde_json::Value) -> Option<KernelEvent> {
    let raw: RawTraceEvent = serde_json::from_value(value.clone()).ok()?;
    if raw.is_kernel_complete_sample() {
        Some(raw.into())
    } else {
        None
    }
}
