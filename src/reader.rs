//! Streams a (optionally gzip-compressed) JSON trace file, locates the
//! `traceEvents` array, and yields normalized [`KernelEvent`]s.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::bufread::GzDecoder;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};

use crate::config::EarlyStopHints;
use crate::detector::quick_probe;
use crate::error::{EngineError, InputUnreadableReason};
use crate::event::{try_retain, KernelEvent};

/// Large buffered reads are used because traces of hundreds of millions of
/// events are routine.
const READ_BUFFER_BYTES: usize = 32 * 1024 * 1024;

fn open_reader(path: &Path) -> Result<Box<dyn Read>, EngineError> {
    let file = File::open(path).map_err(|e| EngineError::InputUnreadable {
        path: path.to_path_buf(),
        source: InputUnreadableReason::Io(e),
    })?;
    let buffered = BufReader::with_capacity(READ_BUFFER_BYTES, file);

    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Ok(Box::new(GzDecoder::new(buffered)))
    } else {
        Ok(Box::new(buffered))
    }
}

/// Default, in-memory reader path: parses the whole `traceEvents` array
/// into retained [`KernelEvent`]s. Other top-level members are skipped.
/// Malformed array elements are skipped silently.
pub fn read_trace_events(path: &Path) -> Result<Vec<KernelEvent>, EngineError> {
    let reader = open_reader(path)?;
    let doc: serde_json::Value =
        serde_json::from_reader(reader).map_err(|e| EngineError::InputUnreadable {
            path: path.to_path_buf(),
            source: InputUnreadableReason::Json(e),
        })?;

    let obj = doc.as_object().ok_or_else(|| EngineError::InputUnreadable {
        path: path.to_path_buf(),
        source: InputUnreadableReason::NotAnObject,
    })?;
    let trace_events = obj
        .get("traceEvents")
        .and_then(|v| v.as_array())
        .ok_or_else(|| EngineError::InputUnreadable {
            path: path.to_path_buf(),
            source: InputUnreadableReason::MissingTraceEvents,
        })?;

    let mut skipped = 0usize;
    let mut events = Vec::with_capacity(trace_events.len());
    for raw in trace_events {
        match try_retain(raw) {
            Some(e) => events.push(e),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        log::warn!("skipped {skipped} malformed or non-kernel trace events");
    }
    Ok(events)
}

/// Outcome of the early-stop reader variant.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    /// The quick probe found a confident pattern before EOF; reading
    /// stopped early. Carries the number of events consumed so far.
    StoppedEarly { events_consumed: usize },
    /// The whole file was consumed without the probe firing.
    ReachedEof { events_consumed: usize },
}

/// Early-stop variant: invokes `on_event` for every retained event, and
/// every ~10k retained events runs the quick periodicity probe against the
/// accumulated name buffer. Returns as soon as the probe is confident; this
/// is an optimization only, correctness never depends on it.
pub fn read_trace_events_with_probe(
    path: &Path,
    hints: EarlyStopHints,
    mut on_event: impl FnMut(&KernelEvent),
) -> Result<ProbeOutcome, EngineError> {
    let reader = open_reader(path)?;
    let mut de = serde_json::Deserializer::from_reader(reader);

    let mut collector = EventCollector {
        hints,
        names_so_far: Vec::new(),
        consumed: 0,
        stopped_early: false,
        on_event: &mut on_event,
    };

    (&mut de)
        .deserialize_any(TraceDocumentVisitor {
            collector: &mut collector,
        })
        .map_err(|e| EngineError::InputUnreadable {
        path: path.to_path_buf(),
        source: InputUnreadableReason::Json(e),
    })?;

    if collector.stopped_early {
        Ok(ProbeOutcome::StoppedEarly {
            events_consumed: collector.consumed,
        })
    } else {
        Ok(ProbeOutcome::ReachedEof {
            events_consumed: collector.consumed,
        })
    }
}

const PROBE_INTERVAL: usize = 10_000;
const PROBE_MIN_CONSECUTIVE_REPS: usize = 10;

struct EventCollector<'a> {
    hints: EarlyStopHints,
    names_so_far: Vec<String>,
    consumed: usize,
    stopped_early: bool,
    on_event: &'a mut dyn FnMut(&KernelEvent),
}

impl EventCollector<'_> {
    fn push(&mut self, event: KernelEvent) -> bool {
        self.names_so_far.push(event.name.clone());
        (self.on_event)(&event);
        self.consumed += 1;

        if self.consumed % PROBE_INTERVAL == 0 {
            let refs: Vec<&str> = self.names_so_far.iter().map(|s| s.as_str()).collect();
            if let Some(probe) = quick_probe(&refs, self.hints.min_cycle, self.hints.max_cycle) {
                if probe.num_repetitions >= PROBE_MIN_CONSECUTIVE_REPS {
                    self.stopped_early = true;
                    return false;
                }
            }
        }
        true
    }
}

/// Visits the top-level JSON object, looking for `traceEvents`; every other
/// member is deserialized and discarded via `IgnoredAny`.
struct TraceDocumentVisitor<'a, 'b> {
    collector: &'a mut EventCollector<'b>,
}

impl<'de, 'a, 'b> Visitor<'de> for TraceDocumentVisitor<'a, 'b> {
    type Value = ();

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "a JSON object with a traceEvents array")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        while let Some(key) = map.next_key::<String>()? {
            if key == "traceEvents" {
                map.next_value_seed(TraceEventsSeed {
                    collector: self.collector,
                })?;
                // We've found what we came for; the caller drops the
                // underlying reader once this function returns, so there's
                // no need to consume the rest of the document.
                return Ok(());
            } else {
                map.next_value::<de::IgnoredAny>()?;
            }
        }
        Ok(())
    }
}

struct TraceEventsSeed<'a, 'b> {
    collector: &'a mut EventCollector<'b>,
}

impl<'de, 'a, 'b> de::DeserializeSeed<'de> for TraceEventsSeed<'a, 'b> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(TraceEventsSeqVisitor {
            collector: self.collector,
        })
    }
}

struct TraceEventsSeqVisitor<'a, 'b> {
    collector: &'a mut EventCollector<'b>,
}

impl<'de, 'a, 'b> Visitor<'de> for TraceEventsSeqVisitor<'a, 'b> {
    type Value = ();

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "an array of trace event objects")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        while let Some(value) = seq.next_element::<serde_json::Value>()? {
            if let Some(event) = try_retain(&value) {
                if !self.collector.push(event) {
                    // Quick probe fired; abandon the rest of the array.
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_trace(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn retains_only_kernel_complete_samples() {
        let json = r#"{
            "traceEvents": [
                {"name": "k1", "cat": "kernel", "ph": "X", "ts": 0.0, "dur": 1.0, "pid": 1, "tid": 1},
                {"name": "k2", "cat": "other", "ph": "X", "ts": 1.0, "dur": 1.0, "pid": 1, "tid": 1},
                {"name": "k3", "cat": "kernel", "ph": "B", "ts": 2.0, "dur": 1.0, "pid": 1, "tid": 1},
                {"name": "k4", "cat": "kernel", "ph": "X", "ts": 3.0, "dur": 2.0, "pid": 1, "tid": 1}
            ],
            "otherField": {"nested": [1, 2, 3]}
        }"#;
        let f = write_trace(json);
        let events = read_trace_events(f.path()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "k1");
        assert_eq!(events[1].name, "k4");
    }

    #[test]
    fn malformed_elements_are_skipped_not_fatal() {
        let json = r#"{
            "traceEvents": [
                {"name": "k1", "cat": "kernel", "ph": "X", "ts": 0.0, "dur": 1.0, "pid": 1, "tid": 1},
                {"not": "an event"},
                42,
                {"name": "k2", "cat": "kernel", "ph": "X", "ts": 1.0, "dur": 1.0, "pid": 1, "tid": 1}
            ]
        }"#;
        let f = write_trace(json);
        let events = read_trace_events(f.path()).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn missing_trace_events_is_an_error() {
        let json = r#"{"foo": "bar"}"#;
        let f = write_trace(json);
        let err = read_trace_events(f.path()).unwrap_err();
        match err {
            EngineError::InputUnreadable {
                source: InputUnreadableReason::MissingTraceEvents,
                ..
            } => {}
            other => panic!("expected MissingTraceEvents, got {other:?}"),
        }
    }

    #[test]
    fn trace_events_not_an_array_is_an_error() {
        let json = r#"{"traceEvents": "not an array"}"#;
        let f = write_trace(json);
        let err = read_trace_events(f.path()).unwrap_err();
        match err {
            EngineError::InputUnreadable {
                source: InputUnreadableReason::MissingTraceEvents,
                ..
            } => {}
            other => panic!("expected MissingTraceEvents, got {other:?}"),
        }
    }

    #[test]
    fn top_level_non_object_is_an_error() {
        let json = r#"[1, 2, 3]"#;
        let f = write_trace(json);
        let err = read_trace_events(f.path()).unwrap_err();
        match err {
            EngineError::InputUnreadable {
                source: InputUnreadableReason::NotAnObject,
                ..
            } => {}
            other => panic!("expected NotAnObject, got {other:?}"),
        }
    }

    #[test]
    fn early_stop_callback_receives_events() {
        let mut events_json = String::from("[");
        for i in 0..50 {
            if i > 0 {
                events_json.push(',');
            }
            events_json.push_str(&format!(
                r#"{{"name": "K{}", "cat": "kernel", "ph": "X", "ts": {}, "dur": 1.0, "pid": 1, "tid": 1}}"#,
                i % 11,
                i
            ));
        }
        events_json.push(']');
        let json = format!(r#"{{"traceEvents": {events_json}}}"#);
        let f = write_trace(&json);

        let mut collected = Vec::new();
        let hints = EarlyStopHints {
            min_cycle: 5,
            max_cycle: 50,
        };
        let outcome = read_trace_events_with_probe(f.path(), hints, |e| {
            collected.push(e.name.clone());
        })
        .unwrap();
        assert!(!collected.is_empty());
        match outcome {
            ProbeOutcome::ReachedEof { events_consumed } => assert_eq!(events_consumed, 50),
            ProbeOutcome::StoppedEarly { events_consumed } => assert!(events_consumed <= 50),
        }
    }
}
