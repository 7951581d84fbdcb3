//! Stream Decoder
//!
//! Incremental decoder for a chunked text stream carrying JSON objects or
//! arrays, possibly interleaved with prose. Every top-level value that closes
//! is parsed and turned into id-keyed patches:
//!
//! - an object's keys are entity ids; a value lacking `id` gets the key
//! - an array's elements must each carry a string `id`
//!
//! With auto-repair on, the still-open tail is repaired after each chunk and
//! dispatched as a preview (`is_final = false`). A preview identical to the
//! previous preview for the same id is suppressed, and the open last entry is
//! held back until its id is settled.

pub mod repair;
pub mod transform;

pub use repair::repair;
pub use transform::{SseTransform, StreamTransform};

use crate::atoms::AtomStore;
use crate::types::{NodeId, Patch};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Where decoded patches go
pub enum PatchSink {
    Callback(Box<dyn FnMut(Patch) + Send>),
    /// Each patch is written under its id as a whole JSON object
    Atoms(Arc<dyn AtomStore>),
    Discard,
}

impl PatchSink {
    fn deliver(&mut self, patch: Patch) {
        match self {
            PatchSink::Callback(callback) => callback(patch),
            PatchSink::Atoms(store) => store.set(&patch.id, patch.to_value()),
            PatchSink::Discard => {}
        }
    }
}

impl fmt::Debug for PatchSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            PatchSink::Callback(_) => "Callback",
            PatchSink::Atoms(_) => "Atoms",
            PatchSink::Discard => "Discard",
        };
        f.write_str(kind)
    }
}

type FinishCallback = Box<dyn FnMut(Option<&Value>) + Send>;

pub struct DecoderOptions {
    pub auto_repair: bool,
    pub sink: PatchSink,
    pub on_finish: Option<FinishCallback>,
    pub transforms: Vec<Box<dyn StreamTransform>>,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            auto_repair: true,
            sink: PatchSink::Discard,
            on_finish: None,
            transforms: Vec::new(),
        }
    }
}

impl DecoderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_repair(mut self, enabled: bool) -> Self {
        self.auto_repair = enabled;
        self
    }

    pub fn on_patch(mut self, callback: impl FnMut(Patch) + Send + 'static) -> Self {
        self.sink = PatchSink::Callback(Box::new(callback));
        self
    }

    pub fn into_atoms(mut self, store: Arc<dyn AtomStore>) -> Self {
        self.sink = PatchSink::Atoms(store);
        self
    }

    pub fn on_finish(mut self, callback: impl FnMut(Option<&Value>) + Send + 'static) -> Self {
        self.on_finish = Some(Box::new(callback));
        self
    }

    pub fn transform(mut self, transform: impl StreamTransform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }
}

/// Counters for one decoder instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub chunks: u64,
    pub patches: u64,
    pub previews: u64,
    pub parse_errors: u64,
}

#[derive(Debug, Default)]
struct Scanner {
    /// Next byte of the buffer to scan
    pos: usize,
    /// Start of the open top-level value
    start: Option<usize>,
    openers: Vec<u8>,
    in_string: bool,
    /// Opening quote of the current string
    string_start: usize,
    escaped: bool,
}

pub struct StreamDecoder {
    auto_repair: bool,
    sink: PatchSink,
    on_finish: Option<FinishCallback>,
    transforms: Vec<Box<dyn StreamTransform>>,
    buffer: String,
    scanner: Scanner,
    last_payload: Option<Value>,
    previews: HashMap<NodeId, Map<String, Value>>,
    stats: DecoderStats,
}

impl StreamDecoder {
    pub fn new(options: DecoderOptions) -> Self {
        Self {
            auto_repair: options.auto_repair,
            sink: options.sink,
            on_finish: options.on_finish,
            transforms: options.transforms,
            buffer: String::new(),
            scanner: Scanner::default(),
            last_payload: None,
            previews: HashMap::new(),
            stats: DecoderStats::default(),
        }
    }

    /// Feed one chunk; returns the number of patches dispatched.
    pub fn write(&mut self, chunk: &str) -> usize {
        self.stats.chunks += 1;
        let text = self
            .transforms
            .iter_mut()
            .fold(chunk.to_string(), |text, t| t.transform(&text));

        let mut dispatched = self.ingest(&text);
        if self.auto_repair {
            dispatched += self.preview();
        }
        dispatched
    }

    /// Flush the stream: close what can be closed, dispatch it as final, and
    /// hand the last parsed payload to the finish callback.
    pub fn end(&mut self) -> Option<Value> {
        // Each transform sees upstream leftovers once, then flushes its own.
        let tail = self.transforms.iter_mut().fold(String::new(), |upstream, t| {
            let mut text = t.transform(&upstream);
            text.push_str(&t.finish());
            text
        });
        self.ingest(&tail);

        if let Some(start) = self.scanner.start {
            if self.auto_repair {
                match repair(&self.buffer[start..]).map(|text| serde_json::from_str::<Value>(&text)) {
                    Some(Ok(value)) => {
                        self.complete(value);
                    }
                    _ => {
                        self.stats.parse_errors += 1;
                        debug!(bytes = self.buffer.len() - start, "Unrepairable tail dropped");
                    }
                }
            } else {
                debug!(bytes = self.buffer.len() - start, "Unterminated tail dropped");
            }
        }

        self.buffer.clear();
        self.scanner = Scanner::default();
        self.previews.clear();

        let payload = self.last_payload.clone();
        if let Some(on_finish) = self.on_finish.as_mut() {
            on_finish(payload.as_ref());
        }
        payload
    }

    /// Drop buffered text and scanner state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scanner = Scanner::default();
        self.previews.clear();
        for transform in &mut self.transforms {
            transform.reset();
        }
    }

    /// Most recent fully parsed top-level value that produced patches
    pub fn last_payload(&self) -> Option<&Value> {
        self.last_payload.as_ref()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Bytes held for a value that has not closed yet
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Append text, scan it, and dispatch every value that closed.
    fn ingest(&mut self, text: &str) -> usize {
        self.buffer.push_str(text);

        let mut closed: Vec<(usize, usize)> = Vec::new();
        let bytes = self.buffer.as_bytes();
        let scanner = &mut self.scanner;
        while scanner.pos < bytes.len() {
            let i = scanner.pos;
            let b = bytes[i];
            scanner.pos += 1;

            if scanner.openers.is_empty() {
                if b == b'{' || b == b'[' {
                    scanner.start = Some(i);
                    scanner.openers.push(b);
                    scanner.in_string = false;
                    scanner.escaped = false;
                }
                continue;
            }

            if scanner.in_string {
                if scanner.escaped {
                    scanner.escaped = false;
                } else if b == b'\\' {
                    scanner.escaped = true;
                } else if b == b'"' {
                    scanner.in_string = false;
                }
                continue;
            }

            match b {
                b'"' => {
                    scanner.in_string = true;
                    scanner.string_start = i;
                }
                b'{' | b'[' => scanner.openers.push(b),
                b'}' | b']' => {
                    scanner.openers.pop();
                    if scanner.openers.is_empty() {
                        if let Some(start) = scanner.start.take() {
                            closed.push((start, i));
                        }
                    }
                }
                _ => {}
            }
        }

        let parsed: Vec<Result<Value, serde_json::Error>> = closed
            .iter()
            .map(|(start, end)| serde_json::from_str(&self.buffer[*start..=*end]))
            .collect();

        // Keep only the open value (if any) in the buffer.
        match self.scanner.start {
            Some(start) => {
                self.buffer.drain(..start);
                self.scanner.pos -= start;
                self.scanner.string_start = self.scanner.string_start.saturating_sub(start);
                self.scanner.start = Some(0);
            }
            None => {
                self.buffer.clear();
                self.scanner.pos = 0;
            }
        }

        let mut dispatched = 0;
        for result in parsed {
            match result {
                Ok(value) => dispatched += self.complete(value),
                Err(err) => {
                    self.stats.parse_errors += 1;
                    debug!(error = %err, "Closed value is not valid JSON, skipping");
                }
            }
        }
        dispatched
    }

    /// Dispatch a closed value; only values that yielded patches become the last payload.
    fn complete(&mut self, value: Value) -> usize {
        let dispatched = self.dispatch(&value, true);
        if dispatched > 0 {
            self.last_payload = Some(value);
        } else {
            trace!("Closed value carried no patches");
        }
        dispatched
    }

    fn preview(&mut self) -> usize {
        let Some(start) = self.scanner.start else {
            return 0;
        };
        let Some(text) = repair(&self.buffer[start..]) else {
            return 0;
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => {
                let open_entry = OpenEntry {
                    open: self.scanner.openers.len() > 1,
                    id_streaming: self.id_streaming(start),
                };
                self.dispatch_preview(&value, open_entry)
            }
            Err(err) => {
                trace!(error = %err, "Tail not previewable yet");
                0
            }
        }
    }

    /// Whether the open string is the value of an `"id"` field.
    fn id_streaming(&self, start: usize) -> bool {
        if !self.scanner.in_string || self.scanner.string_start < start {
            return false;
        }
        let before = self.buffer[start..self.scanner.string_start].trim_end();
        before
            .strip_suffix(':')
            .map(|key| key.trim_end().ends_with("\"id\""))
            .unwrap_or(false)
    }

    fn dispatch(&mut self, value: &Value, is_final: bool) -> usize {
        self.deliver_all(patches_from(value), is_final)
    }

    fn dispatch_preview(&mut self, value: &Value, open_entry: OpenEntry) -> usize {
        self.deliver_all(preview_patches(value, open_entry), false)
    }

    fn deliver_all(&mut self, patches: Vec<(NodeId, Map<String, Value>)>, is_final: bool) -> usize {
        let mut dispatched = 0;
        for (id, data) in patches {
            if is_final {
                self.previews.remove(&id);
                self.stats.patches += 1;
            } else {
                if self.previews.get(&id) == Some(&data) {
                    continue;
                }
                self.previews.insert(id.clone(), data.clone());
                self.stats.previews += 1;
            }
            trace!(id = %id, is_final, "Dispatching patch");
            self.sink.deliver(Patch { id, data, is_final });
            dispatched += 1;
        }
        dispatched
    }
}

impl fmt::Debug for StreamDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDecoder")
            .field("auto_repair", &self.auto_repair)
            .field("sink", &self.sink)
            .field("buffered", &self.buffer.len())
            .field("stats", &self.stats)
            .finish()
    }
}

fn non_empty_id(data: &Map<String, Value>) -> Option<String> {
    data.get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Shape of the still-open last entry of a previewed tail
#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    /// The last entry of the top-level value has not closed
    open: bool,
    /// Its `id` string is still arriving
    id_streaming: bool,
}

/// Split a top-level value into `(id, data)` patches.
fn patches_from(value: &Value) -> Vec<(NodeId, Map<String, Value>)> {
    entries(value)
        .into_iter()
        .filter_map(|(key, entry)| entry_patch(key, entry))
        .collect()
}

/// Like [`patches_from`], but holds back the open last entry until its id is
/// settled: keyed entries wait for an explicit `id`, and no entry previews
/// while its `id` string is incomplete.
fn preview_patches(value: &Value, open_entry: OpenEntry) -> Vec<(NodeId, Map<String, Value>)> {
    let entries = entries(value);
    let last = entries.len().saturating_sub(1);
    entries
        .into_iter()
        .enumerate()
        .filter(|(index, (key, entry))| {
            if !open_entry.open || *index != last {
                return true;
            }
            let has_id = entry
                .as_object()
                .and_then(non_empty_id)
                .is_some();
            !open_entry.id_streaming && (key.is_none() || has_id)
        })
        .filter_map(|(_, (key, entry))| entry_patch(key, entry))
        .collect()
}

/// Top-level entries, paired with their object key when there is one
fn entries(value: &Value) -> Vec<(Option<&str>, &Value)> {
    match value {
        Value::Object(map) => map.iter().map(|(key, entry)| (Some(key.as_str()), entry)).collect(),
        Value::Array(items) => items.iter().map(|item| (None, item)).collect(),
        _ => Vec::new(),
    }
}

fn entry_patch(key: Option<&str>, entry: &Value) -> Option<(NodeId, Map<String, Value>)> {
    let mut data = entry.as_object()?.clone();
    match key {
        Some(key) => {
            let id = non_empty_id(&data).unwrap_or_else(|| key.to_string());
            data.insert("id".to_string(), Value::String(id.clone()));
            Some((id, data))
        }
        None => Some((non_empty_id(&data)?, data)),
    }
}
