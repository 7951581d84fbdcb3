//! Chunk transforms applied before the decoder scans incoming text.

/// Rewrites raw chunks before they reach the scanner. Transforms may buffer
/// partial input between calls.
pub trait StreamTransform: Send {
    fn name(&self) -> &'static str;

    fn transform(&mut self, chunk: &str) -> String;

    /// Flush anything still buffered when the stream ends
    fn finish(&mut self) -> String {
        String::new()
    }

    fn reset(&mut self) {}
}

/// Unwraps Server-Sent Events framing, forwarding the payload of `data:` lines.
///
/// Other fields, comments, and the `[DONE]` sentinel are dropped.
#[derive(Debug, Default)]
pub struct SseTransform {
    pending: String,
}

impl SseTransform {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_line(line: &str, out: &mut String) {
        let line = line.trim_end_matches('\r');
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.strip_prefix(' ').unwrap_or(data);
            if data != "[DONE]" {
                out.push_str(data);
            }
        }
    }
}

impl StreamTransform for SseTransform {
    fn name(&self) -> &'static str {
        "sse"
    }

    fn transform(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        let mut out = String::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            Self::take_line(&line[..line.len() - 1], &mut out);
        }
        out
    }

    fn finish(&mut self) -> String {
        let mut out = String::new();
        let line = std::mem::take(&mut self.pending);
        Self::take_line(&line, &mut out);
        out
    }

    fn reset(&mut self) {
        self.pending.clear();
    }
}
