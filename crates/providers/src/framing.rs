//! Splitting a streamed response body into JSON frames.
//!
//! Chunks from the network do not respect line boundaries, so the splitter
//! buffers until a full line is available.

/// How a provider delimits events on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Server-sent events: `data: {...}` lines, `[DONE]` terminator.
    Sse,
    /// Newline-delimited JSON: one object per line.
    Ndjson,
}

/// Incremental line splitter for one response body.
#[derive(Debug)]
pub struct FrameSplitter {
    framing: Framing,
    buffer: String,
    done: bool,
}

impl FrameSplitter {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: String::new(),
            done: false,
        }
    }

    /// The terminator frame has been seen; later bytes are ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed a chunk and return every complete frame it finished.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        self.buffer.push_str(chunk);

        let mut frames = Vec::new();
        while let Some(line_end) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=line_end).collect();
            if let Some(frame) = self.line(&line) {
                frames.push(frame);
            }
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        frames
    }

    /// Flush a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        self.line(&rest)
    }

    fn line(&mut self, raw: &str) -> Option<String> {
        let line = raw.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            return None;
        }
        match self.framing {
            Framing::Ndjson => Some(line.trim().to_string()),
            Framing::Sse => {
                // `event:`, `id:`, `retry:` and `:` comments carry nothing we need.
                let data = line.strip_prefix("data:")?.trim();
                if data == "[DONE]" {
                    self.done = true;
                    return None;
                }
                if data.is_empty() {
                    return None;
                }
                Some(data.to_string())
            }
        }
    }
}
