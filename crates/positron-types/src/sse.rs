//! Line framing for `text/event-stream` bodies.
//!
//! Both the relay (reading Gemini) and the client (reading the relay) receive
//! bodies in arbitrary byte chunks. A line may be split across reads, and so
//! may a multi-byte UTF-8 sequence, so bytes are held until a full line is in.

/// Accumulates raw bytes and yields the payload of each complete `data:` line.
#[derive(Debug, Default)]
pub struct EventLineBuffer {
    pending: Vec<u8>,
}

impl EventLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the body. Returns the `data:` payloads of every line
    /// completed by this chunk, in order. Other lines are dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(data) = data_payload(&line) {
                out.push(data);
            }
        }
        out
    }

    /// Flush a trailing line that was never newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.pending);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\n', '\r']);
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data).to_string())
}
