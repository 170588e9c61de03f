use tracing::error;

/// Newline framing over an unbounded inbound byte stream.
///
/// A single growable buffer accumulates raw chunks; complete lines are
/// returned in arrival order and the trailing fragment after the last
/// newline is retained for the next chunk. A buffer that grows past the
/// hard cap is discarded whole; the stream is not torn down, the peer is
/// expected to retransmit anything older than the cap.
#[derive(Debug)]
pub struct LineFramer {
    buffer: String,
    limit: usize,
}

impl LineFramer {
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: String::new(),
            limit,
        }
    }

    /// Appends a raw chunk and returns every complete line it closes.
    ///
    /// Splits on one or more consecutive newlines; empty lines are skipped.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);

        if self.buffer.len() > self.limit {
            self.buffer.clear();
            error!("Reached buffer limit, buffer cleaned up.");
            return Vec::new();
        }

        if !self.buffer.contains('\n') {
            return Vec::new();
        }

        let (lines, rest) = {
            let mut parts: Vec<&str> = self.buffer.split('\n').collect();
            let rest = parts.pop().unwrap_or_default().to_string();
            let lines: Vec<String> = parts
                .into_iter()
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect();
            (lines, rest)
        };

        self.buffer = rest;
        lines
    }

    /// Unparsed bytes currently retained.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
