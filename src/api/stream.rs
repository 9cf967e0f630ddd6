use super::logging::emit_stream_parse_error;
use crate::error::{GhostError, Result};
use crate::types::StreamChunk;

/// Reassembles newline-delimited JSON chunks from arbitrary byte slices.
#[derive(Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every complete line decoded so far.
    ///
    /// A line that carries an `error` field ends the stream with a protocol
    /// violation. Lines that fail to decode are logged and skipped.
    pub fn process(&mut self, chunk: &[u8]) -> Result<Vec<StreamChunk>> {
        self.buffer.extend_from_slice(chunk);
        let mut chunks = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = end + 1;
            if let Some(parsed) = decode_line(&line)? {
                chunks.push(parsed);
            }
        }

        if start > 0 {
            self.buffer.drain(..start);
        }
        Ok(chunks)
    }

    /// Decode a final line that arrived without a trailing newline.
    pub fn finish(&mut self) -> Result<Option<StreamChunk>> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&String::from_utf8_lossy(&rest))
    }
}

fn decode_line(line: &str) -> Result<Option<StreamChunk>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<StreamChunk>(line) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return Err(GhostError::ProtocolViolation(error));
            }
            Ok(Some(chunk))
        }
        Err(e) => {
            emit_stream_parse_error(line, &e);
            Ok(None)
        }
    }
}
