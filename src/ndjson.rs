//! Reassembly of NDJSON lines from arbitrary transport chunks.
//!
//! HTTP bodies arrive in chunks that do not respect line boundaries: one chunk
//! may carry several lines, and one line (or even one UTF-8 character) may be
//! spread over several chunks. Bytes are kept until a `\n` is seen. Lines are
//! passed on as raw bytes, UTF-8 is checked when the JSON is decoded.

use crate::requester::{LineStream, RequestError};
use futures_util::{stream, Stream, StreamExt};
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line completed by it.
    /// Blank lines (Lichess sends them as keep-alive) are dropped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.pending[start..].iter().position(|b| *b == b'\n') {
            let end = start + pos;
            if let Some(line) = Self::trim(&self.pending[start..end]) {
                lines.push(line);
            }
            start = end + 1;
        }
        self.pending.drain(..start);
        lines
    }

    /// Returns the trailing line if the stream ended without a final newline.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.pending);
        Self::trim(&rest)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn trim(bytes: &[u8]) -> Option<Vec<u8>> {
        let start = bytes.iter().position(|b| !b.is_ascii_whitespace())?;
        let end = bytes.iter().rposition(|b| !b.is_ascii_whitespace())?;
        Some(bytes[start..=end].to_vec())
    }
}

/// Splits a stream of body chunks into a stream of lines.
///
/// A chunk error is passed on and ends the stream.
pub fn lines<S, B, E>(chunks: S) -> LineStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = (Box::pin(chunks), LineBuffer::new(), VecDeque::new(), false);
    stream::unfold(state, |(mut chunks, mut buffer, mut ready, mut done)| async move {
        loop {
            if let Some(line) = ready.pop_front() {
                return Some((Ok(line), (chunks, buffer, ready, done)));
            }
            if done {
                return None;
            }
            match chunks.next().await {
                Some(Ok(chunk)) => ready.extend(buffer.push(chunk.as_ref())),
                Some(Err(e)) => {
                    return Some((
                        Err(RequestError::transport(e)),
                        (chunks, buffer, VecDeque::new(), true),
                    ));
                }
                None => {
                    done = true;
                    ready.extend(buffer.finish());
                }
            }
        }
    })
    .boxed()
}
