//! Server-sent events framing.

use std::collections::VecDeque;

use futures::{StreamExt, stream::BoxStream};
use oc_pocket_core::ApiError;

use crate::ByteStream;

/// Longest line kept; longer lines are discarded up to their terminator.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Stream of frames from one connection, in arrival order.
pub type FrameStream = BoxStream<'static, Result<SseFrame, ApiError>>;

/// One dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field, if the server sent one.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

/// Incremental line parser.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across chunks decode correctly.
#[derive(Debug)]
pub struct SseParser {
    buffer: Vec<u8>,
    max_line: usize,
    oversized: bool,
    event: Option<String>,
    data: Vec<String>,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line,
            oversized: false,
            event: None,
            data: Vec::new(),
        }
    }

    /// Feed a chunk, returning every frame it completes.
    ///
    /// Only the new bytes are scanned for line breaks; a pending partial
    /// line is never rescanned.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            rest = &tail[1..];
            if self.oversized {
                self.oversized = false;
                self.buffer.clear();
                continue;
            }
            if self.buffer.len() + head.len() > self.max_line {
                self.buffer.clear();
                tracing::warn!(limit = self.max_line, "Dropping oversized event stream line");
                continue;
            }

            self.buffer.extend_from_slice(head);
            let mut line = std::mem::take(&mut self.buffer);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(frame) = self.line(&String::from_utf8_lossy(&line)) {
                frames.push(frame);
            }
            line.clear();
            self.buffer = line;
        }

        if !self.oversized {
            if self.buffer.len() + rest.len() > self.max_line {
                tracing::warn!(limit = self.max_line, "Dropping oversized event stream line");
                self.buffer.clear();
                self.oversized = true;
            } else {
                self.buffer.extend_from_slice(rest);
            }
        }
        frames
    }

    fn line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take().filter(|e| !e.is_empty());
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame { event, data })
    }
}

/// Split a byte stream into frames.
///
/// A transport error is yielded once and ends the stream.
#[must_use]
pub fn sse_frames(body: ByteStream) -> FrameStream {
    let state = (body, SseParser::new(), VecDeque::new(), false);
    futures::stream::unfold(state, |(mut body, mut parser, mut pending, failed)| async move {
        loop {
            if let Some(frame) = pending.pop_front() {
                return Some((Ok(frame), (body, parser, pending, failed)));
            }
            if failed {
                return None;
            }
            match body.next().await {
                Some(Ok(chunk)) => pending.extend(parser.feed(&chunk)),
                Some(Err(e)) => return Some((Err(e), (body, parser, pending, true))),
                None => return None,
            }
        }
    })
    .boxed()
}
