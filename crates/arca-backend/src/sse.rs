//! Server-Sent Events frame reader.
//!
//! Turns a byte stream delivered in arbitrary chunks into discrete frames.
//! Chunk boundaries never need to line up with frame boundaries: the decoder
//! keeps a carry-over buffer, holds back a trailing `\r` until it knows whether
//! a `\n` follows, and carries incomplete UTF-8 sequences into the next chunk.

use std::collections::VecDeque;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::BackendError;

/// Payload that marks normal completion of a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

const DEFAULT_EVENT_TYPE: &str = "message";
const ERROR_EVENT_TYPE: &str = "error";

/// One parsed protocol unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// From the `event:` field; `"message"` when absent.
    pub event_type: String,
    /// All `data:` lines joined with `\n`.
    pub data: String,
}

impl Frame {
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_SENTINEL
    }

    pub fn is_error(&self) -> bool {
        self.event_type == ERROR_EVENT_TYPE
    }

    /// Parse one delimiter-free block. Returns `None` for blocks that carry
    /// neither an event type nor data (blank runs, comment-only blocks).
    fn parse(block: &str) -> Option<Frame> {
        let mut event_type: Option<String> = None;
        let mut data: Vec<&str> = Vec::new();

        for line in block.split('\n') {
            // Comments start with a colon
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.find(':') {
                Some(colon_pos) => {
                    let value = &line[colon_pos + 1..];
                    (&line[..colon_pos], value.strip_prefix(' ').unwrap_or(value))
                }
                None => (line, ""),
            };

            match field {
                "event" => event_type = Some(value.trim().to_string()),
                "data" => data.push(value),
                // id, retry and unknown fields carry nothing we use
                _ => {}
            }
        }

        if event_type.is_none() && data.is_empty() {
            return None;
        }

        Some(Frame {
            event_type: event_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string()),
            data: data.join("\n"),
        })
    }
}

/// Incremental frame decoder with a carry-over buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: String,
    pending_cr: bool,
    utf8_tail: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every frame completed by them.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.utf8_tail.extend_from_slice(bytes);
        let text = take_valid_utf8(&mut self.utf8_tail);
        self.push_str(&text)
    }

    /// Feed decoded text; returns every frame completed by it.
    pub fn push_str(&mut self, chunk: &str) -> Vec<Frame> {
        let mut text = String::with_capacity(chunk.len() + 1);
        if self.pending_cr {
            text.push('\r');
            self.pending_cr = false;
        }
        text.push_str(chunk);
        // A lone trailing \r may be the first half of \r\n
        if text.ends_with('\r') {
            text.pop();
            self.pending_cr = true;
        }

        self.buffer.push_str(&normalize_line_endings(&text));
        self.drain_complete()
    }

    /// End of stream: the residual buffer, if any, becomes one last frame.
    pub fn finish(&mut self) -> Option<Frame> {
        if !self.utf8_tail.is_empty() {
            let tail = std::mem::take(&mut self.utf8_tail);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }
        if std::mem::take(&mut self.pending_cr) {
            self.buffer.push('\n');
        }

        let residual = std::mem::take(&mut self.buffer);
        if residual.trim().is_empty() {
            return None;
        }
        Frame::parse(&residual)
    }

    fn drain_complete(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut start = 0;

        while let Some(end) = self.buffer[start..].find("\n\n") {
            let block = &self.buffer[start..start + end];
            if let Some(frame) = Frame::parse(block) {
                frames.push(frame);
            }
            start += end + 2;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        frames
    }
}

fn normalize_line_endings(text: &str) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        text.to_string()
    }
}

/// Decode the longest valid UTF-8 prefix of `buf`, leaving an incomplete
/// trailing sequence in place. Invalid sequences become U+FFFD.
fn take_valid_utf8(buf: &mut Vec<u8>) -> String {
    let mut out = String::with_capacity(buf.len());
    let mut start = 0;

    while start < buf.len() {
        match std::str::from_utf8(&buf[start..]) {
            Ok(text) => {
                out.push_str(text);
                start = buf.len();
            }
            Err(e) => {
                let valid_end = start + e.valid_up_to();
                out.push_str(std::str::from_utf8(&buf[start..valid_end]).unwrap_or_default());
                match e.error_len() {
                    // Incomplete sequence at the end: wait for more bytes
                    None => {
                        start = valid_end;
                        break;
                    }
                    Some(len) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        start = valid_end + len;
                    }
                }
            }
        }
    }

    buf.drain(..start);
    out
}

/// Result of one read from a [`FrameReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Frame(Frame),
    /// `[DONE]` was received or the stream ended.
    Done,
    /// The cancellation token fired; nothing more will be read.
    Cancelled,
}

/// Reads frames from a byte stream, honouring a cancellation token at the
/// only suspension point (the next chunk read).
pub struct FrameReader<S> {
    inner: S,
    decoder: FrameDecoder,
    pending: VecDeque<Frame>,
    finished: bool,
}

impl<S, E> FrameReader<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<BackendError>,
{
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Next data frame, `Done`, or `Cancelled`. An `event: error` frame or a
    /// transport failure is returned as `Err` and ends the stream.
    pub async fn next(&mut self, cancel: &CancellationToken) -> Result<ReadOutcome, BackendError> {
        loop {
            if cancel.is_cancelled() {
                log::debug!("[arca:sse] read cancelled");
                self.finished = true;
                self.pending.clear();
                return Ok(ReadOutcome::Cancelled);
            }

            if let Some(frame) = self.pending.pop_front() {
                return self.classify(frame);
            }

            if self.finished {
                return Ok(ReadOutcome::Done);
            }

            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = self.inner.next() => Some(item),
            };
            // Cancelled mid-read: the check at the top of the loop reports it
            let Some(item) = polled else {
                continue;
            };

            match item {
                Some(Ok(bytes)) => {
                    let frames = self.decoder.push_bytes(&bytes);
                    self.pending.extend(frames);
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(e.into());
                }
                None => {
                    self.finished = true;
                    if let Some(frame) = self.decoder.finish() {
                        self.pending.push_back(frame);
                    }
                }
            }
        }
    }

    fn classify(&mut self, frame: Frame) -> Result<ReadOutcome, BackendError> {
        if frame.is_done() {
            self.finished = true;
            self.pending.clear();
            return Ok(ReadOutcome::Done);
        }
        if frame.is_error() {
            log::warn!("[arca:sse] error frame: {}", frame.data);
            self.finished = true;
            self.pending.clear();
            return Err(BackendError::from_error_frame(&frame.data));
        }
        Ok(ReadOutcome::Frame(frame))
    }
}
