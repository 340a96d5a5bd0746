//! Server-Sent-Events framing shared by every adapter.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tracing::debug;

use crate::error::RelayError;
use crate::http::HttpBodyStream;

/// One decoded SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Joined `data:` payload plus the preceding `event:` name, if any.
    Data { event: Option<String>, data: String },
    /// Literal `data: [DONE]` terminator.
    Done,
}

/// Splits a raw HTTP body into [`SseFrame`] values.
///
/// Frames whose payload is not valid UTF-8 are dropped; only transport errors
/// from the underlying body are surfaced. The decoder ends after `[DONE]`.
pub struct SseDecoder {
    body: HttpBodyStream,
    buffer: Vec<u8>,
    event: Option<String>,
    data_lines: Vec<Vec<u8>>,
    pending: VecDeque<SseFrame>,
    provider: &'static str,
    stream_closed: bool,
    done_received: bool,
}

impl SseDecoder {
    /// Wraps a raw HTTP body stream and prepares it for SSE decoding.
    pub fn new(body: HttpBodyStream, provider: &'static str) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            event: None,
            data_lines: Vec::new(),
            pending: VecDeque::new(),
            provider,
            stream_closed: false,
            done_received: false,
        }
    }

    fn handle_line(&mut self, line: Vec<u8>) {
        if let Some(rest) = line.strip_prefix(b"data:") {
            self.data_lines.push(strip_leading_space(rest).to_vec());
        } else if let Some(rest) = line.strip_prefix(b"event:") {
            let name = String::from_utf8_lossy(strip_leading_space(rest))
                .trim()
                .to_string();
            self.event = (!name.is_empty()).then_some(name);
        }
        // `id:`, `retry:` and `:` comment lines carry nothing we use.
    }

    fn flush_event(&mut self) {
        let event = self.event.take();
        if self.data_lines.is_empty() || self.done_received {
            self.data_lines.clear();
            return;
        }

        let joined = self.data_lines.drain(..).collect::<Vec<_>>().join(&b'\n');
        if joined.is_empty() {
            return;
        }

        let data = match String::from_utf8(joined) {
            Ok(data) => data,
            Err(err) => {
                debug!(provider = self.provider, error = %err, "dropping non UTF-8 SSE frame");
                return;
            }
        };

        if data.trim() == "[DONE]" {
            if !self.done_received {
                self.done_received = true;
                self.pending.push_back(SseFrame::Done);
            }
        } else {
            self.pending.push_back(SseFrame::Data { event, data });
        }
    }

    fn drain_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
        buffer.iter().position(|b| *b == b'\n').map(|pos| {
            let mut line: Vec<u8> = buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            line
        })
    }
}

fn strip_leading_space(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(b" ").unwrap_or(bytes)
}

impl Stream for SseDecoder {
    type Item = Result<SseFrame, RelayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(frame) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }

            if this.done_received || this.stream_closed {
                return Poll::Ready(None);
            }

            match this.body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.extend_from_slice(&bytes);
                    while let Some(line) = Self::drain_line(&mut this.buffer) {
                        if line.is_empty() {
                            this.flush_event();
                        } else {
                            this.handle_line(line);
                        }
                    }
                }
                Poll::Ready(Some(Err(err))) => {
                    this.stream_closed = true;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    this.stream_closed = true;
                    if !this.buffer.is_empty() {
                        let line = std::mem::take(&mut this.buffer);
                        this.handle_line(line);
                    }
                    this.flush_event();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
