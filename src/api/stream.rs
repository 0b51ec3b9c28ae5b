use super::logging::emit_sse_parse_error;
use super::{ByteStream, FragmentStream, ModelError};
use crate::types::{ApiErrorBody, ApiErrorEnvelope, StreamPayload};
use futures::{stream, StreamExt};

#[derive(Debug, Clone)]
pub enum StreamEvent {
    Fragment(String),
    Finished { reason: String },
    Failed(ApiErrorBody),
    Done,
}

impl StreamEvent {
    fn into_fragment(self) -> Option<Result<String, ModelError>> {
        match self {
            StreamEvent::Fragment(text) => Some(Ok(text)),
            StreamEvent::Failed(error) if error.is_context_overflow() => {
                Some(Err(ModelError::BudgetExceeded(error.message)))
            }
            StreamEvent::Failed(error) => Some(Err(ModelError::Protocol(error.message))),
            StreamEvent::Finished { .. } | StreamEvent::Done => None,
        }
    }
}

/// Incremental decoder for the `text/event-stream` body of a chat completion.
/// Bytes are buffered until a blank line closes an event, so UTF-8 sequences
/// split across network chunks are decoded intact.
#[derive(Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        let mut start = 0;

        while let Some((event_end, next_start)) = find_event_boundary(&self.buffer[start..]) {
            let event_text = String::from_utf8_lossy(&self.buffer[start..start + event_end]);
            parse_event(&event_text, &mut events);
            start += next_start;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }

        events
    }

    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }
}

/// Returns the end of the first complete event and the offset just past its
/// terminating blank line.
fn find_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n");
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) if b < a => Some((b, b + 4)),
        (Some(a), _) => Some((a, a + 2)),
        (None, Some(b)) => Some((b, b + 4)),
        (None, None) => None,
    }
}

fn parse_event(event_text: &str, events: &mut Vec<StreamEvent>) {
    let mut data_lines = Vec::new();
    let mut error_line = None;

    for line in event_text.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("error:") {
            error_line = Some(rest.trim().to_string());
        }
    }

    if let Some(raw) = error_line {
        match serde_json::from_str::<ApiErrorEnvelope>(&raw) {
            Ok(envelope) => events.push(StreamEvent::Failed(envelope.error)),
            Err(_) => match serde_json::from_str::<ApiErrorBody>(&raw) {
                Ok(body) => events.push(StreamEvent::Failed(body)),
                Err(err) => emit_sse_parse_error("error", &raw, &err),
            },
        }
        return;
    }

    if data_lines.is_empty() {
        return;
    }

    let data = data_lines.join("\n");
    if data.trim() == "[DONE]" {
        events.push(StreamEvent::Done);
        return;
    }

    match serde_json::from_str::<StreamPayload>(&data) {
        Ok(StreamPayload::Error { error }) => events.push(StreamEvent::Failed(error)),
        Ok(StreamPayload::Chunk(chunk)) => {
            let Some(choice) = chunk.choices.into_iter().next() else {
                return;
            };
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                events.push(StreamEvent::Fragment(content));
            }
            if let Some(reason) = choice.finish_reason {
                events.push(StreamEvent::Finished { reason });
            }
        }
        Err(err) => emit_sse_parse_error("data", &data, &err),
    }
}

/// Adapts a raw response body into the ordered fragment sequence the turn
/// loop consumes.
pub fn fragment_stream(bytes: ByteStream) -> FragmentStream {
    let mut parser = StreamParser::new();
    let fragments = bytes
        .map(move |chunk| -> Vec<Result<String, ModelError>> {
            match chunk {
                Ok(chunk) => parser
                    .process(&chunk)
                    .into_iter()
                    .filter_map(StreamEvent::into_fragment)
                    .collect(),
                Err(error) => vec![Err(error)],
            }
        })
        .flat_map(stream::iter);
    Box::pin(fragments)
}
