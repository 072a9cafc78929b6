//! Streaming reply decoding.
//!
//! [`EventStream`] drives the [`frame`] parser and the [`event`] interpreter
//! over any byte stream and yields [`StreamEvent`]s:
//! - `[DONE]` ends the stream immediately.
//! - an `Error` event is yielded once, then the stream ends.
//! - a transport error is yielded once, then the stream ends.
//! - end of input ends the stream; an unterminated last line is dropped.

pub mod event;
pub mod frame;

pub use event::{StreamEvent, interpret};
pub use frame::{Frame, FrameParser, LineBuffer};

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tracing::debug;

use crate::error::{ChatError, ChatResult};

/// Boxed byte stream, as returned by `reqwest::Response::bytes_stream`.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Boxed event stream handed to callers.
pub type BoxEventStream = Pin<Box<dyn Stream<Item = ChatResult<StreamEvent>> + Send>>;

/// Adapter from raw chunks to stream events.
#[derive(Debug)]
pub struct EventStream<S> {
    inner: S,
    parser: FrameParser,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

impl<S> EventStream<S> {
    /// Wrap a byte stream.
    pub const fn new(inner: S) -> Self {
        Self {
            inner,
            parser: FrameParser::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn handle_chunk(&mut self, chunk: &[u8]) {
        for frame in self.parser.push(chunk) {
            match frame {
                Frame::Done => {
                    self.finished = true;
                    return;
                }
                Frame::Payload(payload) => {
                    let Some(event) = interpret(&payload) else {
                        debug!("Ignoring payload: {payload}");
                        continue;
                    };
                    let terminal = event.is_terminal();
                    self.pending.push_back(event);
                    if terminal {
                        self.finished = true;
                        return;
                    }
                }
            }
        }
    }
}

impl EventStream<ByteStream> {
    /// Decode the body of a streaming HTTP response.
    #[must_use]
    pub fn from_response(response: reqwest::Response) -> Self {
        Self::new(Box::pin(response.bytes_stream()))
    }
}

impl<S, E> Stream for EventStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<ChatError>,
{
    type Item = ChatResult<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => self.handle_chunk(&chunk),
                Poll::Ready(Some(Err(e))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Ready(None) => {
                    self.finished = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::stream;

    fn chunks(parts: &[&str]) -> Vec<Result<Bytes, ChatError>> {
        parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect()
    }

    async fn collect(parts: Vec<Result<Bytes, ChatError>>) -> Vec<ChatResult<StreamEvent>> {
        EventStream::new(stream::iter(parts)).collect().await
    }

    #[tokio::test]
    async fn test_full_exchange() {
        let events = collect(chunks(&[
            "data: {\"type\":\"init\",\"conversation_id\":\"c1\"}\n\ndata: {\"type\":\"del",
            "ta\",\"content\":\"Hel\"}\n\ndata: {\"type\":\"delta\",\"content\":\"lo\"}\n\n",
            "data: {\"type\":\"completed\"}\n\ndata: {\"type\":\"done\",\"conversation_id\":\"c1\"}\n\n",
            "data: [DONE]\n\n",
        ]))
        .await;

        let events: Vec<StreamEvent> = events.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            events,
            vec![
                StreamEvent::Init {
                    conversation_id: "c1".to_string()
                },
                StreamEvent::Delta {
                    content: "Hel".to_string()
                },
                StreamEvent::Delta {
                    content: "lo".to_string()
                },
                StreamEvent::Done {
                    conversation_id: Some("c1".to_string()),
                    usage: None
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_error_event_ends_stream() {
        let events = collect(chunks(&[
            "data: {\"type\":\"delta\",\"content\":\"a\"}\ndata: {\"error\":\"timeout\"}\n",
            "data: {\"type\":\"delta\",\"content\":\"never\"}\n",
        ]))
        .await;

        assert_eq!(events.len(), 2);
        let errors = events
            .iter()
            .filter(|e| matches!(e, Ok(StreamEvent::Error { .. })))
            .count();
        assert_eq!(errors, 1);
        assert!(matches!(events.last(), Some(Ok(StreamEvent::Error { message })) if message == "timeout"));
    }

    #[tokio::test]
    async fn test_done_sentinel_ignores_later_chunks() {
        let events = collect(chunks(&[
            "data: [DONE]\ndata: {\"type\":\"delta\",\"content\":\"x\"}\n",
            "data: {\"type\":\"delta\",\"content\":\"y\"}\n",
        ]))
        .await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_is_yielded_once() {
        let mut parts = chunks(&["data: {\"type\":\"delta\",\"content\":\"a\"}\n"]);
        parts.push(Err(ChatError::HttpStatus {
            status: 500,
            body: String::new(),
        }));
        parts.extend(chunks(&["data: {\"type\":\"delta\",\"content\":\"b\"}\n"]));

        let events = collect(parts).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Err(ChatError::HttpStatus { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_end_of_input_drops_partial_line() {
        let events = collect(chunks(&[
            "data: {\"type\":\"delta\",\"content\":\"kept\"}\n",
            "data: {\"type\":\"delta\",\"content\":\"lost\"}",
        ]))
        .await;
        assert_eq!(events.len(), 1);
    }
}
