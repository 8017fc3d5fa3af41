//! Incremental decoding of `streamGenerateContent` bodies.
//!
//! The endpoint answers with one JSON array, `[{..}, {..}, ..]`, whose
//! elements trickle in over the lifetime of the request. Each element is
//! decoded as soon as its closing brace arrives.

use crate::codec;
use crate::error::GeminiError;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, GeminiError>> + Send>>;

/// Splits a top-level JSON array of objects into complete object slices.
///
/// Scanning works on raw bytes: every structural character is ASCII and can
/// never occur inside a multi-byte UTF-8 sequence, so a chunk boundary in the
/// middle of a character needs no special treatment. Braces inside string
/// literals are skipped by tracking quotes and backslash escapes.
#[derive(Debug, Default)]
pub struct JsonArrayParser {
    current: Vec<u8>,
    depth: usize,
    in_string: bool,
    escape: bool,
}

impl JsonArrayParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every object completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for &byte in chunk {
            if self.depth == 0 {
                // Between elements: `[`, `]`, `,` and whitespace.
                if byte == b'{' {
                    self.depth = 1;
                    self.current.push(byte);
                }
                continue;
            }

            self.current.push(byte);
            if self.in_string {
                if self.escape {
                    self.escape = false;
                } else if byte == b'\\' {
                    self.escape = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' => self.depth += 1,
                b'}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        out.push(std::mem::take(&mut self.current));
                    }
                }
                _ => {}
            }
        }
        out
    }

    /// Feeds one chunk and decodes each completed object on its own, so a
    /// malformed element does not poison its neighbours. An element holding
    /// an API error envelope decodes to `RequestFailed`.
    pub fn decode<T: DeserializeOwned>(&mut self, chunk: &[u8]) -> Vec<Result<T, GeminiError>> {
        self.push(chunk)
            .into_iter()
            .map(|object| {
                trace!("Decoding streamed object ({} bytes)", object.len());
                codec::from_response(&object)
            })
            .collect()
    }

    /// True when no object is partially buffered.
    pub fn is_idle(&self) -> bool {
        self.depth == 0
    }
}

struct DecodeState<T> {
    body: Option<ByteStream>,
    parser: JsonArrayParser,
    pending: VecDeque<Result<T, GeminiError>>,
    cancel: CancellationToken,
}

/// Turns a response body into a stream of decoded array elements.
///
/// Items come out in arrival order. A malformed element yields one `Err` and
/// decoding carries on with the next element; transport errors end the stream.
/// Once `cancel` fires the body is dropped, a single `Canceled` error is
/// yielded and nothing else follows.
pub fn decode_json_array<T>(
    body: ByteStream,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<T, GeminiError>> + Send + 'static
where
    T: DeserializeOwned + Send + 'static,
{
    let state = DecodeState {
        body: Some(body),
        parser: JsonArrayParser::new(),
        pending: VecDeque::new(),
        cancel,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if state.cancel.is_cancelled() {
                if state.body.is_none() && state.pending.is_empty() {
                    return None;
                }
                info!("Stream canceled; releasing response body.");
                state.body = None;
                state.pending.clear();
                return Some((Err(GeminiError::Canceled), state));
            }

            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }

            // `None` here means the token fired while waiting on the body.
            let next = {
                let body = state.body.as_mut()?;
                tokio::select! {
                    biased;
                    _ = state.cancel.cancelled() => None,
                    chunk = body.next() => Some(chunk),
                }
            };

            match next {
                None => continue,
                Some(Some(Ok(chunk))) => {
                    trace!("Received stream chunk ({} bytes)", chunk.len());
                    let decoded = state.parser.decode(&chunk);
                    state.pending.extend(decoded);
                }
                Some(Some(Err(e))) => {
                    state.body = None;
                    return Some((Err(e), state));
                }
                Some(None) => {
                    state.body = None;
                    if !state.parser.is_idle() {
                        return Some((
                            Err(GeminiError::DeserializationFailed(
                                "Stream ended in the middle of an object".to_string(),
                            )),
                            state,
                        ));
                    }
                    debug!("Response stream completed.");
                    return None;
                }
            }
        }
    })
}
