//! Streamed responses as a lazy, finite sequence of [`Fragment`]s.
//!
//! The service answers a `stream: true` request with Server-Sent Events.
//! Each `data:` payload is a chat completion chunk whose first choice carries
//! a text delta; `data: [DONE]` ends the stream. Bytes are buffered until a
//! whole event (terminated by a blank line) is available, so UTF-8 sequences
//! split across network reads are decoded intact.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use super::error::{ChatError, ServiceError};
use super::types::{ChatCompletionChunk, Fragment};

/// A single-reader, non-restartable sequence of response fragments.
///
/// The sequence ends after `[DONE]`, when the body runs out, or right after
/// the first error it yields; an error is always the last item.
pub struct FragmentStream {
    inner: Pin<Box<dyn Stream<Item = Result<Fragment, ChatError>> + Send>>,
}

impl FragmentStream {
    /// Decodes an SSE byte stream.
    pub fn from_sse<S, E>(bytes: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let state = SseState {
            bytes: Box::pin(bytes),
            buffer: BytesMut::new(),
            finished: false,
        };
        let inner = stream::unfold(state, |mut state| async move {
            let item = state.next_fragment().await?;
            if item.is_err() {
                state.finished = true;
            }
            Some((item, state))
        });
        Self {
            inner: Box::pin(inner),
        }
    }

    /// A stream over already-known items. Anything after the first error is
    /// dropped so the terminal-error rule holds here too.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Result<Fragment, ChatError>>,
        I::IntoIter: Send + 'static,
    {
        let mut failed = false;
        let items = items.into_iter().take_while(move |item| {
            let keep = !failed;
            failed |= item.is_err();
            keep
        });
        Self {
            inner: Box::pin(stream::iter(items)),
        }
    }

    /// Drains the stream and concatenates every fragment.
    pub async fn collect_text(mut self) -> Result<String, ChatError> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?.text);
        }
        Ok(text)
    }
}

impl Stream for FragmentStream {
    type Item = Result<Fragment, ChatError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FragmentStream(..)")
    }
}

type ByteStream<E> = Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>;

struct SseState<E> {
    bytes: ByteStream<E>,
    buffer: BytesMut,
    finished: bool,
}

/// What one SSE event amounted to.
enum Event {
    Fragment(Fragment),
    /// Comments, keep-alives, role-only or empty deltas.
    Skip,
    Done,
}

impl<E: fmt::Display> SseState<E> {
    async fn next_fragment(&mut self) -> Option<Result<Fragment, ChatError>> {
        loop {
            if self.finished {
                return None;
            }

            if let Some(raw) = take_event(&mut self.buffer) {
                match self.decode(&raw) {
                    Ok(Some(fragment)) => return Some(Ok(fragment)),
                    Ok(None) => continue,
                    Err(e) => return Some(Err(e)),
                }
            }

            match self.bytes.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    return Some(Err(ServiceError::Stream {
                        reason: format!("stream read error: {e}"),
                    }
                    .into()));
                }
                None => {
                    // Body ended without `[DONE]`; flush a trailing event.
                    self.finished = true;
                    let rest = std::mem::take(&mut self.buffer);
                    if rest.iter().all(u8::is_ascii_whitespace) {
                        return None;
                    }
                    return match self.decode(&rest) {
                        Ok(Some(fragment)) => Some(Ok(fragment)),
                        Ok(None) => None,
                        Err(e) => Some(Err(e)),
                    };
                }
            }
        }
    }

    fn decode(&mut self, raw: &[u8]) -> Result<Option<Fragment>, ChatError> {
        match parse_event(raw)? {
            Event::Fragment(fragment) => Ok(Some(fragment)),
            Event::Skip => Ok(None),
            Event::Done => {
                self.finished = true;
                Ok(None)
            }
        }
    }
}

/// Splits the first complete event off `buffer`, if there is one.
fn take_event(buffer: &mut BytesMut) -> Option<BytesMut> {
    let (end, separator) = find_boundary(buffer)?;
    let event = buffer.split_to(end);
    buffer.advance(separator);
    Some(event)
}

fn find_boundary(buf: &[u8]) -> Option<(usize, usize)> {
    for i in 0..buf.len() {
        if buf[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
        if buf[i..].starts_with(b"\n\n") {
            return Some((i, 2));
        }
    }
    None
}

#[derive(Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

fn parse_event(raw: &[u8]) -> Result<Event, ChatError> {
    let text = std::str::from_utf8(raw).map_err(|e| ServiceError::Stream {
        reason: format!("event is not valid UTF-8: {e}"),
    })?;

    let mut data = String::new();
    for line in text.lines() {
        let Some(payload) = line.strip_prefix("data:") else {
            // `event:`, `id:`, `retry:` and `:` comments carry nothing we use.
            continue;
        };
        let payload = payload.strip_prefix(' ').unwrap_or(payload);
        if payload.trim() == "[DONE]" {
            return Ok(Event::Done);
        }
        if !data.is_empty() {
            data.push('\n');
        }
        data.push_str(payload);
    }

    if data.trim().is_empty() {
        return Ok(Event::Skip);
    }

    if let Ok(ProviderError { error }) = serde_json::from_str::<ProviderError>(&data) {
        let reason = match error.code {
            Some(code) => format!("provider reported an error ({code}): {}", error.message),
            None => format!("provider reported an error: {}", error.message),
        };
        return Err(ServiceError::Stream { reason }.into());
    }

    let chunk: ChatCompletionChunk =
        serde_json::from_str(&data).map_err(|e| ServiceError::Stream {
            reason: format!("failed to parse SSE chunk: {e} (data: {data})"),
        })?;

    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .unwrap_or_default();

    if text.is_empty() {
        Ok(Event::Skip)
    } else {
        Ok(Event::Fragment(Fragment { text }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"index": 0, "delta": {"content": content}}]})
        )
    }

    fn sse(parts: Vec<Vec<u8>>) -> FragmentStream {
        let items: Vec<Result<Bytes, std::io::Error>> =
            parts.into_iter().map(|p| Ok(Bytes::from(p))).collect();
        FragmentStream::from_sse(stream::iter(items))
    }

    async fn drain(mut stream: FragmentStream) -> Vec<Result<Fragment, ChatError>> {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn fragments_concatenate_in_order() {
        let body = format!(
            "{}{}{}data: [DONE]\n\n",
            chunk("The capital"),
            chunk(" of France"),
            chunk(" is Paris.")
        );
        let text = sse(vec![body.into_bytes()]).collect_text().await.unwrap();
        assert_eq!(text, "The capital of France is Paris.");
    }

    #[tokio::test]
    async fn events_split_across_reads() {
        let body = format!("{}{}data: [DONE]\n\n", chunk("héllo"), chunk(" wörld")).into_bytes();
        // Split in the middle of the two-byte 'é'.
        let cut = body.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let parts = vec![body[..cut].to_vec(), body[cut..].to_vec()];
        let text = sse(parts).collect_text().await.unwrap();
        assert_eq!(text, "héllo wörld");
    }

    #[tokio::test]
    async fn crlf_separators_and_comments() {
        let body = ": keep-alive\r\n\r\nevent: message\r\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\r\n\r\ndata: [DONE]\r\n\r\n";
        let items = drain(sse(vec![body.as_bytes().to_vec()])).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap().text, "ok");
    }

    #[tokio::test]
    async fn role_only_and_empty_deltas_are_skipped() {
        let body = format!(
            "data: {{\"choices\":[{{\"delta\":{{\"role\":\"assistant\"}}}}]}}\n\n{}{}data: [DONE]\n\n",
            chunk(""),
            chunk("x")
        );
        let items = drain(sse(vec![body.into_bytes()])).await;
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn nothing_after_done_is_read() {
        let body = format!("{}data: [DONE]\n\n{}", chunk("a"), chunk("ignored"));
        let text = sse(vec![body.into_bytes()]).collect_text().await.unwrap();
        assert_eq!(text, "a");
    }

    #[tokio::test]
    async fn body_ending_without_done_flushes_last_event() {
        let body = format!("{}data: {{\"choices\":[{{\"delta\":{{\"content\":\"b\"}}}}]}}", chunk("a"));
        let text = sse(vec![body.into_bytes()]).collect_text().await.unwrap();
        assert_eq!(text, "ab");
    }

    #[tokio::test]
    async fn malformed_chunk_is_terminal() {
        let body = format!("{}data: {{not json\n\n{}data: [DONE]\n\n", chunk("a"), chunk("b"));
        let items = drain(sse(vec![body.into_bytes()])).await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(
            items[1],
            Err(ChatError::Service(ServiceError::Stream { .. }))
        ));
    }

    #[tokio::test]
    async fn provider_error_event_surfaces_message() {
        let body = "data: {\"error\":{\"code\":\"content_filter\",\"message\":\"blocked\"}}\n\n";
        let err = sse(vec![body.as_bytes().to_vec()])
            .collect_text()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("blocked"));
    }

    #[tokio::test]
    async fn transport_error_is_terminal() {
        let items: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from(chunk("a"))),
            Err(std::io::Error::other("reset by peer")),
            Ok(Bytes::from(chunk("never"))),
        ];
        let out = drain(FragmentStream::from_sse(stream::iter(items))).await;
        assert_eq!(out.len(), 2);
        assert!(out[1].as_ref().unwrap_err().to_string().contains("reset by peer"));
    }

    #[tokio::test]
    async fn from_items_stops_after_first_error() {
        let stream = FragmentStream::from_items(vec![
            Ok(Fragment::new("a")),
            Err(ChatError::invalid_request("x")),
            Ok(Fragment::new("b")),
        ]);
        let out = drain(stream).await;
        assert_eq!(out.len(), 2);
        assert!(out[1].is_err());
    }
}
