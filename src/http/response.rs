//! HTTP/1.1 response builder.
//!
//! Responses carry either a fully buffered body, written with
//! `Content-Length`, or a stream of byte chunks written with
//! `Transfer-Encoding: chunked` so that the UI can render model output while
//! it is still being generated.

use std::fmt;
use std::pin::Pin;

use bytes::{BufMut, Bytes, BytesMut};
use futures::Stream;
use serde::Serialize;

use super::{Headers, StatusCode};

/// A boxed stream of body chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

/// The payload of a [`Response`].
pub enum Body {
    Full(Vec<u8>),
    Stream(BodyStream),
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// An HTTP/1.1 response, ready to be serialized and sent.
///
/// # Examples
///
/// ```
/// use deepseek_chat::http::{Response, StatusCode};
///
/// let response = Response::json(StatusCode::Created, &serde_json::json!({"id": "abc"}));
/// let (head, stream) = response.into_wire();
/// let text = std::str::from_utf8(&head).unwrap();
///
/// assert!(stream.is_none());
/// assert!(text.starts_with("HTTP/1.1 201 Created\r\n"));
/// assert!(text.contains("Content-Type: application/json\r\n"));
/// assert!(text.ends_with(r#"{"id":"abc"}"#));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Body,
    keep_alive: bool,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Body::Full(Vec::new()),
            keep_alive: true,
        }
    }

    /// Serializes `value` as the JSON body.
    ///
    /// A value that fails to serialize turns into a bare `500`.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .header("Content-Type", "application/json")
                .body_bytes(body),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize response body");
                Self::new(StatusCode::InternalServerError)
            }
        }
    }

    /// A streamed response; each item is written as one chunk as soon as it
    /// is produced.
    pub fn stream<S>(status: StatusCode, stream: S) -> Self
    where
        S: Stream<Item = Bytes> + Send + 'static,
    {
        Self {
            body: Body::Stream(Box::pin(stream)),
            ..Self::new(status)
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a header in-place, for middleware decorating a downstream response.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(self, body: impl Into<String>) -> Self {
        self.body_bytes(body.into().into_bytes())
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Body::Full(body.into());
        self
    }

    /// Controls whether `Connection: keep-alive` or `Connection: close` is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns `true` if the body is streamed.
    pub fn is_streaming(&self) -> bool {
        matches!(self.body, Body::Stream(_))
    }

    /// Serializes the response for the wire.
    ///
    /// For a full body the returned buffer holds the status line, headers and
    /// body, with `Content-Length` set. For a streamed body it holds only the
    /// head, with `Transfer-Encoding: chunked`; the caller writes each item of
    /// the returned stream through [`encode_chunk`] and finishes with
    /// [`LAST_CHUNK`].
    ///
    /// A `Content-Type` of `text/plain; charset=utf-8` is added when a body
    /// is present and none was set.
    pub fn into_wire(mut self) -> (BytesMut, Option<BodyStream>) {
        let has_body = match &self.body {
            Body::Full(bytes) => !bytes.is_empty(),
            Body::Stream(_) => true,
        };
        if has_body && !self.headers.contains("content-type") {
            self.headers
                .insert("Content-Type", "text/plain; charset=utf-8");
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        self.headers.set("Connection", connection);

        let mut buf = BytesMut::with_capacity(128 + self.headers.len() * 64);
        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );
        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        match self.body {
            Body::Full(body) => {
                buf.put(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
                buf.put(body.as_slice());
                (buf, None)
            }
            Body::Stream(stream) => {
                buf.put(&b"Transfer-Encoding: chunked\r\n\r\n"[..]);
                (buf, Some(stream))
            }
        }
    }
}

/// Terminator of a chunked body.
pub const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Frames `data` as one chunk of a chunked body.
///
/// Empty input yields an empty buffer, since a zero-length chunk would end
/// the body early.
pub fn encode_chunk(data: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(data.len() + 12);
    if data.is_empty() {
        return buf;
    }
    buf.put(format!("{:x}\r\n", data.len()).as_bytes());
    buf.put(data);
    buf.put(&b"\r\n"[..]);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn head_text(response: Response) -> String {
        let (head, _) = response.into_wire();
        String::from_utf8(head.to_vec()).unwrap()
    }

    #[test]
    fn full_body_has_content_length() {
        let s = head_text(Response::new(StatusCode::Ok).body("Hello"));
        assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(s.contains("Content-Type: text/plain; charset=utf-8\r\n"));
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("\r\n\r\nHello"));
    }

    #[test]
    fn empty_body_gets_no_content_type() {
        let s = head_text(Response::new(StatusCode::NoContent));
        assert!(!s.contains("Content-Type"));
        assert!(s.contains("Content-Length: 0\r\n"));
    }

    #[test]
    fn connection_close() {
        let s = head_text(Response::new(StatusCode::Ok).keep_alive(false));
        assert!(s.contains("Connection: close\r\n"));
        assert!(!s.contains("keep-alive"));
    }

    #[tokio::test]
    async fn streamed_body_is_chunked() {
        let chunks = futures::stream::iter(vec![Bytes::from("data: a\n\n"), Bytes::from("x")]);
        let response = Response::stream(StatusCode::Ok, chunks)
            .header("Content-Type", "text/event-stream");
        assert!(response.is_streaming());

        let (head, stream) = response.into_wire();
        let head = String::from_utf8(head.to_vec()).unwrap();
        assert!(head.contains("Transfer-Encoding: chunked\r\n"));
        assert!(head.contains("Content-Type: text/event-stream\r\n"));
        assert!(!head.contains("Content-Length"));
        assert!(head.ends_with("\r\n\r\n"));

        let items: Vec<Bytes> = stream.unwrap().collect().await;
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn chunk_framing_uses_hex_length() {
        let chunk = encode_chunk(&[b'a'; 26]);
        assert!(chunk.starts_with(b"1a\r\n"));
        assert!(chunk.ends_with(b"\r\n"));
        assert!(encode_chunk(b"").is_empty());
    }
}
