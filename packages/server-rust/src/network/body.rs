//! Request body buffering and replay.
//!
//! The correlation middleware drains the inbound body before the handler runs
//! so the access log can include it. [`ReplayBody`] hands the buffered bytes
//! to the handler once and then forwards any further reads to the original
//! body, so the handler always sees the complete, unmodified payload.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;

/// Result of draining an inbound body.
#[derive(Debug)]
pub struct Drained<B> {
    /// Every data byte received.
    pub bytes: Bytes,
    /// True when the stream failed before its end (client disconnect).
    pub disconnected: bool,
    /// Body to hand downstream.
    pub replay: ReplayBody<B>,
}

/// Reads `body` to its end, or until it fails.
///
/// A failure (for example the client disconnecting mid-upload) is not an
/// error: the bytes received so far are kept and replayed.
pub async fn drain<B>(mut body: B) -> Drained<B>
where
    B: Body<Data = Bytes> + Unpin,
    B::Error: fmt::Display,
{
    let mut buffer = BytesMut::new();
    let mut trailers = None;
    let mut disconnected = false;

    while let Some(frame) = body.frame().await {
        match frame {
            Ok(frame) => match frame.into_data() {
                Ok(data) => buffer.extend_from_slice(&data),
                Err(frame) => {
                    trailers = frame.into_trailers().ok();
                    break;
                }
            },
            Err(error) => {
                tracing::debug!(error = %error, "request body ended before completion");
                disconnected = true;
                break;
            }
        }
    }

    let bytes = buffer.freeze();
    Drained {
        replay: ReplayBody {
            buffered: Some(bytes.clone()),
            trailers,
            inner: body,
        },
        bytes,
        disconnected,
    }
}

/// Body yielding previously buffered bytes once, then reading from the
/// original body.
#[derive(Debug)]
pub struct ReplayBody<B> {
    buffered: Option<Bytes>,
    trailers: Option<HeaderMap>,
    inner: B,
}

impl<B> ReplayBody<B> {
    /// Replays `buffered`, then continues with `inner`.
    pub fn new(buffered: Bytes, inner: B) -> Self {
        Self {
            buffered: Some(buffered),
            trailers: None,
            inner,
        }
    }
}

impl<B> Body for ReplayBody<B>
where
    B: Body<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if let Some(bytes) = self.buffered.take() {
            if !bytes.is_empty() {
                return Poll::Ready(Some(Ok(Frame::data(bytes))));
            }
        }
        if let Some(trailers) = self.trailers.take() {
            return Poll::Ready(Some(Ok(Frame::trailers(trailers))));
        }
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.buffered.as_ref().is_none_or(Bytes::is_empty)
            && self.trailers.is_none()
            && self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        let buffered = self.buffered.as_ref().map_or(0, |bytes| bytes.len() as u64);
        if self.inner.is_end_stream() {
            SizeHint::with_exact(buffered)
        } else {
            let inner = self.inner.size_hint();
            let mut hint = SizeHint::new();
            hint.set_lower(buffered + inner.lower());
            if let Some(upper) = inner.upper() {
                hint.set_upper(buffered + upper);
            }
            hint
        }
    }
}

/// Renders a body for the access log.
///
/// Empty bodies yield `None`. Bodies longer than `max_bytes` are cut and end
/// with `<truncated length=N bytes>`; bytes that are not UTF-8 are replaced by
/// `<non-utf8 body length=N bytes>`. `N` is always the full body length.
#[must_use]
pub fn describe_body(body: &[u8], max_bytes: usize) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    let truncated = body.len() > max_bytes;
    let head = &body[..body.len().min(max_bytes)];

    let decoded = match std::str::from_utf8(head) {
        Ok(text) => text,
        // The cut landed inside a multi-byte character; keep the complete prefix.
        Err(error) if truncated && error.error_len().is_none() => {
            std::str::from_utf8(&head[..error.valid_up_to()]).unwrap_or_default()
        }
        Err(_) => return Some(format!("<non-utf8 body length={} bytes>", body.len())),
    };

    if truncated {
        Some(format!("{decoded}<truncated length={} bytes>", body.len()))
    } else {
        Some(decoded.to_string())
    }
}
