//! Response capture: tee an upstream response to the client while buffering it.
//!
//! [`CaptureBody`] wraps the upstream body. Every data frame is handed to the
//! client unchanged and appended to a [`ResponseCapture`]. When the body ends
//! (or is dropped early) the capture is sent over a oneshot channel so the
//! recording work can run after the client already has its response.

use crate::error::{GatewayError, Result};
use bytes::{Bytes, BytesMut};
use hyper::body::{Body, Frame, SizeHint};
use hyper::header::{CONTENT_ENCODING, CONTENT_TYPE};
use hyper::{HeaderMap, Response, StatusCode};
use serde_json::Value;
use std::io::Read;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Bytes and metadata of one response as it was written to the client.
#[derive(Debug, Clone)]
pub struct ResponseCapture {
    status: StatusCode,
    headers: HeaderMap,
    buffer: BytesMut,
}

impl ResponseCapture {
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            status,
            headers,
            buffer: BytesMut::new(),
        }
    }

    pub fn write(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Raw captured bytes as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    pub fn content_type(&self) -> Option<&str> {
        header_str(&self.headers, CONTENT_TYPE)
    }

    pub fn content_encoding(&self) -> Option<&str> {
        header_str(&self.headers, CONTENT_ENCODING)
    }

    pub fn is_plain_text(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.starts_with("text/plain"))
    }

    pub fn is_json(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.starts_with("application/json"))
    }

    pub fn is_gzip(&self) -> bool {
        self.content_encoding()
            .is_some_and(|ce| ce.trim().eq_ignore_ascii_case("gzip"))
    }

    /// Reconstruct the stored body form.
    ///
    /// Empty bodies become `""`, plain text is kept verbatim, everything else
    /// is gunzipped if needed and parsed as JSON. A content type other than
    /// JSON is refused.
    pub fn body(&self) -> Result<Value> {
        if self.buffer.is_empty() {
            return Ok(Value::String(String::new()));
        }

        if self.is_plain_text() {
            return Ok(Value::String(self.text()));
        }

        let decoded;
        let bytes: &[u8] = if self.is_gzip() {
            let mut out = Vec::new();
            flate2::read::GzDecoder::new(&self.buffer[..])
                .read_to_end(&mut out)
                .map_err(GatewayError::Decompression)?;
            decoded = out;
            &decoded
        } else {
            &self.buffer
        };

        if let Some(content_type) = self.content_type() {
            if !self.is_json() {
                return Err(GatewayError::UnsupportedContentType(
                    content_type.to_string(),
                ));
            }
        }

        serde_json::from_slice(bytes).map_err(GatewayError::MalformedBody)
    }
}

fn header_str(headers: &HeaderMap, name: hyper::header::HeaderName) -> Option<&str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Outcome of a tee'd body.
#[derive(Debug)]
pub struct CapturedResponse {
    pub capture: ResponseCapture,
    /// False when the body errored or was dropped before its end.
    pub complete: bool,
}

/// Body wrapper that forwards frames unchanged and records their data.
pub struct CaptureBody<B>
where
    B: Body,
{
    inner: B,
    capture: Option<ResponseCapture>,
    done: Option<oneshot::Sender<CapturedResponse>>,
}

impl<B> CaptureBody<B>
where
    B: Body,
{
    fn finish(&mut self, complete: bool) {
        if let (Some(done), Some(capture)) = (self.done.take(), self.capture.take()) {
            // Receiver gone means nobody wants the capture anymore.
            let _ = done.send(CapturedResponse { capture, complete });
        }
    }
}

impl<B> Body for CaptureBody<B>
where
    B: Body<Data = Bytes> + Unpin,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let (Some(data), Some(capture)) = (frame.data_ref(), this.capture.as_mut()) {
                    capture.write(data);
                }
                if this.inner.is_end_stream() {
                    this.finish(true);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finish(false);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finish(true);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B> Drop for CaptureBody<B>
where
    B: Body,
{
    fn drop(&mut self) {
        // Servers may skip polling a body that is already at its end.
        let complete = self.inner.is_end_stream();
        self.finish(complete);
    }
}

/// Wrap `response` so its body is captured as it streams to the client.
pub fn capture_response<B>(
    response: Response<B>,
) -> (Response<CaptureBody<B>>, oneshot::Receiver<CapturedResponse>)
where
    B: Body<Data = Bytes> + Unpin,
{
    let (tx, rx) = oneshot::channel();
    let (parts, inner) = response.into_parts();
    let capture = ResponseCapture::new(parts.status, parts.headers.clone());
    let body = CaptureBody {
        inner,
        capture: Some(capture),
        done: Some(tx),
    };
    (Response::from_parts(parts, body), rx)
}
