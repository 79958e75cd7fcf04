use axum::body::{Body, HttpBody};
use axum::http::{header, response, StatusCode};
use axum::response::Response;
use axum::BoxError;
use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;

/// In-memory sink standing in for the network while one response is decided.
///
/// Owned by exactly one request. The body is captured frame by frame, read
/// back as often as needed, then finalized once: emitted as the response
/// body, or dropped when the response became a `304 Not Modified`.
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    buf: BytesMut,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Drain `body` into the buffer.
    ///
    /// On a body error the bytes read before the failure stay in the buffer
    /// and the error is returned as is.
    pub async fn capture<B>(&mut self, body: B) -> Result<(), BoxError>
    where
        B: HttpBody<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let mut body = std::pin::pin!(body);
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(Into::into)?;
            // Trailers are not replayed.
            if let Ok(data) = frame.into_data() {
                self.write(&data);
            }
        }
        Ok(())
    }

    /// Emit the buffered body under `parts`, or nothing at all for a 304.
    pub fn finalize(self, mut parts: response::Parts) -> Response {
        if parts.status == StatusCode::NOT_MODIFIED {
            parts.headers.remove(header::CONTENT_LENGTH);
            return Response::from_parts(parts, Body::empty());
        }
        Response::from_parts(parts, Body::from(self.buf.freeze()))
    }

    /// Emit what was captured before `err`, then fail the body with `err`.
    pub fn flush_with_error(self, mut parts: response::Parts, err: BoxError) -> Response {
        // The declared length no longer holds.
        parts.headers.remove(header::CONTENT_LENGTH);
        let chunks: [Result<Bytes, BoxError>; 2] = [Ok(self.buf.freeze()), Err(err)];
        Response::from_parts(parts, Body::from_stream(futures_util::stream::iter(chunks)))
    }
}
