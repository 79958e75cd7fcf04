use crate::buffer::ResponseBuffer;
use crate::fingerprint::fingerprint;
use crate::headers::{is_cacheable, RequestFacts};
use crate::metrics;
use axum::body::{Body, HttpBody};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::Response;
use axum::BoxError;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Response interceptor: buffers GET response bodies so they can be
/// fingerprinted and, when the client already holds them, withheld.
///
/// Wrap the whole router with it. For every successful GET that does not
/// carry an `ETag` yet, it computes one from the canonical URL and the body
/// and answers `304 Not Modified` with an empty body when `If-None-Match`
/// matches. Responses that already carry an `ETag` (those produced by a
/// [`CacheFilterLayer`](crate::filter::CacheFilterLayer)) are only
/// finalized: a 304 leaves with no body, anything else is copied through.
///
/// Errors from the inner service pass through untouched. If the body fails
/// part-way, the bytes produced so far are sent and the body then fails with
/// the original error.
#[derive(Debug, Clone, Copy, Default)]
pub struct EtagLayer;

impl EtagLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for EtagLayer {
    type Service = EtagService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        EtagService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct EtagService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for EtagService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: HttpBody<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // Keep the instance that was driven to readiness for this call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let (parts, body) = req.into_parts();
        let facts = RequestFacts::from_parts(&parts);
        let req = Request::from_parts(parts, body);

        Box::pin(async move {
            let response = inner.call(req).await?;
            Ok(intercept(&facts, response).await)
        })
    }
}

async fn intercept<B>(facts: &RequestFacts, response: Response<B>) -> Response
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let (mut parts, body) = response.into_parts();

    if facts.method != Method::GET || parts.status == StatusCode::NO_CONTENT {
        return Response::from_parts(parts, Body::new(body));
    }

    let mut buffer = ResponseBuffer::new();
    if let Err(err) = buffer.capture(body).await {
        tracing::debug!(url = %facts.url, error = %err, "response body failed, flushing partial output");
        return buffer.flush_with_error(parts, err);
    }

    if is_cacheable(&facts.method, parts.status) && !parts.headers.contains_key(header::ETAG) {
        let etag = fingerprint(&facts.url, buffer.as_bytes());
        if let Ok(value) = HeaderValue::from_str(&etag) {
            parts.headers.insert(header::ETAG, value);
        }
        if facts.client_has(&etag) {
            tracing::debug!(url = %facts.url, "client copy is current, answering 304");
            metrics::record_not_modified("interceptor");
            parts.status = StatusCode::NOT_MODIFIED;
        }
    }

    buffer.finalize(parts)
}
