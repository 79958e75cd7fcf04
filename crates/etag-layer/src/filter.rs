//! Per-route cache policy filter.
//!
//! A [`CacheFilterLayer`] is attached to one route (or method router) with
//! the [`CachePolicy`] of that endpoint. Around each GET it:
//!
//! 1. looks the entry up before the handler runs and, on a hit, answers from
//!    the stored body (or with `304 Not Modified`) without calling it;
//! 2. lets the handler run on a miss;
//! 3. fingerprints the result, sets `ETag` / `Cache-Control` and stores the
//!    fingerprint in the background;
//! 4. once the body is fully produced, stores body and content type in the
//!    background and downgrades to 304 if the client's copy is current.
//!
//! Every other method passes straight through. Backend trouble never fails a
//! request: an unreachable or unconfigured backend only means no caching.

use crate::backends::Backends;
use crate::buffer::ResponseBuffer;
use crate::fingerprint::fingerprint;
use crate::headers::{apply_client_headers, is_cacheable, RequestFacts, CACHING_MECHANISM};
use crate::key::CacheKey;
use crate::metrics::{self, LookupOutcome};
use crate::payload::ResultPayload;
use crate::policy::CachePolicy;
use crate::writer::StoreWriter;
use axum::body::{Body, HttpBody};
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::Response;
use axum::BoxError;
use bytes::Bytes;
use etag_store::{BackendError, CacheBackend};
use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

struct FilterState {
    policy: CachePolicy,
    backend: Option<Arc<dyn CacheBackend>>,
    writer: StoreWriter,
}

/// A complete entry as read back from a backend.
struct CachedEntry {
    body: Bytes,
    content_type: HeaderValue,
    fingerprint: String,
}

#[derive(Clone)]
pub struct CacheFilterLayer {
    state: Arc<FilterState>,
}

impl CacheFilterLayer {
    /// Resolve the policy's backend once; a missing one disables server-side
    /// caching for this route.
    pub fn new(policy: CachePolicy, backends: &Backends, writer: StoreWriter) -> Self {
        let backend = backends.resolve(policy.cache_type);
        if backend.is_none() && policy.uses_server() {
            tracing::warn!(
                cache_type = policy.cache_type.as_str(),
                "cache backend not available, route runs without server-side caching"
            );
        }
        Self {
            state: Arc::new(FilterState {
                policy,
                backend,
                writer,
            }),
        }
    }
}

impl<S> Layer<S> for CacheFilterLayer {
    type Service = CacheFilter<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CacheFilter {
            inner,
            state: Arc::clone(&self.state),
        }
    }
}

#[derive(Clone)]
pub struct CacheFilter<S> {
    inner: S,
    state: Arc<FilterState>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CacheFilter<S>
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
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let state = Arc::clone(&self.state);

        if req.method() != Method::GET {
            return Box::pin(async move {
                let response = inner.call(req).await?;
                Ok(response.map(Body::new))
            });
        }

        let (parts, body) = req.into_parts();
        let facts = RequestFacts::from_parts(&parts);
        let key = CacheKey::from_uri(&parts.uri);
        let req = Request::from_parts(parts, body);

        Box::pin(async move {
            if let Some(backend) = state.server_backend() {
                if let Some(entry) = lookup(backend.as_ref(), &key).await {
                    return Ok(state.serve_hit(backend.name(), &facts, entry));
                }
            }

            let response = inner.call(req).await?;
            Ok(state.complete(&key, &facts, response).await)
        })
    }
}

/// Fetch all three parts of an entry. Anything short of a complete entry is
/// a miss; backend errors count as misses too.
async fn lookup(backend: &dyn CacheBackend, key: &CacheKey) -> Option<CachedEntry> {
    let content_type_key = key.content_type();
    let fingerprint_key = key.fingerprint();
    let (body, content_type, fingerprint) = tokio::join!(
        backend.get(key.body()),
        backend.get(&content_type_key),
        backend.get(&fingerprint_key),
    );

    let entry = match (body, content_type, fingerprint) {
        (Ok(body), Ok(content_type), Ok(fingerprint)) => complete_entry(body, content_type, fingerprint),
        (body, content_type, fingerprint) => {
            let err = [body.err(), content_type.err(), fingerprint.err()]
                .into_iter()
                .flatten()
                .next();
            log_lookup_error(backend.name(), key, err);
            metrics::record_lookup(backend.name(), LookupOutcome::Error);
            return None;
        }
    };

    match &entry {
        Some(_) => {
            tracing::debug!(backend = backend.name(), key = %key, "cache hit");
            metrics::record_lookup(backend.name(), LookupOutcome::Hit);
        }
        None => {
            tracing::debug!(backend = backend.name(), key = %key, "cache miss");
            metrics::record_lookup(backend.name(), LookupOutcome::Miss);
        }
    }
    entry
}

fn complete_entry(
    body: Option<Bytes>,
    content_type: Option<Bytes>,
    fingerprint: Option<Bytes>,
) -> Option<CachedEntry> {
    let content_type = HeaderValue::from_maybe_shared(content_type?).ok()?;
    let fingerprint = String::from_utf8(fingerprint?.to_vec()).ok()?;
    if content_type.is_empty() || fingerprint.is_empty() {
        return None;
    }
    Some(CachedEntry {
        body: body?,
        content_type,
        fingerprint,
    })
}

fn log_lookup_error(backend: &'static str, key: &CacheKey, err: Option<BackendError>) {
    match err {
        Some(e) => tracing::warn!(backend, key = %key, error = %e, "cache lookup failed, treating as miss"),
        None => tracing::warn!(backend, key = %key, "cache lookup failed, treating as miss"),
    }
}

impl FilterState {
    /// The backend used for server-side lookups and stores, if any.
    fn server_backend(&self) -> Option<Arc<dyn CacheBackend>> {
        if self.policy.uses_server() {
            self.backend.clone()
        } else {
            None
        }
    }

    fn serve_hit(&self, backend: &'static str, facts: &RequestFacts, entry: CachedEntry) -> Response {
        let mut headers = HeaderMap::new();
        apply_client_headers(&mut headers, &entry.fingerprint, &self.policy);
        headers.insert(CACHING_MECHANISM, HeaderValue::from_static(backend));

        let (status, body) = if facts.client_has(&entry.fingerprint) {
            metrics::record_not_modified("precheck");
            (StatusCode::NOT_MODIFIED, Body::empty())
        } else {
            headers.insert(header::CONTENT_TYPE, entry.content_type);
            (StatusCode::OK, Body::from(entry.body))
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }

    /// Steps 3 and 4 for a response the handler actually produced.
    async fn complete<B>(&self, key: &CacheKey, facts: &RequestFacts, response: Response<B>) -> Response
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (mut parts, body) = response.into_parts();
        if !is_cacheable(&facts.method, parts.status) {
            return Response::from_parts(parts, Body::new(body));
        }

        // With the handler's logical result at hand the fingerprint is known
        // before the body is rendered.
        let early = parts
            .extensions
            .get::<ResultPayload>()
            .map(|payload| fingerprint(&facts.url, payload.as_bytes()));
        if let Some(fp) = &early {
            self.publish_fingerprint(key, &mut parts.headers, fp);
        }

        let mut buffer = ResponseBuffer::new();
        if let Err(err) = buffer.capture(body).await {
            tracing::debug!(key = %key, error = %err, "handler body failed, nothing cached");
            return buffer.flush_with_error(parts, err);
        }

        let fp = match early {
            Some(fp) => fp,
            None => {
                let fp = fingerprint(&facts.url, buffer.as_bytes());
                self.publish_fingerprint(key, &mut parts.headers, &fp);
                fp
            }
        };

        if let Some(backend) = self.server_backend() {
            match parts.headers.get(header::CONTENT_TYPE) {
                Some(content_type) if !content_type.is_empty() => {
                    let entries = vec![
                        (key.body().to_owned(), Bytes::copy_from_slice(buffer.as_bytes())),
                        (
                            key.content_type(),
                            Bytes::copy_from_slice(content_type.as_bytes()),
                        ),
                    ];
                    self.writer.store(backend, entries, self.policy.server_ttl());
                }
                _ => tracing::debug!(key = %key, "response has no content type, body not cached"),
            }
        }

        if facts.client_has(&fp) {
            metrics::record_not_modified("filter");
            parts.status = StatusCode::NOT_MODIFIED;
        }

        buffer.finalize(parts)
    }

    /// Put `fp` on the response and, for server-side policies, store it.
    fn publish_fingerprint(&self, key: &CacheKey, headers: &mut HeaderMap, fp: &str) {
        apply_client_headers(headers, fp, &self.policy);
        if let Some(backend) = self.server_backend() {
            self.writer.store(
                backend,
                vec![(key.fingerprint(), Bytes::copy_from_slice(fp.as_bytes()))],
                self.policy.server_ttl(),
            );
        }
    }
}
