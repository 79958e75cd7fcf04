//! ETag / `304 Not Modified` support for axum, with optional server-side
//! caching of response bodies.
//!
//! Two tower layers cooperate:
//!
//! - [`EtagLayer`] wraps the whole router. It buffers successful GET
//!   responses, fingerprints those that do not carry an `ETag` yet and turns
//!   them into an empty 304 when `If-None-Match` already names them.
//! - [`CacheFilterLayer`] is attached to individual routes together with a
//!   [`CachePolicy`]. It serves hits from a [`CacheBackend`] without calling
//!   the handler and stores fresh results in the background.
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use etag_layer::{Backends, CacheFilterLayer, CachePolicy, EtagLayer, StoreWriter};
//! use etag_store::LocalStore;
//! use std::sync::Arc;
//!
//! let backends = Backends::new().with_local(Arc::new(LocalStore::default()));
//! let writer = StoreWriter::new();
//! let app: Router = Router::new()
//!     .route(
//!         "/items",
//!         get(|| async { "[]" }).layer(CacheFilterLayer::new(CachePolicy::local(), &backends, writer)),
//!     )
//!     .layer(EtagLayer::new());
//! ```
//!
//! [`CacheBackend`]: etag_store::CacheBackend

pub mod backends;
pub mod buffer;
pub mod config;
pub mod demo;
pub mod etag;
pub mod filter;
pub mod fingerprint;
pub mod headers;
pub mod key;
pub mod metrics;
pub mod payload;
pub mod policy;
pub mod writer;

pub use backends::Backends;
pub use etag::EtagLayer;
pub use filter::CacheFilterLayer;
pub use fingerprint::fingerprint;
pub use key::CacheKey;
pub use payload::{CacheableJson, ResultPayload};
pub use policy::{CacheLocation, CachePolicy, CacheType};
pub use writer::StoreWriter;
