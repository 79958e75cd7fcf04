//! Cache backends for the ETag layer.
//!
//! Both backends speak the same [`CacheBackend`] contract: byte-string values
//! under string keys, each with its own expiry.
//!
//! - [`LocalStore`] keeps entries in process memory: no network hop, nothing
//!   shared between nodes, lost on restart.
//! - [`SharedStore`] keeps entries in a Redis-compatible server reached over
//!   RESP2, so every node sees the same entries.
//!
//! [`resp`] also contains a RESP2 server, so one node's [`LocalStore`] can act
//! as the shared store for the others.

pub mod local;
pub mod resp;
pub mod shared;
pub mod traits;

pub use local::LocalStore;
pub use shared::SharedStore;
pub use traits::{BackendError, CacheBackend, StoreStats, DEFAULT_TTL, MAX_TTL};
