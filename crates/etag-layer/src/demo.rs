//! Sample application: one endpoint per caching marker.

use crate::backends::Backends;
use crate::config::PolicyConfig;
use crate::filter::CacheFilterLayer;
use crate::payload::CacheableJson;
use crate::policy::CachePolicy;
use crate::writer::StoreWriter;
use axum::extract::Path;
use axum::routing::get;
use axum::Router;
use rand::Rng;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Serialize)]
pub struct Item {
    pub id: u64,
    pub name: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct Profile {
    pub user: &'static str,
    pub theme: &'static str,
}

/// Slow enough that skipping the handler is visible.
async fn simulate_work() {
    let delay = rand::thread_rng().gen_range(5..=20);
    tokio::time::sleep(Duration::from_millis(delay)).await;
}

async fn get_item(Path(id): Path<u64>) -> CacheableJson<Item> {
    simulate_work().await;
    CacheableJson(Item {
        id,
        name: format!("Item {id}"),
        data: "x".repeat(256),
    })
}

async fn get_catalog() -> CacheableJson<Vec<Item>> {
    simulate_work().await;
    CacheableJson(
        (1..=10)
            .map(|id| Item {
                id,
                name: format!("Item {id}"),
                data: String::new(),
            })
            .collect(),
    )
}

async fn get_profile() -> CacheableJson<Profile> {
    CacheableJson(Profile {
        user: "demo",
        theme: "dark",
    })
}

async fn health() -> &'static str {
    "ok"
}

/// Routes of the sample app, each GET endpoint wrapped in its cache filter.
///
/// - `/api/items/{id}`: shared backend
/// - `/api/catalog`: local backend
/// - `/api/profile`: client-side only
pub fn router(policy: &PolicyConfig, backends: &Backends, writer: &StoreWriter) -> Router {
    let filter = |marker: CachePolicy| CacheFilterLayer::new(policy.apply(marker), backends, writer.clone());

    Router::new()
        .route(
            "/api/items/{id}",
            get(get_item).layer(filter(CachePolicy::shared())),
        )
        .route("/api/catalog", get(get_catalog).layer(filter(CachePolicy::local())))
        .route(
            "/api/profile",
            get(get_profile).layer(filter(CachePolicy::client_only())),
        )
        .route("/health", get(health))
}
